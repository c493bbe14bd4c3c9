//! Bounded shortest-path search.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{Connector, Statement};
use crate::codec::{parse_entity_id, take_path_parts, PathRecord};
use crate::connection::ConnectionManager;
use crate::error::{GatewayError, Result};
use crate::graph::GraphOperations;
use crate::validation::{Identifier, RELATIONSHIP_TYPE};

/// Deepest search accepted.
pub const MAX_PATH_DEPTH: u32 = 15;

/// Depth used when the caller does not supply one.
pub const DEFAULT_PATH_DEPTH: u32 = 5;

const NO_PATH: &str = "No path found between the nodes";

/// Finds undirected shortest paths between two nodes.
pub struct PathFinder<C: Connector> {
    connections: Arc<ConnectionManager<C>>,
}

impl<C: Connector> Clone for PathFinder<C> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}

impl<C: Connector> PathFinder<C> {
    /// Creates a finder over a shared connection manager.
    pub fn new(connections: Arc<ConnectionManager<C>>) -> Self {
        Self { connections }
    }

    /// Shortest path by hop count from `from_node` to `to_node`, at most `max_depth` hops,
    /// travelling only over `rel_types` when that list is non-empty. Relationship direction
    /// is ignored while searching; returned relationships keep their stored orientation.
    pub async fn find_path<S: AsRef<str>>(
        &self,
        from_node: &str,
        to_node: &str,
        max_depth: u32,
        rel_types: &[S],
    ) -> Result<PathRecord> {
        check_depth(max_depth)?;
        let rel_types = Identifier::parse_all(rel_types, RELATIONSHIP_TYPE)?;
        let (Some(from_id), Some(to_id)) = (parse_entity_id(from_node), parse_entity_id(to_node))
        else {
            return Err(GatewayError::not_found(NO_PATH));
        };

        if from_id == to_id {
            return self.trivial_path(from_node).await;
        }

        let statement = shortest_path_statement(from_id, to_id, max_depth, &rel_types);
        let mut rows = self.connections.run_once("find_path", &statement).await?;
        let Some(row) = rows.first_mut() else {
            return Err(GatewayError::not_found(NO_PATH));
        };
        take_path_parts(row).inspect_err(|err| err.log("find_path"))
    }

    async fn trivial_path(&self, id: &str) -> Result<PathRecord> {
        let node = GraphOperations::new(Arc::clone(&self.connections))
            .get_node(id)
            .await
            .map_err(|err| match err {
                GatewayError::NotFound(_) => GatewayError::not_found(NO_PATH),
                other => other,
            })?;
        Ok(PathRecord {
            nodes: vec![node],
            relationships: Vec::new(),
            length: 0,
        })
    }
}

/// Reads `max_depth` from a decoded request body. Absent or `null` means
/// [`DEFAULT_PATH_DEPTH`]; anything other than an integer in `1..=MAX_PATH_DEPTH` is
/// rejected.
pub fn max_depth_from_json(value: Option<&Value>) -> Result<u32> {
    let depth = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_PATH_DEPTH),
        Some(Value::Number(n)) => n.as_i64(),
        Some(_) => None,
    };
    match depth.and_then(|d| u32::try_from(d).ok()) {
        Some(depth) => {
            check_depth(depth)?;
            Ok(depth)
        }
        None => Err(depth_error()),
    }
}

fn check_depth(depth: u32) -> Result<()> {
    if (1..=MAX_PATH_DEPTH).contains(&depth) {
        Ok(())
    } else {
        Err(depth_error())
    }
}

fn depth_error() -> GatewayError {
    GatewayError::validation(format!(
        "max_depth must be an integer between 1 and {MAX_PATH_DEPTH}"
    ))
}

fn shortest_path_statement(
    from_id: i64,
    to_id: i64,
    max_depth: u32,
    rel_types: &[Identifier],
) -> Statement {
    let filter = if rel_types.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = rel_types.iter().map(Identifier::as_str).collect();
        format!(":{}", names.join("|"))
    };
    Statement::new(format!(
        "MATCH (a), (b) WHERE id(a) = $from_node AND id(b) = $to_node \
         MATCH path = shortestPath((a)-[{filter}*..{max_depth}]-(b)) \
         RETURN nodes(path) AS nodes, relationships(path) AS relationships"
    ))
    .param("from_node", from_id)
    .param("to_node", to_id)
}
