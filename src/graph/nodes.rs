use serde_json::{Map, Value};
use tracing::debug;

use super::{label_pattern, node_identity, DeleteReport, GraphOperations, NodeList, NODE_NOT_FOUND};
use crate::backend::{Connector, Statement};
use crate::codec::{take_count, take_node, NodeRecord};
use crate::error::{GatewayError, Result};
use crate::validation::{Identifier, LABEL};

impl<C: Connector> GraphOperations<C> {
    /// Creates a node carrying every label in `labels`.
    pub async fn create_node(
        &self,
        labels: &[String],
        properties: Map<String, Value>,
    ) -> Result<NodeRecord> {
        if labels.is_empty() {
            return Err(GatewayError::validation("At least one label is required"));
        }
        let labels = Identifier::parse_all(labels, LABEL)?;
        let statement = create_node_statement(&labels, properties);
        let mut rows = self.connections.run_once("create_node", &statement).await?;
        let Some(mut row) = rows.pop() else {
            let err = GatewayError::internal("create returned no record");
            err.log("create_node");
            return Err(err);
        };
        let node = take_node(&mut row, "n")?;
        debug!(id = %node.id, labels = ?node.labels, "node created");
        Ok(node)
    }

    /// Fetches a node by id.
    pub async fn get_node(&self, id: &str) -> Result<NodeRecord> {
        let node_id = node_identity(id)?;
        let statement = Statement::new("MATCH (n) WHERE id(n) = $node_id RETURN n")
            .param("node_id", node_id);
        let mut rows = self.connections.run_once("get_node", &statement).await?;
        match rows.first_mut() {
            Some(row) => take_node(row, "n"),
            None => Err(GatewayError::not_found(NODE_NOT_FOUND)),
        }
    }

    /// Merges `properties` into the node; a `null` value removes that key.
    pub async fn update_node(
        &self,
        id: &str,
        properties: Map<String, Value>,
    ) -> Result<NodeRecord> {
        let node_id = node_identity(id)?;
        let statement =
            Statement::new("MATCH (n) WHERE id(n) = $node_id SET n += $properties RETURN n")
                .param("node_id", node_id)
                .param("properties", properties);
        let mut rows = self.connections.run_once("update_node", &statement).await?;
        match rows.first_mut() {
            Some(row) => take_node(row, "n"),
            None => Err(GatewayError::not_found(NODE_NOT_FOUND)),
        }
    }

    /// Removes the node and every relationship attached to it.
    pub async fn delete_node(&self, id: &str) -> Result<DeleteReport> {
        let node_id = node_identity(id)?;
        let statement = Statement::new(
            "MATCH (n) WHERE id(n) = $node_id \
             OPTIONAL MATCH (n)-[r]-() \
             WITH n, count(DISTINCT r) AS detached \
             DETACH DELETE n \
             RETURN count(n) AS deleted_count, sum(detached) AS detached_count",
        )
        .param("node_id", node_id);
        let mut rows = self.connections.run_once("delete_node", &statement).await?;
        let Some(row) = rows.first_mut() else {
            return Err(GatewayError::not_found(NODE_NOT_FOUND));
        };
        let deleted_count = take_count(row, "deleted_count")?;
        if deleted_count == 0 {
            return Err(GatewayError::not_found(NODE_NOT_FOUND));
        }
        let detached = take_count(row, "detached_count").unwrap_or(0);
        debug!(node_id, detached, "node deleted");
        Ok(DeleteReport {
            message: "Node deleted successfully".to_string(),
            deleted_count,
        })
    }

    /// Lists every node carrying `label`.
    pub async fn get_nodes_by_label(&self, label: &str) -> Result<NodeList> {
        let label = Identifier::parse(label, LABEL)?;
        let statement = Statement::new(format!("MATCH (n{}) RETURN n", label_pattern(&[label])));
        let rows = self
            .connections
            .run_once("get_nodes_by_label", &statement)
            .await?;
        let nodes = rows
            .into_iter()
            .map(|mut row| take_node(&mut row, "n"))
            .collect::<Result<Vec<_>>>()?;
        Ok(NodeList::from(nodes))
    }
}

fn create_node_statement(labels: &[Identifier], properties: Map<String, Value>) -> Statement {
    Statement::new(format!(
        "CREATE (n{} $properties) RETURN n",
        label_pattern(labels)
    ))
    .param("properties", properties)
}
