//! Whole-graph counts and the label and relationship-type catalogues.

use std::sync::Arc;

use serde::Serialize;

use crate::backend::{Connector, GraphBackend, Statement};
use crate::codec::{take_count, take_string};
use crate::connection::{ConnectionManager, UnitOfWork};
use crate::error::Result;

/// Whole-graph aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Number of nodes.
    pub node_count: u64,
    /// Number of relationships.
    pub relationship_count: u64,
    /// Labels in use, sorted.
    pub labels: Vec<String>,
    /// Relationship types in use, sorted.
    pub relationship_types: Vec<String>,
}

/// Body shape of the stats response.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// The collected aggregates.
    pub stats: GraphStats,
}

/// Collects [`GraphStats`].
pub struct StatsCollector<C: Connector> {
    connections: Arc<ConnectionManager<C>>,
}

impl<C: Connector> Clone for StatsCollector<C> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}

impl<C: Connector> StatsCollector<C> {
    /// Collector sharing `connections` with the other operation families.
    pub fn new(connections: Arc<ConnectionManager<C>>) -> Self {
        Self { connections }
    }

    /// Runs the four aggregate statements in one unit of work.
    pub async fn get_stats(&self) -> Result<GraphStats> {
        let outcome: Result<GraphStats> = async {
            let mut unit = self.connections.acquire().await?;
            let node_count = count(&mut unit, "MATCH (n) RETURN count(n) AS count").await?;
            let relationship_count =
                count(&mut unit, "MATCH ()-[r]->() RETURN count(r) AS count").await?;
            let labels = strings(&mut unit, "CALL db.labels() YIELD label RETURN label", "label")
                .await?;
            let relationship_types = strings(
                &mut unit,
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType",
                "relationshipType",
            )
            .await?;
            Ok(GraphStats {
                node_count,
                relationship_count,
                labels,
                relationship_types,
            })
        }
        .await;
        outcome.inspect_err(|err| err.log("get_stats"))
    }
}

async fn count<B: GraphBackend>(unit: &mut UnitOfWork<B>, text: &str) -> Result<u64> {
    match unit.first(&Statement::new(text)).await? {
        Some(mut row) => take_count(&mut row, "count"),
        None => Ok(0),
    }
}

async fn strings<B: GraphBackend>(
    unit: &mut UnitOfWork<B>,
    text: &str,
    column: &str,
) -> Result<Vec<String>> {
    let mut values = unit
        .run(&Statement::new(text))
        .await?
        .into_iter()
        .map(|mut row| take_string(&mut row, column))
        .collect::<Result<Vec<_>>>()?;
    values.sort();
    values.dedup();
    Ok(values)
}
