//! Node and relationship CRUD plus filtered traversal.
//!
//! The operations are split across `nodes`, `relationships` and `traversal`, each adding
//! an `impl` block to [`GraphOperations`]. Every operation validates its identifiers and
//! ids before acquiring a unit of work, and runs a single auto-committed statement.

mod nodes;
mod relationships;
mod traversal;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::backend::Connector;
use crate::codec::{parse_entity_id, NodeRecord, RelationshipRecord};
use crate::connection::ConnectionManager;
use crate::error::{GatewayError, Result};
use crate::validation::Identifier;

pub(crate) const NODE_NOT_FOUND: &str = "Node not found";
pub(crate) const RELATIONSHIP_NOT_FOUND: &str = "Relationship not found";

/// Entry point for entity CRUD and traversal.
pub struct GraphOperations<C: Connector> {
    connections: Arc<ConnectionManager<C>>,
}

impl<C: Connector> Clone for GraphOperations<C> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}

impl<C: Connector> GraphOperations<C> {
    /// Creates the operation set over a shared connection manager.
    pub fn new(connections: Arc<ConnectionManager<C>>) -> Self {
        Self { connections }
    }

    /// Shared connection manager.
    pub fn connections(&self) -> &Arc<ConnectionManager<C>> {
        &self.connections
    }
}

/// Pattern polarity for [`GraphOperations::get_node_relationships`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Relationships ending at the node.
    Incoming,
    /// Relationships starting at the node.
    Outgoing,
    /// Both.
    #[default]
    All,
}

impl Direction {
    /// Lower-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
            Direction::All => "all",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "incoming" | "in" => Ok(Direction::Incoming),
            "outgoing" | "out" => Ok(Direction::Outgoing),
            "all" | "both" | "" => Ok(Direction::All),
            _ => Err(GatewayError::validation(format!(
                "direction must be one of incoming, outgoing, all (got '{value}')"
            ))),
        }
    }
}

/// Nodes plus their count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeList {
    /// Matching nodes.
    pub nodes: Vec<NodeRecord>,
    /// `nodes.len()`.
    pub count: usize,
}

impl From<Vec<NodeRecord>> for NodeList {
    fn from(nodes: Vec<NodeRecord>) -> Self {
        Self {
            count: nodes.len(),
            nodes,
        }
    }
}

/// Relationships plus their count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipList {
    /// Matching relationships.
    pub relationships: Vec<RelationshipRecord>,
    /// `relationships.len()`.
    pub count: usize,
}

impl From<Vec<RelationshipRecord>> for RelationshipList {
    fn from(relationships: Vec<RelationshipRecord>) -> Self {
        Self {
            count: relationships.len(),
            relationships,
        }
    }
}

/// Outcome of a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Human-readable confirmation.
    pub message: String,
    /// Entities removed; always at least one.
    pub deleted_count: u64,
}

pub(crate) fn node_identity(id: &str) -> Result<i64> {
    parse_entity_id(id).ok_or_else(|| GatewayError::not_found(NODE_NOT_FOUND))
}

pub(crate) fn relationship_identity(id: &str) -> Result<i64> {
    parse_entity_id(id).ok_or_else(|| GatewayError::not_found(RELATIONSHIP_NOT_FOUND))
}

pub(crate) fn label_pattern(labels: &[Identifier]) -> String {
    labels.iter().map(|label| format!(":{label}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("INCOMING".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("outgoing".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert_eq!("".parse::<Direction>().unwrap(), Direction::All);
        assert_eq!(Direction::default(), Direction::All);
    }

    #[test]
    fn unknown_direction_is_a_validation_error() {
        let err = "sideways".parse::<Direction>().unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn malformed_ids_are_not_found() {
        assert!(matches!(node_identity("abc"), Err(GatewayError::NotFound(_))));
        assert_eq!(relationship_identity("12").unwrap(), 12);
    }

    #[test]
    fn label_pattern_joins_with_colons() {
        let labels = Identifier::parse_all(&["Person", "Employee"], crate::validation::LABEL).unwrap();
        assert_eq!(label_pattern(&labels), ":Person:Employee");
    }
}
