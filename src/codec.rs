//! Conversion between backend values and transport-neutral records.
//!
//! Records are what callers see: ids are opaque strings, labels a list, properties a
//! JSON object. [`ResultValue::classify`] is the single place that decides whether an
//! arbitrary result value is a node, a relationship, a scalar or something else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::backend::{BackendNode, BackendPath, BackendRelationship, BackendValue, Row};
use crate::error::{GatewayError, Result};

/// Wire shape of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Opaque identity.
    pub id: String,
    /// Labels; order carries no meaning.
    pub labels: Vec<String>,
    /// Property map.
    pub properties: Map<String, Value>,
}

/// Wire shape of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    /// Opaque identity.
    pub id: String,
    /// Relationship type.
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Identity of the start node.
    pub start_node_id: String,
    /// Identity of the end node.
    pub end_node_id: String,
    /// Property map.
    pub properties: Map<String, Value>,
}

/// Wire shape of a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    /// Nodes in order, both endpoints included.
    pub nodes: Vec<NodeRecord>,
    /// Relationships in order.
    pub relationships: Vec<RelationshipRecord>,
    /// Relationship count.
    pub length: usize,
}

/// Renders an engine identity as an opaque id.
pub fn format_entity_id(id: i64) -> String {
    id.to_string()
}

/// Parses an opaque id back into an engine identity. `None` means the id cannot refer
/// to any entity.
pub fn parse_entity_id(id: &str) -> Option<i64> {
    if id.starts_with('+') {
        return None;
    }
    id.parse().ok()
}

/// Encodes a backend node.
pub fn node_to_record(node: BackendNode) -> NodeRecord {
    let mut labels: Vec<String> = Vec::with_capacity(node.labels.len());
    for label in node.labels {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    NodeRecord {
        id: format_entity_id(node.id),
        labels,
        properties: node.properties,
    }
}

/// Encodes a backend relationship.
pub fn relationship_to_record(rel: BackendRelationship) -> RelationshipRecord {
    RelationshipRecord {
        id: format_entity_id(rel.id),
        rel_type: rel.rel_type,
        start_node_id: format_entity_id(rel.start_node_id),
        end_node_id: format_entity_id(rel.end_node_id),
        properties: rel.properties,
    }
}

/// Encodes a backend path.
pub fn path_to_record(path: BackendPath) -> PathRecord {
    let relationships: Vec<RelationshipRecord> = path
        .relationships
        .into_iter()
        .map(relationship_to_record)
        .collect();
    PathRecord {
        nodes: path.nodes.into_iter().map(node_to_record).collect(),
        length: relationships.len(),
        relationships,
    }
}

/// Decodes a node record. Fails when the id is not an engine identity.
pub fn record_to_node(record: NodeRecord) -> Option<BackendNode> {
    Some(BackendNode {
        id: parse_entity_id(&record.id)?,
        labels: record.labels,
        properties: record.properties,
    })
}

/// Decodes a relationship record. Fails when any id is not an engine identity.
pub fn record_to_relationship(record: RelationshipRecord) -> Option<BackendRelationship> {
    Some(BackendRelationship {
        id: parse_entity_id(&record.id)?,
        rel_type: record.rel_type,
        start_node_id: parse_entity_id(&record.start_node_id)?,
        end_node_id: parse_entity_id(&record.end_node_id)?,
        properties: record.properties,
    })
}

/// Classification of one result value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultValue {
    /// The value exposed labels.
    Node(NodeRecord),
    /// The value exposed a type and both endpoints.
    Relationship(RelationshipRecord),
    /// Null, boolean, number or string.
    Scalar(Value),
    /// Lists, maps and paths, with nested entities encoded.
    Other(Value),
}

impl ResultValue {
    /// Inspects `value` once and picks its variant.
    pub fn classify(value: BackendValue) -> Self {
        match value {
            BackendValue::Node(node) => ResultValue::Node(node_to_record(node)),
            BackendValue::Relationship(rel) => {
                ResultValue::Relationship(relationship_to_record(rel))
            }
            BackendValue::Null => ResultValue::Scalar(Value::Null),
            BackendValue::Boolean(b) => ResultValue::Scalar(Value::Bool(b)),
            BackendValue::Integer(i) => ResultValue::Scalar(Value::from(i)),
            BackendValue::Float(f) => ResultValue::Scalar(float_to_json(f)),
            BackendValue::String(s) => ResultValue::Scalar(Value::String(s)),
            BackendValue::Path(path) => ResultValue::Other(to_json(path_to_record(path))),
            BackendValue::List(items) => ResultValue::Other(Value::Array(
                items
                    .into_iter()
                    .map(|item| ResultValue::classify(item).into_json())
                    .collect(),
            )),
            BackendValue::Map(entries) => ResultValue::Other(map_to_json(entries)),
        }
    }

    /// JSON rendering of the classified value.
    pub fn into_json(self) -> Value {
        match self {
            ResultValue::Node(record) => to_json(record),
            ResultValue::Relationship(record) => to_json(record),
            ResultValue::Scalar(value) | ResultValue::Other(value) => value,
        }
    }
}

/// Classifies every column of `row` into a JSON object keyed by column name.
pub fn row_to_json(row: Row) -> Map<String, Value> {
    row.into_columns()
        .into_iter()
        .map(|(column, value)| (column, ResultValue::classify(value).into_json()))
        .collect()
}

fn map_to_json(entries: BTreeMap<String, BackendValue>) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key, ResultValue::classify(value).into_json()))
            .collect(),
    )
}

fn float_to_json(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn to_json<T: Serialize>(record: T) -> Value {
    // Records only hold strings, lists and JSON maps, which always serialize.
    serde_json::to_value(record).unwrap_or(Value::Null)
}

pub(crate) fn take_node(row: &mut Row, column: &str) -> Result<NodeRecord> {
    match row.take(column) {
        Some(BackendValue::Node(node)) => Ok(node_to_record(node)),
        other => Err(shape_mismatch(column, "node", other.as_ref())),
    }
}

pub(crate) fn take_relationship(row: &mut Row, column: &str) -> Result<RelationshipRecord> {
    match row.take(column) {
        Some(BackendValue::Relationship(rel)) => Ok(relationship_to_record(rel)),
        other => Err(shape_mismatch(column, "relationship", other.as_ref())),
    }
}

pub(crate) fn take_count(row: &mut Row, column: &str) -> Result<u64> {
    match row.take(column) {
        Some(BackendValue::Integer(n)) if n >= 0 => Ok(n as u64),
        Some(BackendValue::Null) => Ok(0),
        other => Err(shape_mismatch(column, "count", other.as_ref())),
    }
}

pub(crate) fn take_string(row: &mut Row, column: &str) -> Result<String> {
    match row.take(column) {
        Some(BackendValue::String(s)) => Ok(s),
        other => Err(shape_mismatch(column, "string", other.as_ref())),
    }
}

/// Reads the `nodes` and `relationships` list columns of a path row.
pub(crate) fn take_path_parts(row: &mut Row) -> Result<PathRecord> {
    let nodes = match row.take("nodes") {
        Some(BackendValue::List(items)) => items
            .into_iter()
            .map(|item| match item {
                BackendValue::Node(node) => Ok(node_to_record(node)),
                other => Err(shape_mismatch("nodes", "node", Some(&other))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => return Err(shape_mismatch("nodes", "list", other.as_ref())),
    };
    let relationships = match row.take("relationships") {
        Some(BackendValue::List(items)) => items
            .into_iter()
            .map(|item| match item {
                BackendValue::Relationship(rel) => Ok(relationship_to_record(rel)),
                other => Err(shape_mismatch("relationships", "relationship", Some(&other))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => return Err(shape_mismatch("relationships", "list", other.as_ref())),
    };
    Ok(PathRecord {
        length: relationships.len(),
        nodes,
        relationships,
    })
}

fn shape_mismatch(column: &str, expected: &str, found: Option<&BackendValue>) -> GatewayError {
    let found = match found {
        None => "nothing",
        Some(BackendValue::Null) => "null",
        Some(BackendValue::Boolean(_)) => "boolean",
        Some(BackendValue::Integer(_)) => "integer",
        Some(BackendValue::Float(_)) => "float",
        Some(BackendValue::String(_)) => "string",
        Some(BackendValue::List(_)) => "list",
        Some(BackendValue::Map(_)) => "map",
        Some(BackendValue::Node(_)) => "node",
        Some(BackendValue::Relationship(_)) => "relationship",
        Some(BackendValue::Path(_)) => "path",
    };
    GatewayError::internal(format!("column `{column}`: expected {expected}, found {found}"))
}
