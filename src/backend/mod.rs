//! Driver seam between the operation layer and a concrete graph engine.
//!
//! A [`Connector`] builds a [`GraphBackend`] handle once; the handle opens
//! [`BackendSession`]s which run one [`Statement`] at a time and hand back fully
//! materialized [`Row`]s. Values come back as [`BackendValue`], a driver-neutral mirror
//! of what the engine returned, so the codec never sees driver types.

pub mod neo4j;

use std::collections::BTreeMap;
use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

/// Statement parameters, bound by name.
pub type Params = BTreeMap<String, Value>;

/// Failures reported by a driver implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The engine itself rejected or failed the statement (syntax, constraints, ...).
    #[error("{0}")]
    Rejected(String),
    /// The engine could not be reached or the connection broke.
    #[error("backend unavailable: {0}")]
    Transport(String),
    /// A returned value could not be mapped into a [`BackendValue`].
    #[error("unable to decode backend value: {0}")]
    Decode(String),
}

/// Statement text plus bound parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    text: String,
    params: Params,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::new(),
        }
    }

    /// Binds `value` to `$key`.
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Binds every entry of `params`, replacing earlier bindings with the same name.
    pub fn params_from(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    /// Statement text as sent to the engine.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bound parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// A node as returned by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendNode {
    /// Engine-assigned identity.
    pub id: i64,
    /// Labels attached to the node.
    pub labels: Vec<String>,
    /// Property map.
    pub properties: Map<String, Value>,
}

/// A relationship as returned by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendRelationship {
    /// Engine-assigned identity.
    pub id: i64,
    /// Relationship type.
    pub rel_type: String,
    /// Identity of the start node.
    pub start_node_id: i64,
    /// Identity of the end node.
    pub end_node_id: i64,
    /// Property map.
    pub properties: Map<String, Value>,
}

/// An alternating node/relationship sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendPath {
    /// Nodes in traversal order.
    pub nodes: Vec<BackendNode>,
    /// Relationships in traversal order; `relationships[i]` joins `nodes[i]` and `nodes[i + 1]`.
    pub relationships: Vec<BackendRelationship>,
}

/// Driver-neutral value returned in a result column.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendValue {
    /// Null / missing.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Heterogeneous list.
    List(Vec<BackendValue>),
    /// String-keyed map.
    Map(BTreeMap<String, BackendValue>),
    /// Graph node.
    Node(BackendNode),
    /// Graph relationship.
    Relationship(BackendRelationship),
    /// Graph path.
    Path(BackendPath),
}

impl From<Value> for BackendValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => BackendValue::Null,
            Value::Bool(b) => BackendValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => BackendValue::Integer(i),
                None => BackendValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => BackendValue::String(s),
            Value::Array(items) => {
                BackendValue::List(items.into_iter().map(BackendValue::from).collect())
            }
            Value::Object(map) => BackendValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, BackendValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for BackendValue {
    fn from(value: i64) -> Self {
        BackendValue::Integer(value)
    }
}

impl From<&str> for BackendValue {
    fn from(value: &str) -> Self {
        BackendValue::String(value.to_string())
    }
}

impl From<BackendNode> for BackendValue {
    fn from(node: BackendNode) -> Self {
        BackendValue::Node(node)
    }
}

impl From<BackendRelationship> for BackendValue {
    fn from(rel: BackendRelationship) -> Self {
        BackendValue::Relationship(rel)
    }
}

/// One result row: column name to value, in the order the engine returned them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, BackendValue)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<BackendValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Appends a column in place.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<BackendValue>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Borrows the value of `column`.
    pub fn get(&self, column: &str) -> Option<&BackendValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Removes and returns the value of `column`.
    pub fn take(&mut self, column: &str) -> Option<BackendValue> {
        let idx = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(idx).1)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Consumes the row into its columns.
    pub fn into_columns(self) -> Vec<(String, BackendValue)> {
        self.columns
    }
}

/// Builds a backend handle from configuration.
pub trait Connector: Send + Sync + 'static {
    /// Handle type produced by [`Connector::connect`].
    type Backend: GraphBackend;

    /// Establishes the handle. Called once per process by the connection manager.
    fn connect(&self) -> impl Future<Output = Result<Self::Backend, BackendError>> + Send;

    /// Human-readable endpoint for logs. Must not include credentials.
    fn endpoint(&self) -> String;
}

/// Shared, pooled handle to the engine.
pub trait GraphBackend: Send + Sync + 'static {
    /// Session type handed out per unit of work.
    type Session: BackendSession;

    /// Opens a session. Dropping the session returns its resources to the pool.
    fn open_session(&self) -> impl Future<Output = Result<Self::Session, BackendError>> + Send;
}

/// A scoped session that runs statements one at a time, each auto-committed.
pub trait BackendSession: Send {
    /// Runs `statement` and materializes every row.
    fn run(
        &mut self,
        statement: &Statement,
    ) -> impl Future<Output = Result<Vec<Row>, BackendError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statement_binds_params_by_name() {
        let mut extra = Map::new();
        extra.insert("age".into(), json!(25));
        let stmt = Statement::new("MATCH (n) WHERE n.age > $age AND id(n) = $id RETURN n")
            .param("id", 7)
            .params_from(extra);
        assert_eq!(stmt.params().get("id"), Some(&json!(7)));
        assert_eq!(stmt.params().get("age"), Some(&json!(25)));
    }

    #[test]
    fn json_values_map_to_backend_values() {
        let value = BackendValue::from(json!({"a": [1, 2.5, "x", null, true]}));
        let BackendValue::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(
            map["a"],
            BackendValue::List(vec![
                BackendValue::Integer(1),
                BackendValue::Float(2.5),
                BackendValue::String("x".into()),
                BackendValue::Null,
                BackendValue::Boolean(true),
            ])
        );
    }

    #[test]
    fn row_take_removes_column() {
        let mut row = Row::new().with("count", 3_i64).with("label", "Person");
        assert_eq!(row.take("count"), Some(BackendValue::Integer(3)));
        assert_eq!(row.take("count"), None);
        assert_eq!(row.len(), 1);
    }
}
