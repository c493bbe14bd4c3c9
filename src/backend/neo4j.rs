//! Bolt driver binding built on `neo4rs`.
//!
//! The driver keeps its own connection pool; a [`Neo4jSession`] borrows a pooled
//! connection for the duration of one `execute` call and returns it when the result
//! stream is dropped, which happens before [`BackendSession::run`] returns.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use neo4rs::{
    BoltList, BoltMap, BoltNode, BoltNull, BoltPath, BoltRelation, BoltString, BoltType,
    ConfigBuilder, Graph, Query,
};
use serde_json::{json, Map, Number, Value};
use tracing::debug;

use super::{
    BackendError, BackendNode, BackendPath, BackendRelationship, BackendSession, BackendValue,
    Connector, GraphBackend, Row, Statement,
};
use crate::config::BackendSettings;

/// Builds a [`Neo4jBackend`] from [`BackendSettings`].
#[derive(Debug, Clone)]
pub struct Neo4jConnector {
    settings: BackendSettings,
}

impl Neo4jConnector {
    /// Wraps the settings; nothing is contacted until [`Connector::connect`].
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }
}

impl Connector for Neo4jConnector {
    type Backend = Neo4jBackend;

    async fn connect(&self) -> Result<Neo4jBackend, BackendError> {
        let settings = &self.settings;
        let config = ConfigBuilder::default()
            .uri(settings.uri.as_str())
            .user(settings.user.as_str())
            .password(settings.password.as_str())
            .max_connections(settings.max_connections)
            .fetch_size(settings.fetch_size)
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        let graph = Graph::connect(config)
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Neo4jBackend { graph })
    }

    fn endpoint(&self) -> String {
        self.settings.uri.clone()
    }
}

/// Pooled driver handle. Cloning the inner graph is cheap.
pub struct Neo4jBackend {
    graph: Graph,
}

impl GraphBackend for Neo4jBackend {
    type Session = Neo4jSession;

    async fn open_session(&self) -> Result<Neo4jSession, BackendError> {
        Ok(Neo4jSession {
            graph: self.graph.clone(),
        })
    }
}

/// Auto-commit session over the shared pool.
pub struct Neo4jSession {
    graph: Graph,
}

impl BackendSession for Neo4jSession {
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        let mut query = Query::new(statement.text().to_string());
        for (key, value) in statement.params() {
            query = query.param(key.as_str(), json_to_bolt(value));
        }
        let mut stream = self.graph.execute(query).await.map_err(map_driver_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(map_driver_error)? {
            rows.push(decode_row(&row)?);
        }
        debug!(rows = rows.len(), "statement drained");
        Ok(rows)
    }
}

fn map_driver_error(err: neo4rs::Error) -> BackendError {
    match err {
        neo4rs::Error::Neo4j(_) => BackendError::Rejected(err.to_string()),
        neo4rs::Error::DeserializationError(_) => BackendError::Decode(err.to_string()),
        other => BackendError::Transport(other.to_string()),
    }
}

/// Converts a JSON parameter into a Bolt value. Integral numbers bind as integers.
pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(entries) => {
            let mut map = BoltMap::new();
            for (key, item) in entries {
                map.put(BoltString::from(key.as_str()), json_to_bolt(item));
            }
            BoltType::Map(map)
        }
    }
}

fn decode_row(row: &neo4rs::Row) -> Result<Row, BackendError> {
    let columns = row
        .to_strict::<BoltMap>()
        .map_err(|err| BackendError::Decode(format!("row: {err}")))?;
    let mut entries: Vec<_> = columns.value.iter().collect();
    entries.sort_by(|a, b| a.0.value.cmp(&b.0.value));
    let mut decoded = Row::new();
    for (key, value) in entries {
        let value = decode_bolt(value)
            .map_err(|err| BackendError::Decode(format!("column `{}`: {err}", key.value)))?;
        decoded.push(key.value.as_str(), value);
    }
    Ok(decoded)
}

/// Decodes one result value by its wire shape. Entities nested in lists and maps keep
/// their identity.
fn decode_bolt(value: &BoltType) -> Result<BackendValue, BackendError> {
    Ok(match value {
        BoltType::Node(node) => BackendValue::Node(decode_node(node)?),
        BoltType::Relation(rel) => BackendValue::Relationship(decode_relation(rel)?),
        BoltType::Path(path) => BackendValue::Path(decode_path(path)?),
        BoltType::UnboundedRelation(rel) => {
            return Err(BackendError::Decode(format!(
                "relationship {} has no endpoints outside a path",
                rel.id.value
            )))
        }
        BoltType::List(list) => BackendValue::List(
            list.iter()
                .map(decode_bolt)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        BoltType::Map(map) => BackendValue::Map(
            map.value
                .iter()
                .map(|(key, item)| Ok((key.value.clone(), decode_bolt(item)?)))
                .collect::<Result<BTreeMap<_, _>, BackendError>>()?,
        ),
        other => BackendValue::from(bolt_to_json(other)?),
    })
}

/// Converts a property value. Temporal values render as ISO-8601 text and points as
/// `{srid, x, y[, z]}` maps.
fn bolt_to_json(value: &BoltType) -> Result<Value, BackendError> {
    let conversion = |kind: &str| BackendError::Decode(format!("{kind} out of range"));
    Ok(match value {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::from(i.value),
        BoltType::Float(f) => Number::from_f64(f.value).map_or(Value::Null, Value::Number),
        BoltType::String(s) => Value::String(s.value.clone()),
        BoltType::List(list) => Value::Array(
            list.iter()
                .map(bolt_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        BoltType::Map(map) => Value::Object(decode_properties(map)?),
        BoltType::Bytes(bytes) => Value::Array(bytes.value.iter().map(|b| Value::from(*b)).collect()),
        BoltType::Point2D(point) => json!({
            "srid": point.sr_id.value,
            "x": point.x.value,
            "y": point.y.value,
        }),
        BoltType::Point3D(point) => json!({
            "srid": point.sr_id.value,
            "x": point.x.value,
            "y": point.y.value,
            "z": point.z.value,
        }),
        BoltType::Date(date) => {
            let date = NaiveDate::try_from(date).map_err(|_| conversion("date"))?;
            Value::String(date.to_string())
        }
        BoltType::Time(time) => {
            let (time, offset) = <(NaiveTime, FixedOffset)>::from(time);
            Value::String(format!("{time}{offset}"))
        }
        BoltType::LocalTime(time) => Value::String(NaiveTime::from(time).to_string()),
        BoltType::DateTime(datetime) => {
            let datetime =
                DateTime::<FixedOffset>::try_from(datetime).map_err(|_| conversion("datetime"))?;
            Value::String(datetime.to_rfc3339())
        }
        BoltType::LocalDateTime(datetime) => {
            let datetime =
                NaiveDateTime::try_from(datetime).map_err(|_| conversion("local datetime"))?;
            Value::String(datetime.format(ISO_LOCAL_DATETIME).to_string())
        }
        BoltType::DateTimeZoneId(datetime) => {
            let instant =
                NaiveDateTime::try_from(datetime).map_err(|_| conversion("zoned datetime"))?;
            Value::String(format!(
                "{}Z[{}]",
                instant.format(ISO_LOCAL_DATETIME),
                datetime.tz_id()
            ))
        }
        BoltType::Duration(duration) => {
            let duration = std::time::Duration::from(duration.clone());
            Value::String(format!("PT{}S", duration.as_secs_f64()))
        }
        BoltType::Node(_)
        | BoltType::Relation(_)
        | BoltType::UnboundedRelation(_)
        | BoltType::Path(_) => {
            return Err(BackendError::Decode(
                "graph entity inside a property value".into(),
            ))
        }
    })
}

const ISO_LOCAL_DATETIME: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn decode_properties(map: &BoltMap) -> Result<Map<String, Value>, BackendError> {
    let mut properties = Map::new();
    for (key, value) in &map.value {
        let value = bolt_to_json(value)
            .map_err(|err| BackendError::Decode(format!("property `{}`: {err}", key.value)))?;
        properties.insert(key.value.clone(), value);
    }
    Ok(properties)
}

fn decode_node(node: &BoltNode) -> Result<BackendNode, BackendError> {
    let labels = node
        .labels
        .iter()
        .map(|label| match label {
            BoltType::String(label) => Ok(label.value.clone()),
            _ => Err(BackendError::Decode(format!(
                "node {} has a non-string label",
                node.id.value
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BackendNode {
        id: node.id.value,
        labels,
        properties: decode_properties(&node.properties)?,
    })
}

fn decode_relation(rel: &BoltRelation) -> Result<BackendRelationship, BackendError> {
    Ok(BackendRelationship {
        id: rel.id.value,
        rel_type: rel.typ.value.clone(),
        start_node_id: rel.start_node_id.value,
        end_node_id: rel.end_node_id.value,
        properties: decode_properties(&rel.properties)?,
    })
}

/// A Bolt path holds its distinct nodes and relationships plus an index sequence of
/// `(relationship, node)` pairs. Relationship indices are 1-based and negative when the
/// hop runs against the stored direction; node indices are 0-based. The walk starts at
/// the first node.
fn decode_path(path: &BoltPath) -> Result<BackendPath, BackendError> {
    let distinct_nodes = path
        .nodes()
        .iter()
        .map(decode_node)
        .collect::<Result<Vec<_>, _>>()?;
    let distinct_rels = path.rels();
    let indices: Vec<i64> = path.indices().iter().map(|index| index.value).collect();

    let Some(first) = distinct_nodes.first() else {
        return Err(BackendError::Decode("path without nodes".into()));
    };
    if indices.len() % 2 != 0 {
        return Err(BackendError::Decode("path index sequence has odd length".into()));
    }

    let mut nodes = vec![first.clone()];
    let mut relationships = Vec::with_capacity(indices.len() / 2);
    let mut previous = first.id;
    for hop in indices.chunks_exact(2) {
        let (rel_index, node_index) = (hop[0], hop[1]);
        let rel = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| distinct_rels.get(index))
            .ok_or_else(|| {
                BackendError::Decode(format!("path relationship index {rel_index} out of range"))
            })?;
        let node = usize::try_from(node_index)
            .ok()
            .and_then(|index| distinct_nodes.get(index))
            .ok_or_else(|| {
                BackendError::Decode(format!("path node index {node_index} out of range"))
            })?;
        let (start_node_id, end_node_id) = if rel_index > 0 {
            (previous, node.id)
        } else {
            (node.id, previous)
        };
        relationships.push(BackendRelationship {
            id: rel.id.value,
            rel_type: rel.typ.value.clone(),
            start_node_id,
            end_node_id,
            properties: decode_properties(&rel.properties)?,
        });
        nodes.push(node.clone());
        previous = node.id;
    }
    Ok(BackendPath {
        nodes,
        relationships,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo4rs::{BoltDate, BoltInteger, BoltUnboundedRelation};

    fn bolt_map(entries: Vec<(&str, BoltType)>) -> BoltMap {
        entries
            .into_iter()
            .map(|(key, value)| (BoltString::from(key), value))
            .collect()
    }

    fn bolt_row(columns: Vec<(&str, BoltType)>) -> neo4rs::Row {
        let (fields, data): (Vec<BoltType>, Vec<BoltType>) = columns
            .into_iter()
            .map(|(key, value)| (BoltType::from(key), value))
            .unzip();
        neo4rs::Row::new(fields.into(), data.into())
    }

    fn person(id: i64, name: &str) -> BoltNode {
        BoltNode::new(
            BoltInteger::new(id),
            vec![BoltType::from("Person")].into(),
            bolt_map(vec![("name", BoltType::from(name))]),
        )
    }

    fn decoded_person(id: i64, name: &str) -> BackendNode {
        BackendNode {
            id,
            labels: vec!["Person".into()],
            properties: json!({"name": name}).as_object().cloned().unwrap(),
        }
    }

    fn knows(id: i64) -> BoltType {
        BoltType::UnboundedRelation(BoltUnboundedRelation::new(
            BoltInteger::new(id),
            BoltString::from("KNOWS"),
            BoltMap::new(),
        ))
    }

    fn path(nodes: Vec<BoltNode>, rels: Vec<BoltType>, indices: &[i64]) -> BoltType {
        BoltType::Path(BoltPath {
            nodes: nodes.into_iter().map(BoltType::Node).collect::<Vec<_>>().into(),
            rels: rels.into(),
            indices: indices
                .iter()
                .map(|index| BoltType::from(*index))
                .collect::<Vec<_>>()
                .into(),
        })
    }

    fn decoded_path(row: &neo4rs::Row) -> BackendPath {
        match decode_row(row).unwrap().get("p") {
            Some(BackendValue::Path(path)) => path.clone(),
            other => panic!("expected a path, got {other:?}"),
        }
    }

    #[test]
    fn columns_decode_by_shape() {
        let relation = BoltRelation {
            id: BoltInteger::new(10),
            start_node_id: BoltInteger::new(3),
            end_node_id: BoltInteger::new(4),
            typ: BoltString::from("KNOWS"),
            properties: bolt_map(vec![("since", BoltType::from(2020_i64))]),
        };
        let row = bolt_row(vec![
            ("n", BoltType::Node(person(3, "Ada"))),
            ("r", BoltType::Relation(relation)),
            ("total", BoltType::from(5_i64)),
            ("missing", BoltType::Null(BoltNull)),
        ]);

        let decoded = decode_row(&row).unwrap();
        assert_eq!(decoded.len(), 4);
        assert_eq!(
            decoded.get("n"),
            Some(&BackendValue::Node(decoded_person(3, "Ada")))
        );
        let Some(BackendValue::Relationship(rel)) = decoded.get("r") else {
            panic!("expected a relationship");
        };
        assert_eq!((rel.start_node_id, rel.end_node_id), (3, 4));
        assert_eq!(rel.rel_type, "KNOWS");
        assert_eq!(rel.properties["since"], 2020);
        assert_eq!(decoded.get("total"), Some(&BackendValue::Integer(5)));
        assert_eq!(decoded.get("missing"), Some(&BackendValue::Null));
    }

    #[test]
    fn nested_entities_keep_their_identity() {
        let row = bolt_row(vec![
            (
                "m",
                BoltType::Map(bolt_map(vec![("friend", BoltType::Node(person(3, "Ada")))])),
            ),
            (
                "xs",
                BoltType::List(vec![BoltType::Node(person(3, "Ada")), BoltType::from(5_i64)].into()),
            ),
        ]);

        let decoded = decode_row(&row).unwrap();
        let Some(BackendValue::Map(map)) = decoded.get("m") else {
            panic!("expected a map");
        };
        assert_eq!(map["friend"], BackendValue::Node(decoded_person(3, "Ada")));
        assert_eq!(
            decoded.get("xs"),
            Some(&BackendValue::List(vec![
                BackendValue::Node(decoded_person(3, "Ada")),
                BackendValue::Integer(5),
            ]))
        );
    }

    #[test]
    fn reversed_hop_keeps_stored_direction() {
        // (1)<-[10]-(2)
        let row = bolt_row(vec![(
            "p",
            path(vec![person(1, "A"), person(2, "B")], vec![knows(10)], &[-1, 1]),
        )]);
        let decoded = decoded_path(&row);
        assert_eq!(
            decoded.nodes.iter().map(|node| node.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(decoded.relationships[0].id, 10);
        assert_eq!(decoded.relationships[0].start_node_id, 2);
        assert_eq!(decoded.relationships[0].end_node_id, 1);
    }

    #[test]
    fn revisiting_path_walks_the_index_sequence() {
        // (1)-[10]->(2)-[11]->(1)
        let row = bolt_row(vec![(
            "p",
            path(
                vec![person(1, "A"), person(2, "B")],
                vec![knows(10), knows(11)],
                &[1, 1, 2, 0],
            ),
        )]);
        let decoded = decoded_path(&row);
        assert_eq!(
            decoded.nodes.iter().map(|node| node.id).collect::<Vec<_>>(),
            vec![1, 2, 1]
        );
        let hops: Vec<_> = decoded
            .relationships
            .iter()
            .map(|rel| (rel.id, rel.start_node_id, rel.end_node_id))
            .collect();
        assert_eq!(hops, vec![(10, 1, 2), (11, 2, 1)]);
    }

    #[test]
    fn out_of_range_path_index_is_a_decode_error() {
        let row = bolt_row(vec![(
            "p",
            path(vec![person(1, "A")], vec![knows(10)], &[2, 0]),
        )]);
        assert!(matches!(decode_row(&row), Err(BackendError::Decode(_))));
    }

    #[test]
    fn temporal_properties_render_as_iso_text() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let node = BoltNode::new(
            BoltInteger::new(7),
            vec![BoltType::from("Event")].into(),
            bolt_map(vec![("on", BoltType::Date(BoltDate::from(date)))]),
        );
        let decoded = decode_row(&bolt_row(vec![("e", BoltType::Node(node))])).unwrap();
        let Some(BackendValue::Node(event)) = decoded.get("e") else {
            panic!("expected a node");
        };
        assert_eq!(event.properties["on"], "2024-01-02");
    }

    #[test]
    fn integral_numbers_bind_as_integers() {
        assert!(matches!(json_to_bolt(&json!(30)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(&json!(2.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(&json!(null)), BoltType::Null(_)));
    }

    #[test]
    fn nested_parameters_keep_their_shape() {
        assert!(matches!(
            json_to_bolt(&json!({"name": "John", "tags": ["a", "b"]})),
            BoltType::Map(_)
        ));
        assert!(matches!(json_to_bolt(&json!([1, "x"])), BoltType::List(_)));
    }

    #[test]
    fn endpoint_omits_credentials() {
        let connector = Neo4jConnector::new(BackendSettings {
            password: "s3cret".into(),
            ..BackendSettings::default()
        });
        assert!(!connector.endpoint().contains("s3cret"));
    }
}
