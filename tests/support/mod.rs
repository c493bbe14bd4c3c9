//! In-process backend that replays queued responses and records every statement.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use graphgate::backend::{
    BackendError, BackendNode, BackendRelationship, BackendSession, BackendValue, Connector,
    GraphBackend, Row, Statement,
};
use graphgate::connection::ConnectionManager;
use serde_json::{Map, Value};

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Result<Vec<Row>, BackendError>>,
    statements: Vec<Statement>,
    connects: usize,
    failing_connects: usize,
    connect_delay: Option<Duration>,
    statement_delay: Option<Duration>,
    live_sessions: usize,
}

/// Shared handle used both by the test and by the connector it builds.
#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the rows returned by the next statement.
    pub fn respond(&self, rows: Vec<Row>) -> &Self {
        self.lock().responses.push_back(Ok(rows));
        self
    }

    /// Queues a failure for the next statement.
    pub fn fail(&self, err: BackendError) -> &Self {
        self.lock().responses.push_back(Err(err));
        self
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) -> &Self {
        self.lock().failing_connects = count;
        self
    }

    pub fn delay_connect(&self, delay: Duration) -> &Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    pub fn delay_statements(&self, delay: Duration) -> &Self {
        self.lock().statement_delay = Some(delay);
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .map(|s| s.text().to_string())
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn live_sessions(&self) -> usize {
        self.lock().live_sessions
    }

    pub fn connector(&self) -> ScriptedConnector {
        ScriptedConnector {
            script: self.clone(),
        }
    }

    /// Connection manager over this script with the given statement deadline.
    pub fn manager(&self, timeout: Duration) -> Arc<ConnectionManager<ScriptedConnector>> {
        Arc::new(ConnectionManager::new(self.connector(), timeout))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script state poisoned")
    }
}

pub struct ScriptedConnector {
    script: Script,
}

impl Connector for ScriptedConnector {
    type Backend = ScriptedBackend;

    async fn connect(&self) -> Result<ScriptedBackend, BackendError> {
        let delay = self.script.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.script.lock();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BackendError::Transport("connection refused".into()));
        }
        Ok(ScriptedBackend {
            script: self.script.clone(),
        })
    }

    fn endpoint(&self) -> String {
        "bolt://scripted:7687".to_string()
    }
}

pub struct ScriptedBackend {
    script: Script,
}

impl GraphBackend for ScriptedBackend {
    type Session = ScriptedSession;

    async fn open_session(&self) -> Result<ScriptedSession, BackendError> {
        self.script.lock().live_sessions += 1;
        Ok(ScriptedSession {
            script: self.script.clone(),
        })
    }
}

pub struct ScriptedSession {
    script: Script,
}

impl BackendSession for ScriptedSession {
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        let delay = {
            let mut state = self.script.lock();
            state.statements.push(statement.clone());
            state.statement_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.script.state.lock() {
            state.live_sessions -= 1;
        }
    }
}

pub fn props(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub fn node(id: i64, labels: &[&str], properties: Value) -> BackendNode {
    BackendNode {
        id,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        properties: props(properties),
    }
}

pub fn rel(id: i64, rel_type: &str, start: i64, end: i64, properties: Value) -> BackendRelationship {
    BackendRelationship {
        id,
        rel_type: rel_type.to_string(),
        start_node_id: start,
        end_node_id: end,
        properties: props(properties),
    }
}

pub fn node_row(column: &str, node: BackendNode) -> Row {
    Row::new().with(column, node)
}

pub fn rel_row(column: &str, rel: BackendRelationship) -> Row {
    Row::new().with(column, rel)
}

pub fn count_row(column: &str, count: i64) -> Row {
    Row::new().with(column, count)
}

pub fn path_row(nodes: Vec<BackendNode>, rels: Vec<BackendRelationship>) -> Row {
    Row::new()
        .with(
            "nodes",
            BackendValue::List(nodes.into_iter().map(BackendValue::Node).collect()),
        )
        .with(
            "relationships",
            BackendValue::List(rels.into_iter().map(BackendValue::Relationship).collect()),
        )
}
