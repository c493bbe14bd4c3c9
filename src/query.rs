//! Raw statement execution.
//!
//! The statement text is sent as-is and its labels and types are never checked, so this
//! entry point carries the caller's full query authority. Parameters are still bound,
//! never spliced.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::backend::{Connector, Statement};
use crate::codec::row_to_json;
use crate::connection::ConnectionManager;
use crate::error::{GatewayError, Result};

/// Rows of a raw statement, each keyed by return column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResults {
    /// One object per row.
    pub results: Vec<Map<String, Value>>,
    /// `results.len()`.
    pub count: usize,
}

/// Runs caller-supplied statements.
pub struct QueryGateway<C: Connector> {
    connections: Arc<ConnectionManager<C>>,
}

impl<C: Connector> Clone for QueryGateway<C> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}

impl<C: Connector> QueryGateway<C> {
    /// Creates a gateway over a shared connection manager.
    pub fn new(connections: Arc<ConnectionManager<C>>) -> Self {
        Self { connections }
    }

    /// Runs `statement` with `parameters` bound and classifies every returned value.
    pub async fn execute(
        &self,
        statement: &str,
        parameters: Map<String, Value>,
    ) -> Result<QueryResults> {
        if statement.trim().is_empty() {
            return Err(GatewayError::validation("No query provided"));
        }
        let statement = Statement::new(statement).params_from(parameters);
        let rows = self.connections.run_once("execute_query", &statement).await?;
        let results: Vec<Map<String, Value>> = rows.into_iter().map(row_to_json).collect();
        debug!(rows = results.len(), "raw statement completed");
        Ok(QueryResults {
            count: results.len(),
            results,
        })
    }
}
