//! Process-wide backend handle and scoped units of work.
//!
//! The handle is built on first use and shared by every request afterwards. Building it
//! per request would exhaust the driver's pool, so the only places that touch the slot
//! for writing are first-use initialization and [`ConnectionManager::shutdown`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::{BackendSession, Connector, GraphBackend, Row, Statement};
use crate::error::{GatewayError, Result};

enum Slot<B> {
    Empty,
    Ready(Arc<B>),
    Closed,
}

/// Lazily connected, shareable owner of the backend handle.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    statement_timeout: Duration,
    slot: RwLock<Slot<C::Backend>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager; nothing is contacted until the first [`acquire`](Self::acquire).
    pub fn new(connector: C, statement_timeout: Duration) -> Self {
        Self {
            connector,
            statement_timeout,
            slot: RwLock::new(Slot::Empty),
        }
    }

    /// Deadline applied to each statement and to session acquisition.
    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Whether the handle has been built and not yet shut down.
    pub async fn is_connected(&self) -> bool {
        matches!(*self.slot.read().await, Slot::Ready(_))
    }

    /// Returns the shared handle, building it if this is the first use.
    ///
    /// Concurrent first callers queue on the write lock, so exactly one of them connects.
    /// A failed connect leaves the slot empty and the next caller tries again.
    pub async fn handle(&self) -> Result<Arc<C::Backend>> {
        match &*self.slot.read().await {
            Slot::Ready(backend) => return Ok(Arc::clone(backend)),
            Slot::Closed => return Err(shut_down()),
            Slot::Empty => {}
        }

        let mut slot = self.slot.write().await;
        match &*slot {
            Slot::Ready(backend) => return Ok(Arc::clone(backend)),
            Slot::Closed => return Err(shut_down()),
            Slot::Empty => {}
        }

        let endpoint = self.connector.endpoint();
        let backend = match timeout(self.statement_timeout, self.connector.connect()).await {
            Ok(Ok(backend)) => Arc::new(backend),
            Ok(Err(err)) => {
                warn!(%endpoint, error = %err, "backend connection failed");
                return Err(GatewayError::internal(format!(
                    "failed to connect to {endpoint}: {err}"
                )));
            }
            Err(_) => {
                warn!(%endpoint, "backend connection timed out");
                return Err(GatewayError::Timeout(self.statement_timeout));
            }
        };
        info!(%endpoint, "backend connection established");
        *slot = Slot::Ready(Arc::clone(&backend));
        Ok(backend)
    }

    /// Opens a scoped unit of work. Its session is released when the guard drops,
    /// whichever way the caller exits.
    pub async fn acquire(&self) -> Result<UnitOfWork<C::Backend>> {
        let backend = self.handle().await?;
        let session = match timeout(self.statement_timeout, backend.open_session()).await {
            Ok(session) => session?,
            Err(_) => return Err(GatewayError::Timeout(self.statement_timeout)),
        };
        Ok(UnitOfWork {
            session,
            _backend: backend,
            deadline: self.statement_timeout,
            statements: 0,
            opened: Instant::now(),
        })
    }

    /// Runs one statement in its own unit of work, logging failures under `operation`.
    pub async fn run_once(&self, operation: &'static str, statement: &Statement) -> Result<Vec<Row>> {
        let outcome: Result<Vec<Row>> = async {
            let mut unit = self.acquire().await?;
            unit.run(statement).await
        }
        .await;
        outcome.inspect_err(|err| err.log(operation))
    }

    /// Releases the handle. Later acquisitions fail; in-flight units keep their own
    /// reference and finish normally.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.write().await;
        if matches!(*slot, Slot::Ready(_)) {
            info!(endpoint = %self.connector.endpoint(), "backend connection released");
        }
        *slot = Slot::Closed;
    }
}

fn shut_down() -> GatewayError {
    GatewayError::internal("connection manager has been shut down")
}

/// A session borrowed from the shared handle. Statements run one at a time, each
/// auto-committed; nothing spans units.
pub struct UnitOfWork<B: GraphBackend> {
    session: B::Session,
    _backend: Arc<B>,
    deadline: Duration,
    statements: usize,
    opened: Instant,
}

impl<B: GraphBackend> UnitOfWork<B> {
    /// Runs `statement` under the per-call deadline.
    pub async fn run(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        self.statements += 1;
        debug!(statement = statement.text(), params = statement.params().len(), "running statement");
        match timeout(self.deadline, self.session.run(statement)).await {
            Ok(rows) => Ok(rows?),
            Err(_) => Err(GatewayError::Timeout(self.deadline)),
        }
    }

    /// Runs `statement` and returns its first row, if any.
    pub async fn first(&mut self, statement: &Statement) -> Result<Option<Row>> {
        Ok(self.run(statement).await?.into_iter().next())
    }

    /// Statements issued so far.
    pub fn statements(&self) -> usize {
        self.statements
    }
}

impl<B: GraphBackend> Drop for UnitOfWork<B> {
    fn drop(&mut self) {
        debug!(
            statements = self.statements,
            elapsed_ms = self.opened.elapsed().as_millis() as u64,
            "unit of work released"
        );
    }
}
