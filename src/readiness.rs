//! Per-table readiness gates.
//!
//! The first caller for a table starts one describe/create/poll sequence; callers
//! arriving while it runs queue behind it and all receive its single outcome.
//! Once settled, the outcome is cached for the life of the registry:
//!
//! ```text
//! Unknown -> Polling -> Active
//!                    -> Failed(error)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::table_operations::wait_for_table_active;
use crate::transport::{CreateTableParams, Transport};

type Waiter = oneshot::Sender<Result<()>>;

enum TableState {
    Unknown,
    Polling(Vec<Waiter>),
    Active,
    Failed(Error),
}

/// Observable readiness of one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Unknown,
    Polling,
    Active,
    Failed(Error),
}

struct TableGate {
    state: Mutex<TableState>,
}

/// Readiness gates keyed by table name.
///
/// Shared as `Arc<TableRegistry>` by every model of an application. Settled
/// outcomes are never re-polled.
pub struct TableRegistry {
    tables: Mutex<HashMap<String, Arc<TableGate>>>,
    shutdown: CancellationToken,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        TableRegistry {
            tables: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop every running poll loop. Their tables settle as failed with
    /// [`Error::Cancelled`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    async fn gate(&self, table: &str) -> Arc<TableGate> {
        let mut tables = self.tables.lock().await;
        tables
            .entry(table.to_string())
            .or_insert_with(|| {
                Arc::new(TableGate {
                    state: Mutex::new(TableState::Unknown),
                })
            })
            .clone()
    }

    pub async fn readiness(&self, table: &str) -> Readiness {
        let gate = {
            let tables = self.tables.lock().await;
            match tables.get(table) {
                Some(gate) => gate.clone(),
                None => return Readiness::Unknown,
            }
        };
        let state = gate.state.lock().await;
        match &*state {
            TableState::Unknown => Readiness::Unknown,
            TableState::Polling(_) => Readiness::Polling,
            TableState::Active => Readiness::Active,
            TableState::Failed(e) => Readiness::Failed(e.clone()),
        }
    }

    /// Resolve once `create.table_name` is active, creating the table if needed.
    ///
    /// `cancel` abandons only this caller's wait; the shared sequence keeps
    /// running for everyone else.
    pub async fn ensure_active(
        &self,
        transport: Arc<dyn Transport>,
        create: CreateTableParams,
        poll_interval: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let gate = self.gate(&create.table_name).await;
        let receiver = {
            let mut state = gate.state.lock().await;
            match &mut *state {
                TableState::Active => return Ok(()),
                TableState::Failed(e) => return Err(e.clone()),
                TableState::Polling(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    debug!(table = %create.table_name, queued = waiters.len(), "waiting on table readiness");
                    rx
                }
                TableState::Unknown => {
                    let (tx, rx) = oneshot::channel();
                    *state = TableState::Polling(vec![tx]);
                    debug!(table = %create.table_name, "checking table readiness");
                    self.spawn_sequence(gate.clone(), transport, create, poll_interval);
                    rx
                }
            }
        };

        let outcome = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    outcome = receiver => outcome,
                }
            }
            None => receiver.await,
        };
        // A dropped sender means the sequence task died before settling.
        outcome.unwrap_or(Err(Error::Cancelled))
    }

    fn spawn_sequence(
        &self,
        gate: Arc<TableGate>,
        transport: Arc<dyn Transport>,
        create: CreateTableParams,
        poll_interval: Duration,
    ) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let outcome =
                wait_for_table_active(transport.as_ref(), &create, poll_interval, &shutdown)
                    .await
                    .map(|_| ());

            let settled = match &outcome {
                Ok(()) => {
                    info!(table = %create.table_name, "table ready");
                    TableState::Active
                }
                Err(e) => {
                    warn!(table = %create.table_name, error = %e, "table readiness failed");
                    TableState::Failed(e.clone())
                }
            };

            let waiters = {
                let mut state = gate.state.lock().await;
                match std::mem::replace(&mut *state, settled) {
                    TableState::Polling(waiters) => waiters,
                    _ => Vec::new(),
                }
            };
            for waiter in waiters {
                // Receivers of abandoned waits are gone.
                let _ = waiter.send(outcome.clone());
            }
        });
    }
}
