use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, InterruptHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::warehouse::{ResultSet, SessionInfo, Statement, Value, Warehouse};
use crate::{DashlinkError, Result};

/// Connection settings applied when the database is opened
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqliteOptions {
    pub journal_mode: Option<String>,
    pub busy_timeout: Option<Duration>,
}

enum DbCommand {
    Query {
        statement: Statement,
        response: oneshot::Sender<Result<ResultSet>>,
    },
    Execute {
        statement: Statement,
        response: oneshot::Sender<Result<u64>>,
    },
    Shutdown,
}

/// Warehouse session backed by an embedded SQLite database.
///
/// The connection lives on a dedicated thread and statements are fed to it
/// through a command channel, so callers never block the async runtime.
pub struct SqliteWarehouse {
    label: String,
    database: String,
    sender: mpsc::Sender<DbCommand>,
    interrupt: InterruptHandle,
    // Id of the statement currently executing on the worker thread
    running: Arc<Mutex<Option<Uuid>>>,
}

impl SqliteWarehouse {
    /// Open `database` (a file path or `:memory:`) and start the worker thread.
    /// Opening happens on the calling thread so a bad locator fails here.
    pub fn open(label: impl Into<String>, database: &str, options: &SqliteOptions) -> Result<Self> {
        let label = label.into();
        let conn = if database == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(database)
        }
        .map_err(|e| DashlinkError::connection(
            format!("failed to open database '{database}': {e}"),
            "check the database locator of the connection profile",
        ))?;

        if let Some(timeout) = options.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        if let Some(mode) = &options.journal_mode {
            if database != ":memory:" {
                conn.execute_batch(&format!("PRAGMA journal_mode = {mode};"))?;
            }
        }

        let interrupt = conn.get_interrupt_handle();
        let running = Arc::new(Mutex::new(None));
        let (sender, receiver) = mpsc::channel(100);

        let worker_running = running.clone();
        let worker_label = label.clone();
        thread::Builder::new()
            .name(format!("dashlink-{label}"))
            .spawn(move || run_worker(conn, receiver, worker_running, worker_label))
            .map_err(|e| DashlinkError::connection(
                format!("failed to start session worker: {e}"),
                "the process may be out of threads",
            ))?;

        info!("Opened SQLite session {} ({})", label, database);
        Ok(Self {
            label,
            database: database.to_string(),
            sender,
            interrupt,
            running,
        })
    }

    pub async fn shutdown(&self) {
        if self.sender.send(DbCommand::Shutdown).await.is_err() {
            debug!("Session worker {} already stopped", self.label);
        }
    }

    async fn dispatch<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> DbCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| DashlinkError::Query(format!("session {} is no longer available", self.label)))?;
        rx.await
            .map_err(|_| DashlinkError::Query(format!("session {} dropped the response", self.label)))?
    }
}

impl std::fmt::Debug for SqliteWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWarehouse").field("label", &self.label).finish()
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            database: Some(self.database.clone()),
            schema: Some("main".to_string()),
            ..SessionInfo::default()
        }
    }

    async fn query(&self, statement: &Statement) -> Result<ResultSet> {
        let statement = statement.clone();
        self.dispatch(|response| DbCommand::Query { statement, response }).await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let statement = statement.clone();
        self.dispatch(|response| DbCommand::Execute { statement, response }).await
    }

    async fn cancel(&self, statement_id: Uuid) -> Result<bool> {
        // Hold the slot while interrupting so the worker cannot move on to another statement
        let running = self.running.lock();
        if *running == Some(statement_id) {
            self.interrupt.interrupt();
            debug!("Interrupted statement {} on {}", statement_id, self.label);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn run_worker(
    conn: Connection,
    mut receiver: mpsc::Receiver<DbCommand>,
    running: Arc<Mutex<Option<Uuid>>>,
    label: String,
) {
    while let Some(cmd) = receiver.blocking_recv() {
        match cmd {
            DbCommand::Query { statement, response } => {
                let result = tracked(&running, statement.id, || run_query(&conn, &statement));
                let _ = response.send(result);
            }
            DbCommand::Execute { statement, response } => {
                let result = tracked(&running, statement.id, || run_execute(&conn, &statement));
                let _ = response.send(result);
            }
            DbCommand::Shutdown => break,
        }
    }

    if let Err((_, e)) = conn.close() {
        error!("Failed to close session {}: {}", label, e);
    }
    info!("Session worker {} shutting down", label);
}

fn tracked<T>(running: &Mutex<Option<Uuid>>, id: Uuid, f: impl FnOnce() -> T) -> T {
    *running.lock() = Some(id);
    let result = f();
    *running.lock() = None;
    result
}

fn run_query(conn: &Connection, statement: &Statement) -> Result<ResultSet> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = columns.len();

    let rows = stmt
        .query_map(params_from_iter(statement.params.iter()), |row| {
            (0..column_count)
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<rusqlite::Result<Vec<Value>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!("Query {} returned {} rows", statement.id, rows.len());
    Ok(ResultSet::new(columns, rows))
}

fn run_execute(conn: &Connection, statement: &Statement) -> Result<u64> {
    let affected = conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
    Ok(affected as u64)
}
