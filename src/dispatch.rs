use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::session::{Lifetime, ResultSet, Scoped, Statement, Value};
use crate::{DashlinkError, Result};

/// Observable status of a submitted query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStatus {
    Pending,
    Succeeded,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Cancelled,
    Error(String),
}

impl QueryStatus {
    pub fn is_done(&self) -> bool {
        !matches!(self, QueryStatus::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryStatus::Failed(_))
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Pending => f.write_str("RUNNING"),
            QueryStatus::Succeeded => f.write_str("SUCCESS"),
            QueryStatus::Failed(FailureReason::Cancelled) => f.write_str("CANCELLED"),
            QueryStatus::Failed(FailureReason::Error(_)) => f.write_str("FAILED"),
        }
    }
}

#[derive(Debug, Clone)]
enum QueryState {
    Pending,
    Succeeded(Arc<ResultSet>),
    Failed(DashlinkError),
}

impl QueryState {
    fn is_terminal(&self) -> bool {
        !matches!(self, QueryState::Pending)
    }

    fn status(&self) -> QueryStatus {
        match self {
            QueryState::Pending => QueryStatus::Pending,
            QueryState::Succeeded(_) => QueryStatus::Succeeded,
            QueryState::Failed(DashlinkError::Cancelled) => QueryStatus::Failed(FailureReason::Cancelled),
            QueryState::Failed(e) => QueryStatus::Failed(FailureReason::Error(e.to_string())),
        }
    }
}

/// One query submission, owned by whoever submitted it
pub struct AsyncQueryHandle {
    id: Uuid,
    sql: String,
    submitted_at: DateTime<Utc>,
    state: Arc<watch::Sender<QueryState>>,
}

impl AsyncQueryHandle {
    /// Upstream query id
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn status(&self) -> QueryStatus {
        self.state.borrow().status()
    }
}

impl fmt::Debug for AsyncQueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueryHandle")
            .field("id", &self.id)
            .field("sql", &self.sql)
            .field("status", &self.status())
            .finish()
    }
}

/// Runs queries in the background against the context's session
pub struct AsyncQueryDispatcher {
    context: Arc<ExecutionContext>,
    in_flight: Arc<AtomicUsize>,
}

impl Scoped for AsyncQueryDispatcher {
    const LIFETIME: Lifetime = Lifetime::Process;
}

impl AsyncQueryDispatcher {
    pub fn new(context: Arc<ExecutionContext>) -> Self {
        Self {
            context,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of submissions whose upstream execution has not finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start `sql` in the background and return immediately.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, sql: &str, params: &[Value]) -> AsyncQueryHandle {
        let statement = Statement::new(sql, params.to_vec());
        let (tx, _) = watch::channel(QueryState::Pending);
        let state = Arc::new(tx);

        let handle = AsyncQueryHandle {
            id: statement.id,
            sql: statement.sql.clone(),
            submitted_at: Utc::now(),
            state: state.clone(),
        };

        let session = self.context.session().clone();
        let in_flight = self.in_flight.clone();
        in_flight.fetch_add(1, Ordering::SeqCst);
        debug!("Submitting async query {} to {}", statement.id, session.describe());

        tokio::spawn(async move {
            let outcome = session.query(&statement).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);

            // A cancelled handle stays cancelled even if the result arrives later
            let updated = state.send_if_modified(|current| {
                if current.is_terminal() {
                    return false;
                }
                *current = match outcome {
                    Ok(result) => QueryState::Succeeded(Arc::new(result)),
                    Err(e) => QueryState::Failed(e),
                };
                true
            });
            if !updated {
                debug!("Async query {} finished after its handle was settled", statement.id);
            }
        });

        handle
    }

    /// Non-blocking status check; never changes the handle
    pub fn poll(&self, handle: &AsyncQueryHandle) -> QueryStatus {
        handle.status()
    }

    /// Wait up to `timeout` for the query to settle.
    ///
    /// On timeout the query keeps running and the handle can be polled or
    /// awaited again.
    pub async fn await_result(&self, handle: &AsyncQueryHandle, timeout: Duration) -> Result<ResultSet> {
        let mut rx = handle.state.subscribe();
        let settled = tokio::time::timeout(timeout, async move {
            rx.wait_for(QueryState::is_terminal).await.map(|state| state.clone())
        })
        .await;

        match settled {
            Err(_) => Err(DashlinkError::Timeout(timeout)),
            Ok(Err(_)) => Err(DashlinkError::Query(format!("query {} lost its state channel", handle.id))),
            Ok(Ok(QueryState::Succeeded(result))) => Ok((*result).clone()),
            Ok(Ok(QueryState::Failed(e))) => Err(e),
            Ok(Ok(QueryState::Pending)) => Err(DashlinkError::Timeout(timeout)),
        }
    }

    /// Wait for several handles at once; results come back in input order
    pub async fn await_all(&self, handles: &[AsyncQueryHandle], timeout: Duration) -> Vec<Result<ResultSet>> {
        join_all(handles.iter().map(|h| self.await_result(h, timeout))).await
    }

    /// Ask the warehouse to stop the query and settle the handle as cancelled.
    ///
    /// The handle is settled whether or not the upstream honored the request.
    /// Cancelling an already settled handle changes nothing.
    pub async fn cancel(&self, handle: &AsyncQueryHandle) -> QueryStatus {
        let status = handle.status();
        if status.is_done() {
            return status;
        }

        match self.context.session().cancel(handle.id).await {
            Ok(true) => debug!("Upstream acknowledged cancel of {}", handle.id),
            Ok(false) => debug!("Upstream was not running {} when cancelled", handle.id),
            Err(e) => warn!("Cancel request for {} failed upstream: {}", handle.id, e),
        }

        handle.state.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = QueryState::Failed(DashlinkError::Cancelled);
            true
        });
        handle.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(QueryStatus::Pending.to_string(), "RUNNING");
        assert_eq!(QueryStatus::Succeeded.to_string(), "SUCCESS");
        assert_eq!(QueryStatus::Failed(FailureReason::Cancelled).to_string(), "CANCELLED");
        assert_eq!(QueryStatus::Failed(FailureReason::Error("x".to_string())).to_string(), "FAILED");
        assert!(!QueryStatus::Pending.is_done());
        assert!(QueryStatus::Failed(FailureReason::Cancelled).is_failed());
    }

    #[test]
    fn test_state_to_status() {
        assert_eq!(
            QueryState::Failed(DashlinkError::Cancelled).status(),
            QueryStatus::Failed(FailureReason::Cancelled)
        );
        assert_eq!(
            QueryState::Failed(DashlinkError::Query("bad".to_string())).status(),
            QueryStatus::Failed(FailureReason::Error("Query failed: bad".to_string()))
        );
        assert!(QueryState::Succeeded(Arc::new(ResultSet::default())).is_terminal());
    }
}
