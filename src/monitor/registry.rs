use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use super::session::{self, SessionState, SessionStatus};
use super::traits::Broadcaster;
use crate::sheets::{normalize_sheet_id, Credentials, RowSource};

/// A start request that never becomes a session. Surfaced synchronously, no
/// read is attempted.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("sheet reference is empty or malformed: {0:?}")]
    InvalidSheetReference(String),
    #[error("no spreadsheet credentials configured")]
    MissingCredentials,
}

struct SessionHandle {
    sheet_id: String,
    cancelled: Arc<AtomicBool>,
    status: Arc<Mutex<SessionStatus>>,
    task: JoinHandle<()>,
}

/// Process-wide mapping from connection identity to at most one active
/// polling session. Owns creation, lookup, and teardown; sessions themselves
/// only ever remove their own entry.
pub struct SessionRegistry {
    reader: Arc<dyn RowSource>,
    broadcaster: Arc<dyn Broadcaster>,
    poll_interval: Duration,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(
        reader: Arc<dyn RowSource>,
        broadcaster: Arc<dyn Broadcaster>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            reader,
            broadcaster,
            poll_interval,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Begin monitoring a sheet for this connection. An existing session for
    /// the same connection is torn down first — starting is
    /// idempotent-replacing, not additive.
    pub fn start(
        self: &Arc<Self>,
        connection_id: &str,
        sheet_reference: &str,
        credentials: Credentials,
    ) -> Result<(), StartError> {
        let sheet_id = normalize_sheet_id(sheet_reference)
            .ok_or_else(|| StartError::InvalidSheetReference(sheet_reference.to_string()))?;
        if credentials.is_empty() {
            return Err(StartError::MissingCredentials);
        }

        self.stop(connection_id);

        let cancelled = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(SessionStatus::Baselining));
        let state = SessionState {
            connection_id: connection_id.to_string(),
            sheet_id: sheet_id.clone(),
            credentials,
            cancelled: Arc::clone(&cancelled),
            status: Arc::clone(&status),
        };

        // Insert under the lock before the task can run, so an immediate
        // baseline failure finds its own entry to remove.
        let mut sessions = self.sessions.lock();
        let task = tokio::spawn(session::run(Arc::clone(self), state));
        sessions.insert(
            connection_id.to_string(),
            SessionHandle {
                sheet_id: sheet_id.clone(),
                cancelled,
                status,
                task,
            },
        );
        drop(sessions);

        tracing::info!(connection_id, sheet_id, "monitoring session started");
        Ok(())
    }

    /// Tear down this connection's session, if any. Idempotent; a read
    /// already in flight completes but its result is discarded.
    pub fn stop(&self, connection_id: &str) {
        let handle = self.sessions.lock().remove(connection_id);
        if let Some(handle) = handle {
            handle.cancelled.store(true, Ordering::SeqCst);
            *handle.status.lock() = SessionStatus::Stopped;
            handle.task.abort();
            tracing::info!(
                connection_id,
                sheet_id = handle.sheet_id,
                "monitoring session stopped"
            );
        }
    }

    /// Transport-level connection close. Same effect as `stop`, so no
    /// orphaned polling task survives a dead connection.
    pub fn on_disconnect(&self, connection_id: &str) {
        tracing::debug!(connection_id, "connection closed");
        self.stop(connection_id);
    }

    /// Remove an entry only if it still belongs to the calling session.
    /// Guards the replaced-session race: a dying predecessor must not clobber
    /// the entry of the session that replaced it.
    pub(crate) fn remove_if_owner(&self, connection_id: &str, cancelled: &Arc<AtomicBool>) {
        let mut sessions = self.sessions.lock();
        if let Some(handle) = sessions.get(connection_id) {
            if Arc::ptr_eq(&handle.cancelled, cancelled) {
                sessions.remove(connection_id);
            }
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn status(&self, connection_id: &str) -> Option<SessionStatus> {
        self.sessions
            .lock()
            .get(connection_id)
            .map(|handle| *handle.status.lock())
    }

    pub(crate) fn reader(&self) -> Arc<dyn RowSource> {
        Arc::clone(&self.reader)
    }

    pub(crate) fn broadcaster(&self) -> Arc<dyn Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
