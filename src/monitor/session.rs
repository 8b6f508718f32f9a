use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::messages::Outbound;
use super::registry::SessionRegistry;
use crate::sheets::Credentials;

/// Lifecycle of one polling session. `Stopped` and `Errored` are terminal;
/// a session is never reused after reaching either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Baselining,
    Active,
    Stopped,
    Errored,
}

pub(crate) struct SessionState {
    pub connection_id: String,
    pub sheet_id: String,
    pub credentials: Credentials,
    /// Set by the registry on stop/disconnect. Checked after every suspending
    /// read, before touching session state or emitting anything, so a read
    /// that resolves after teardown cannot resurrect the session.
    pub cancelled: Arc<AtomicBool>,
    pub status: Arc<Mutex<SessionStatus>>,
}

impl SessionState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Rows appended since the watermark, or `None` when nothing is new.
///
/// Count-based diff: assumes the source only ever appends. A count decrease
/// yields `None` here and the caller adopts the smaller count silently —
/// deletion semantics were never specified upstream, so the smaller count
/// just becomes the new watermark (duplicates are possible afterwards).
fn rows_past_watermark(rows: &[Vec<String>], watermark: usize) -> Option<Vec<Vec<String>>> {
    if rows.len() > watermark {
        Some(rows[watermark..].to_vec())
    } else {
        None
    }
}

/// One polling session: baseline read, then recurring-delay ticks until a
/// terminal transition. Each tick schedules the next only after the current
/// read completes, so reads never overlap for one session.
pub(crate) async fn run(registry: Arc<SessionRegistry>, state: SessionState) {
    let reader = registry.reader();
    let broadcaster = registry.broadcaster();

    // Baseline: one read, no timer scheduled on failure.
    let mut last_count = match reader.fetch_rows(&state.credentials, &state.sheet_id).await {
        Ok(rows) => rows.len(),
        Err(e) => {
            if state.is_cancelled() {
                return;
            }
            fail_session(&registry, &state, "baseline read failed", &e).await;
            return;
        }
    };

    if state.is_cancelled() {
        return;
    }
    *state.status.lock() = SessionStatus::Active;
    tracing::info!(
        connection_id = state.connection_id,
        sheet_id = state.sheet_id,
        rows = last_count,
        "baseline established, polling for new leads"
    );

    loop {
        tokio::time::sleep(registry.poll_interval()).await;
        if state.is_cancelled() {
            return;
        }

        let rows = match reader.fetch_rows(&state.credentials, &state.sheet_id).await {
            Ok(rows) => rows,
            Err(e) => {
                if state.is_cancelled() {
                    return;
                }
                fail_session(&registry, &state, "poll read failed", &e).await;
                return;
            }
        };

        if state.is_cancelled() {
            return;
        }

        let total = rows.len();
        if let Some(leads) = rows_past_watermark(&rows, last_count) {
            tracing::info!(
                connection_id = state.connection_id,
                sheet_id = state.sheet_id,
                new = leads.len(),
                total,
                "new leads detected"
            );
            broadcaster
                .send(&state.connection_id, Outbound::NewLeads { leads, total })
                .await;
        }
        last_count = total;
    }
}

/// Terminal error path: emit exactly one error message, mark the session
/// `Errored`, and drop our own registry entry. Failures are not retried —
/// the source or credentials are assumed to need operator intervention.
async fn fail_session(
    registry: &Arc<SessionRegistry>,
    state: &SessionState,
    context: &str,
    error: &anyhow::Error,
) {
    *state.status.lock() = SessionStatus::Errored;
    tracing::warn!(
        connection_id = state.connection_id,
        sheet_id = state.sheet_id,
        "{context}: {error}"
    );
    registry
        .broadcaster()
        .send(
            &state.connection_id,
            Outbound::Error {
                message: error.to_string(),
            },
        )
        .await;
    registry.remove_if_owner(&state.connection_id, &state.cancelled);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Vec<String>> {
        (0..n).map(|i| vec![format!("lead-{i}")]).collect()
    }

    #[test]
    fn no_delta_when_count_unchanged() {
        assert_eq!(rows_past_watermark(&rows(3), 3), None);
    }

    #[test]
    fn delta_is_rows_from_watermark_in_source_order() {
        let delta = rows_past_watermark(&rows(5), 3).unwrap();
        assert_eq!(
            delta,
            vec![vec!["lead-3".to_string()], vec!["lead-4".to_string()]]
        );
    }

    #[test]
    fn whole_sheet_is_delta_from_zero_watermark() {
        let delta = rows_past_watermark(&rows(2), 0).unwrap();
        assert_eq!(delta.len(), 2);
    }

    #[test]
    fn count_decrease_yields_no_delta() {
        assert_eq!(rows_past_watermark(&rows(3), 5), None);
    }
}
