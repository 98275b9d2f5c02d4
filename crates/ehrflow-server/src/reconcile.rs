use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use ehrflow_core::{TransferError, now_utc};
use ehrflow_storage::{ConversationStore, ErrorOutcome, StorageError};

const TIMEOUT_CODE: &str = "99";
const TIMEOUT_MESSAGE: &str = "No acknowledgement has been received within ACK timeout limit";
const TIMEOUT_TASK_TYPE: &str = "ACK_TIMEOUT";

/// Periodic sweep that closes conversations whose core extract was sent but
/// never acknowledged within the configured limit. The store's conditional
/// error write guarantees the sweep loses to an acknowledgement that lands
/// concurrently.
pub struct AckTimeoutReconciler {
    store: Arc<dyn ConversationStore>,
    ack_timeout: Duration,
    interval: Duration,
}

impl AckTimeoutReconciler {
    pub fn new(store: Arc<dyn ConversationStore>, ack_timeout: Duration, interval: Duration) -> Self {
        Self {
            store,
            ack_timeout,
            interval,
        }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep().await {
                warn!(error = %err, "ack timeout sweep failed");
            }
        }
    }

    /// One pass over the in-progress conversations. Returns how many were
    /// closed.
    pub async fn sweep(&self) -> Result<usize, StorageError> {
        let now = now_utc();
        let candidates = self.store.find_in_progress().await?;
        let mut closed = 0;

        for state in candidates {
            let Some(core_pending) = &state.core_pending else {
                continue;
            };
            let age = now - core_pending.sent_at;
            if age < self.ack_timeout {
                continue;
            }

            let outcome = self
                .store
                .update_error(
                    &state.conversation_id,
                    TransferError {
                        code: TIMEOUT_CODE.to_string(),
                        message: TIMEOUT_MESSAGE.to_string(),
                        task_type: TIMEOUT_TASK_TYPE.to_string(),
                        occurred_at: now,
                    },
                )
                .await?;
            match outcome {
                ErrorOutcome::Applied => {
                    info!(
                        conversation_id = %state.conversation_id,
                        "acknowledgement overdue, conversation closed"
                    );
                    closed += 1;
                }
                ErrorOutcome::Discarded => {
                    // An acknowledgement or error landed between the read and
                    // the write; the conditional update kept it.
                    warn!(
                        conversation_id = %state.conversation_id,
                        "conversation resolved during sweep, timeout discarded"
                    );
                }
            }
        }
        Ok(closed)
    }
}
