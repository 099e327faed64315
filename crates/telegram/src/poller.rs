use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiError, TelegramClient};
use crate::router::UserRouter;
use crate::wire::{into_inbound, Update};

/// Source of inbound update batches. The production implementation long
/// polls the Bot API; tests script batches in memory.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn next_batch(&self) -> Result<Vec<Update>, ApiError>;
}

/// Long-poll source over the Bot API client. Acknowledgement is implicit:
/// the next call's offset is one past the highest update id seen, so a
/// batch is confirmed only after it has been handed to the router.
pub struct LongPollSource {
    client: Arc<TelegramClient>,
    poll_timeout_secs: u64,
    offset: Mutex<Option<i64>>,
}

impl LongPollSource {
    pub fn new(client: Arc<TelegramClient>, poll_timeout_secs: u64) -> Self {
        Self { client, poll_timeout_secs, offset: Mutex::new(None) }
    }
}

#[async_trait]
impl UpdateSource for LongPollSource {
    async fn next_batch(&self) -> Result<Vec<Update>, ApiError> {
        let mut offset = self.offset.lock().await;
        let batch = self.client.get_updates(*offset, self.poll_timeout_secs).await?;
        if let Some(last) = batch.iter().map(|update| update.update_id).max() {
            *offset = Some(last + 1);
        }
        Ok(batch)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_consecutive_failures: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { max_consecutive_failures: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl PollPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Drives the update source and feeds recognized events into the per-user
/// router. Transport failures back off and retry; the failure counter
/// resets on every successful poll, so only an uninterrupted failure run
/// stops the loop.
pub struct LongPollRunner {
    source: Arc<dyn UpdateSource>,
    router: UserRouter,
    policy: PollPolicy,
}

impl LongPollRunner {
    pub fn new(source: Arc<dyn UpdateSource>, router: UserRouter, policy: PollPolicy) -> Self {
        Self { source, router, policy }
    }

    pub async fn start(&self) -> Result<(), ApiError> {
        info!(event_name = "ingress.poll.started", "update polling started");
        let mut consecutive_failures: u32 = 0;

        loop {
            match self.source.next_batch().await {
                Ok(batch) => {
                    consecutive_failures = 0;
                    for update in batch {
                        let update_id = update.update_id;
                        match into_inbound(update) {
                            Some(event) => {
                                debug!(
                                    event_name = "ingress.poll.update_routed",
                                    update_id,
                                    user_id = %event.user,
                                    "update routed to user queue"
                                );
                                self.router.route(event).await;
                            }
                            None => {
                                debug!(
                                    event_name = "ingress.poll.update_dropped",
                                    update_id,
                                    "unsupported update kind dropped"
                                );
                            }
                        }
                    }
                }
                Err(error) => {
                    consecutive_failures += 1;
                    warn!(
                        event_name = "ingress.poll.failed",
                        consecutive_failures,
                        max_consecutive_failures = self.policy.max_consecutive_failures,
                        error = %error,
                        "update poll failed"
                    );
                    if consecutive_failures > self.policy.max_consecutive_failures {
                        warn!(
                            event_name = "ingress.poll.stopped",
                            "poll retries exhausted; stopping without crash"
                        );
                        return Ok(());
                    }
                    tokio::time::sleep(self.policy.backoff(consecutive_failures - 1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use sliceline_core::flows::states::InboundEvent;

    use super::{LongPollRunner, PollPolicy, UpdateSource};
    use crate::api::ApiError;
    use crate::router::{InboundHandler, UserRouter};
    use crate::wire::Update;

    struct ScriptedSource {
        batches: Mutex<VecDeque<Result<Vec<Update>, ApiError>>>,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Result<Vec<Update>, ApiError>>) -> Self {
            Self { batches: Mutex::new(batches.into()) }
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn next_batch(&self) -> Result<Vec<Update>, ApiError> {
            let mut batches = self.batches.lock().await;
            match batches.pop_front() {
                Some(next) => next,
                // Script exhausted: keep failing so the runner winds down.
                None => Err(ApiError::Rejected {
                    method: "getUpdates".to_owned(),
                    description: "script exhausted".to_owned(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<InboundEvent>>,
    }

    #[async_trait]
    impl InboundHandler for RecordingHandler {
        async fn handle(&self, event: InboundEvent) {
            self.events.lock().await.push(event);
        }
    }

    fn text_update(update_id: i64, chat: i64, text: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": update_id,
            "message": {"message_id": update_id, "chat": {"id": chat}, "text": text}
        }))
        .expect("update json")
    }

    #[tokio::test]
    async fn runner_survives_transient_poll_failures_and_routes_events() {
        let handler = Arc::new(RecordingHandler::default());
        let router = UserRouter::new(handler.clone(), 16);
        let source = Arc::new(ScriptedSource::new(vec![
            Err(ApiError::Rejected {
                method: "getUpdates".to_owned(),
                description: "gateway timeout".to_owned(),
            }),
            Ok(vec![text_update(1, 42, "/start"), text_update(2, 43, "hello")]),
        ]));

        let runner = LongPollRunner::new(
            source,
            router,
            PollPolicy { max_consecutive_failures: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );
        runner.start().await.expect("runner should wind down cleanly");

        // Give the spawned per-user workers a moment to drain.
        for _ in 0..50 {
            if handler.events.lock().await.len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(handler.events.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn runner_stops_after_an_uninterrupted_failure_run() {
        let handler = Arc::new(RecordingHandler::default());
        let router = UserRouter::new(handler.clone(), 16);
        let source = Arc::new(ScriptedSource::new(Vec::new()));

        let runner = LongPollRunner::new(
            source,
            router,
            PollPolicy { max_consecutive_failures: 1, base_delay_ms: 0, max_delay_ms: 0 },
        );
        runner.start().await.expect("runner degrades gracefully");
        assert!(handler.events.lock().await.is_empty());
    }
}
