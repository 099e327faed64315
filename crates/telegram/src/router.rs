use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use sliceline_core::flows::states::InboundEvent;

/// Consumer of fully resolved inbound events. The production handler runs a
/// dispatcher turn and logs failures; it must never panic the worker.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent);
}

/// Fans events out to one ordered queue per user, each drained by its own
/// spawned worker. A user's events are processed strictly in arrival order;
/// different users run concurrently.
pub struct UserRouter {
    handler: Arc<dyn InboundHandler>,
    queue_depth: usize,
    workers: Mutex<HashMap<i64, mpsc::Sender<InboundEvent>>>,
}

impl UserRouter {
    pub fn new(handler: Arc<dyn InboundHandler>, queue_depth: usize) -> Self {
        Self { handler, queue_depth: queue_depth.max(1), workers: Mutex::new(HashMap::new()) }
    }

    pub async fn route(&self, event: InboundEvent) {
        let user = event.user;
        let mut workers = self.workers.lock().await;

        let sender = workers
            .entry(user.0)
            .or_insert_with(|| spawn_worker(self.handler.clone(), self.queue_depth));

        if let Ok(()) = sender.send(event.clone()).await {
            return;
        }

        // The previous worker is gone; replace it and retry once.
        let sender = spawn_worker(self.handler.clone(), self.queue_depth);
        if sender.send(event).await.is_err() {
            warn!(
                event_name = "ingress.router.event_dropped",
                user_id = %user,
                "replacement worker rejected the event"
            );
        }
        workers.insert(user.0, sender);
    }
}

fn spawn_worker(
    handler: Arc<dyn InboundHandler>,
    queue_depth: usize,
) -> mpsc::Sender<InboundEvent> {
    let (sender, mut receiver) = mpsc::channel::<InboundEvent>(queue_depth);
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            handler.handle(event).await;
        }
    });
    sender
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use sliceline_core::domain::session::UserId;
    use sliceline_core::flows::states::{EventPayload, InboundEvent};

    use super::{InboundHandler, UserRouter};

    struct SlowRecorder {
        seen: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl InboundHandler for SlowRecorder {
        async fn handle(&self, event: InboundEvent) {
            // Force interleaving opportunities between users.
            tokio::time::sleep(Duration::from_millis(2)).await;
            let EventPayload::Text(text) = event.payload else { return };
            self.seen.lock().await.push((event.user.0, text));
        }
    }

    fn text_event(user: i64, text: &str) -> InboundEvent {
        InboundEvent { user: UserId(user), payload: EventPayload::Text(text.to_owned()) }
    }

    async fn drained(recorder: &SlowRecorder, expected: usize) -> Vec<(i64, String)> {
        for _ in 0..200 {
            if recorder.seen.lock().await.len() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        recorder.seen.lock().await.clone()
    }

    #[tokio::test]
    async fn per_user_order_is_preserved() {
        let recorder = Arc::new(SlowRecorder { seen: Mutex::new(Vec::new()) });
        let router = UserRouter::new(recorder.clone(), 16);

        for i in 0..5 {
            router.route(text_event(1, &format!("m{i}"))).await;
        }

        let seen = drained(&recorder, 5).await;
        let texts: Vec<&str> = seen.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn independent_users_are_all_processed() {
        let recorder = Arc::new(SlowRecorder { seen: Mutex::new(Vec::new()) });
        let router = UserRouter::new(recorder.clone(), 16);

        for user in 1..=4 {
            router.route(text_event(user, "a")).await;
            router.route(text_event(user, "b")).await;
        }

        let seen = drained(&recorder, 8).await;
        assert_eq!(seen.len(), 8);
        for user in 1..=4 {
            let for_user: Vec<&str> = seen
                .iter()
                .filter(|(id, _)| *id == user)
                .map(|(_, text)| text.as_str())
                .collect();
            assert_eq!(for_user, vec!["a", "b"], "user {user} order");
        }
    }
}
