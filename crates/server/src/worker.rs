use async_trait::async_trait;
use tracing::warn;

use sliceline_core::flows::engine::Dispatcher;
use sliceline_core::flows::states::InboundEvent;
use sliceline_telegram::InboundHandler;

/// Runs one dispatcher turn per routed event. A failed turn is logged and
/// swallowed so the user's worker keeps draining its queue; the stored
/// state is unchanged and the user retries by resending the input.
pub struct TurnWorker {
    dispatcher: Dispatcher,
}

impl TurnWorker {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl InboundHandler for TurnWorker {
    async fn handle(&self, event: InboundEvent) {
        if let Err(error) = self.dispatcher.dispatch(&event).await {
            warn!(
                event_name = "server.turn_failed",
                user_id = %event.user,
                error = %error,
                "turn failed; awaiting user retry"
            );
        }
    }
}
