use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use sliceline_core::domain::session::UserId;
use sliceline_core::errors::PortError;
use sliceline_core::outbound::OutboundMessage;
use sliceline_core::ports::{OutboundGateway, ReminderScheduler};

const REMINDER_TEXT: &str =
    "Enjoy your meal! If your order has not reached you yet, reply here and we will sort it out.";

/// One detached task per completed order: sleep the configured delay, then
/// send the follow-up text. There is no cancellation hook; a reminder that
/// was scheduled always fires, even if the user has ordered again since.
pub struct TokioReminderScheduler {
    gateway: Arc<dyn OutboundGateway>,
    delay: Duration,
}

impl TokioReminderScheduler {
    pub fn new(gateway: Arc<dyn OutboundGateway>, delay: Duration) -> Self {
        Self { gateway, delay }
    }
}

#[async_trait]
impl ReminderScheduler for TokioReminderScheduler {
    async fn schedule(&self, user: UserId) -> Result<(), PortError> {
        let gateway = self.gateway.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match gateway.deliver(&OutboundMessage::text(user, REMINDER_TEXT)).await {
                Ok(()) => {
                    debug!(event_name = "reminder.fired", user_id = %user, "reminder delivered");
                }
                Err(error) => {
                    warn!(
                        event_name = "reminder.delivery_failed",
                        user_id = %user,
                        error = %error,
                        "reminder delivery failed"
                    );
                }
            }
        });
        Ok(())
    }
}
