use crate::domain::location::Coordinates;
use crate::domain::session::{State, UserId};
use crate::outbound::OutboundMessage;

/// Universal restart command: forces the flow back to `Start` regardless of
/// the stored state.
pub const RESTART_COMMAND: &str = "/start";

/// Button payload tokens. These travel through the channel as callback data
/// and come back verbatim on the next turn.
pub mod tokens {
    pub const PRODUCT_PREFIX: &str = "product:";
    pub const NAV_BACK: &str = "nav:back";
    pub const NAV_FORWARD: &str = "nav:forward";
    pub const OPEN_CART: &str = "cart:open";
    pub const ADD_TO_CART: &str = "cart:add";
    pub const REMOVE_PREFIX: &str = "cart:remove:";
    pub const BACK_TO_MENU: &str = "menu:open";
    pub const CHECKOUT: &str = "order:checkout";
    pub const DELIVERY: &str = "order:delivery";
    pub const PICKUP: &str = "order:pickup";
    pub const PAY_CASH: &str = "pay:cash";
    pub const PAY_CARD: &str = "pay:card";
}

/// One inbound channel event, already resolved to a user. All channel
/// callback kinds funnel into this single variant type so the dispatcher
/// consumes exactly one queue per user.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEvent {
    pub user: UserId,
    pub payload: EventPayload,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    Text(String),
    Button {
        token: String,
        /// Message the button was attached to; handlers delete it when they
        /// replace the view.
        message_id: i64,
        callback_id: String,
    },
    Location(Coordinates),
    PreCheckout {
        query_id: String,
        payload: String,
        amount_minor: i64,
    },
    PaymentSuccess {
        amount_minor: i64,
    },
}

impl InboundEvent {
    pub fn is_restart(&self) -> bool {
        matches!(&self.payload, EventPayload::Text(text) if text.trim() == RESTART_COMMAND)
    }
}

/// Result of one handler invocation: the messages to deliver and the state
/// to persist once delivery succeeded. Output and next state both depend on
/// (state, input).
#[derive(Clone, Debug, PartialEq)]
pub struct Turn {
    pub messages: Vec<OutboundMessage>,
    pub next: State,
}

impl Turn {
    pub fn new(next: State) -> Self {
        Self { messages: Vec::new(), next }
    }

    pub fn message(mut self, message: OutboundMessage) -> Self {
        self.messages.push(message);
        self
    }
}
