use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::location::{AddressRef, StoreId};
use crate::geo::DeliveryTier;

/// Chat id of the user the session belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Conversation-flow position. The stored value for a user is always one of
/// these; an absent row reads as `Start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Start,
    Menu,
    Description,
    Cart,
    WaitingAddress,
    DeliveryChoice,
    PaymentChoice,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Menu => "menu",
            Self::Description => "description",
            Self::Cart => "cart",
            Self::WaitingAddress => "waiting_address",
            Self::DeliveryChoice => "delivery_choice",
            Self::PaymentChoice => "payment_choice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(Self::Start),
            "menu" => Some(Self::Menu),
            "description" => Some(Self::Description),
            "cart" => Some(Self::Cart),
            "waiting_address" => Some(Self::WaitingAddress),
            "delivery_choice" => Some(Self::DeliveryChoice),
            "payment_choice" => Some(Self::PaymentChoice),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Delivery,
    Pickup,
}

/// Ephemeral per-order fields correlating the resolved address, the
/// assigned store, and the chosen delivery mode. Written as a single
/// session value so the pair can never go out of sync.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderContext {
    pub address_ref: AddressRef,
    pub store_id: StoreId,
    pub tier: DeliveryTier,
    pub mode: Option<DeliveryMode>,
    pub courier_id: Option<String>,
}

/// Structured cart total captured at cart-render time. The canonical source
/// for the invoice amount and the courier-facing summary; display strings
/// are never parsed back into numbers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub total: Decimal,
    pub summary: String,
}

/// Session-value keys for the ephemeral order context.
pub mod keys {
    pub const MENU_PAGE: &str = "menu.page";
    pub const SELECTED_PRODUCT: &str = "menu.selected_product";
    pub const CART_SNAPSHOT: &str = "cart.snapshot";
    pub const ORDER_CONTEXT: &str = "order.context";
}

#[cfg(test)]
mod tests {
    use super::State;

    #[test]
    fn state_round_trips_through_storage_form() {
        let all = [
            State::Start,
            State::Menu,
            State::Description,
            State::Cart,
            State::WaitingAddress,
            State::DeliveryChoice,
            State::PaymentChoice,
        ];

        for state in all {
            assert_eq!(State::parse(state.as_str()), Some(state));
        }
        assert_eq!(State::parse("unknown"), None);
    }
}
