use tracing::warn;

use crate::domain::session::{keys, CartSnapshot, DeliveryMode, OrderContext, State, UserId};
use crate::errors::TurnError;
use crate::flows::states::Turn;
use crate::outbound::{amount_minor_units, OutboundMessage};
use crate::ports::Capabilities;

/// Correlation payload attached to every invoice and checked again at
/// pre-checkout time. Anything else arriving in a pre-checkout event is
/// rejected.
pub const INVOICE_PAYLOAD: &str = "sliceline-order";

pub const INVOICE_TITLE: &str = "Your order";
pub const INVOICE_DESCRIPTION: &str = "Payment for your order";

const THANK_YOU: &str = "Thank you for your order!";

/// Invoice built from the structured snapshot captured at cart-render time.
/// The snapshot total is the only amount source; display strings are never
/// parsed.
pub fn invoice(user: UserId, snapshot: &CartSnapshot, currency: &str) -> OutboundMessage {
    OutboundMessage::Invoice {
        chat: user,
        title: INVOICE_TITLE.to_owned(),
        description: INVOICE_DESCRIPTION.to_owned(),
        payload: INVOICE_PAYLOAD.to_owned(),
        currency: currency.to_owned(),
        amount_minor: amount_minor_units(snapshot.total),
    }
}

/// Pre-checkout verdict: approve only an exact payload match, otherwise
/// reject with a user-facing reason and leave cart and state untouched.
pub fn pre_checkout_answer(query_id: &str, payload: &str) -> OutboundMessage {
    if payload == INVOICE_PAYLOAD {
        OutboundMessage::AnswerPreCheckout { query_id: query_id.to_owned(), ok: true, error_message: None }
    } else {
        OutboundMessage::AnswerPreCheckout {
            query_id: query_id.to_owned(),
            ok: false,
            error_message: Some(
                "This payment does not match a current order. Please start a new order."
                    .to_owned(),
            ),
        }
    }
}

/// Completes an order after a cash selection or a confirmed card payment:
/// forwards the order to the courier when a delivery context is present,
/// clears the cart, schedules the follow-up reminder, and returns the flow
/// to its initial state.
pub async fn complete_order(caps: &Capabilities, user: UserId) -> Result<Turn, TurnError> {
    let mut turn = Turn::new(State::Start);

    let context = load_order_context(caps, user).await?;
    if let Some(mut context) = context {
        if context.mode == Some(DeliveryMode::Delivery) {
            forward_to_courier(caps, user, &context, &mut turn).await?;
            context.mode = None;
            context.courier_id = None;
            store_order_context(caps, user, &context).await?;
        }
    }

    caps.cart.clear(user).await?;

    // Fire-and-forget: a scheduling failure is logged and never fails the
    // completed order.
    if let Err(error) = caps.reminders.schedule(user).await {
        warn!(
            event_name = "flow.reminder.schedule_failed",
            user_id = %user,
            error = %error,
            "reminder scheduling failed; order completion continues"
        );
    }

    Ok(turn.message(OutboundMessage::text(user, THANK_YOU)))
}

async fn forward_to_courier(
    caps: &Capabilities,
    user: UserId,
    context: &OrderContext,
    turn: &mut Turn,
) -> Result<(), TurnError> {
    let Some(courier_id) = context.courier_id.as_deref() else {
        warn!(
            event_name = "flow.payment.courier_missing",
            user_id = %user,
            store_id = %context.store_id.0,
            "delivery order has no courier assigned; skipping forward"
        );
        return Ok(());
    };
    let Ok(courier_chat) = courier_id.parse::<i64>() else {
        warn!(
            event_name = "flow.payment.courier_unaddressable",
            user_id = %user,
            courier_id,
            "courier id is not a chat id; skipping forward"
        );
        return Ok(());
    };
    let courier = UserId(courier_chat);

    let customer_point = caps.directory.customer_address(&context.address_ref).await?;
    let summary = match load_snapshot(caps, user).await? {
        Some(snapshot) => snapshot.summary,
        None => "New paid order".to_owned(),
    };

    turn.messages.push(OutboundMessage::text(courier, summary));
    turn.messages.push(OutboundMessage::Location { chat: courier, point: customer_point });
    Ok(())
}

pub(crate) async fn load_order_context(
    caps: &Capabilities,
    user: UserId,
) -> Result<Option<OrderContext>, TurnError> {
    let raw = caps.sessions.value(user, keys::ORDER_CONTEXT).await?;
    Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
}

pub(crate) async fn store_order_context(
    caps: &Capabilities,
    user: UserId,
    context: &OrderContext,
) -> Result<(), TurnError> {
    let raw = serde_json::to_string(context)
        .map_err(|err| crate::errors::PortError::transient("sessions", err.to_string()))?;
    caps.sessions.put_value(user, keys::ORDER_CONTEXT, &raw, None).await?;
    Ok(())
}

pub(crate) async fn load_snapshot(
    caps: &Capabilities,
    user: UserId,
) -> Result<Option<CartSnapshot>, TurnError> {
    let raw = caps.sessions.value(user, keys::CART_SNAPSHOT).await?;
    Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
}

pub(crate) async fn store_snapshot(
    caps: &Capabilities,
    user: UserId,
    snapshot: &CartSnapshot,
) -> Result<(), TurnError> {
    let raw = serde_json::to_string(snapshot)
        .map_err(|err| crate::errors::PortError::transient("sessions", err.to_string()))?;
    caps.sessions.put_value(user, keys::CART_SNAPSHOT, &raw, None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{invoice, pre_checkout_answer, INVOICE_PAYLOAD};
    use crate::domain::session::{CartSnapshot, UserId};
    use crate::outbound::OutboundMessage;

    #[test]
    fn invoice_amount_is_the_snapshot_total_in_minor_units() {
        let snapshot =
            CartSnapshot { total: Decimal::new(90_000, 2), summary: "order".to_owned() };
        let message = invoice(UserId(7), &snapshot, "RUB");

        match message {
            OutboundMessage::Invoice { amount_minor, currency, payload, .. } => {
                assert_eq!(amount_minor, 90_000);
                assert_eq!(currency, "RUB");
                assert_eq!(payload, INVOICE_PAYLOAD);
            }
            other => panic!("expected invoice, got {other:?}"),
        }
    }

    #[test]
    fn pre_checkout_accepts_only_the_expected_payload() {
        match pre_checkout_answer("q-1", INVOICE_PAYLOAD) {
            OutboundMessage::AnswerPreCheckout { ok, error_message, .. } => {
                assert!(ok);
                assert!(error_message.is_none());
            }
            other => panic!("expected pre-checkout answer, got {other:?}"),
        }

        match pre_checkout_answer("q-2", "someone-elses-order") {
            OutboundMessage::AnswerPreCheckout { ok, error_message, .. } => {
                assert!(!ok);
                let reason = error_message.expect("rejection must carry a reason");
                assert!(reason.contains("start a new order"));
            }
            other => panic!("expected pre-checkout answer, got {other:?}"),
        }
    }
}
