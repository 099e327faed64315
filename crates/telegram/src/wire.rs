use serde::Deserialize;

use sliceline_core::domain::location::Coordinates;
use sliceline_core::domain::session::UserId;
use sliceline_core::flows::states::{EventPayload, InboundEvent};

/// One entry from `getUpdates`. Only the update kinds the flow consumes are
/// modeled; everything else deserializes into an empty shell and is dropped
/// by `into_inbound`.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
    #[serde(default)]
    pub pre_checkout_query: Option<PreCheckoutQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub successful_payment: Option<SuccessfulPayment>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub from: User,
    pub invoice_payload: String,
    pub total_amount: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SuccessfulPayment {
    pub invoice_payload: String,
    pub total_amount: i64,
}

/// Maps a raw update onto the flow's single inbound-event type. Returns
/// `None` for update kinds the flow does not consume.
pub fn into_inbound(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.pre_checkout_query {
        return Some(InboundEvent {
            user: UserId(query.from.id),
            payload: EventPayload::PreCheckout {
                query_id: query.id,
                payload: query.invoice_payload,
                amount_minor: query.total_amount,
            },
        });
    }

    if let Some(query) = update.callback_query {
        let message = query.message?;
        let token = query.data?;
        return Some(InboundEvent {
            user: UserId(message.chat.id),
            payload: EventPayload::Button {
                token,
                message_id: message.message_id,
                callback_id: query.id,
            },
        });
    }

    if let Some(message) = update.message {
        let user = UserId(message.chat.id);
        if let Some(payment) = message.successful_payment {
            return Some(InboundEvent {
                user,
                payload: EventPayload::PaymentSuccess { amount_minor: payment.total_amount },
            });
        }
        if let Some(location) = message.location {
            return Some(InboundEvent {
                user,
                payload: EventPayload::Location(Coordinates {
                    latitude: location.latitude,
                    longitude: location.longitude,
                }),
            });
        }
        if let Some(text) = message.text {
            return Some(InboundEvent { user, payload: EventPayload::Text(text) });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use sliceline_core::domain::session::UserId;
    use sliceline_core::flows::states::EventPayload;

    use super::{into_inbound, Update};

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_value(value).expect("update json")
    }

    #[test]
    fn text_message_maps_to_a_text_event() {
        let event = into_inbound(update(json!({
            "update_id": 1,
            "message": {"message_id": 10, "chat": {"id": 42}, "text": "/start"}
        })))
        .expect("event");

        assert_eq!(event.user, UserId(42));
        assert_eq!(event.payload, EventPayload::Text("/start".to_owned()));
    }

    #[test]
    fn callback_query_carries_token_message_and_callback_ids() {
        let event = into_inbound(update(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-7",
                "from": {"id": 42},
                "data": "cart:open",
                "message": {"message_id": 11, "chat": {"id": 42}}
            }
        })))
        .expect("event");

        assert_eq!(
            event.payload,
            EventPayload::Button {
                token: "cart:open".to_owned(),
                message_id: 11,
                callback_id: "cb-7".to_owned(),
            }
        );
    }

    #[test]
    fn shared_location_maps_to_coordinates() {
        let event = into_inbound(update(json!({
            "update_id": 3,
            "message": {
                "message_id": 12,
                "chat": {"id": 42},
                "location": {"latitude": 55.75, "longitude": 37.61}
            }
        })))
        .expect("event");

        match event.payload {
            EventPayload::Location(point) => {
                assert!((point.latitude - 55.75).abs() < 1e-9);
                assert!((point.longitude - 37.61).abs() < 1e-9);
            }
            other => panic!("expected location, got {other:?}"),
        }
    }

    #[test]
    fn payment_events_map_to_their_dedicated_variants() {
        let pre_checkout = into_inbound(update(json!({
            "update_id": 4,
            "pre_checkout_query": {
                "id": "q-1",
                "from": {"id": 42},
                "invoice_payload": "sliceline-order",
                "total_amount": 90000
            }
        })))
        .expect("event");
        assert!(matches!(
            pre_checkout.payload,
            EventPayload::PreCheckout { ref payload, amount_minor: 90000, .. }
                if payload == "sliceline-order"
        ));

        let success = into_inbound(update(json!({
            "update_id": 5,
            "message": {
                "message_id": 13,
                "chat": {"id": 42},
                "successful_payment": {"invoice_payload": "sliceline-order", "total_amount": 90000}
            }
        })))
        .expect("event");
        assert_eq!(success.payload, EventPayload::PaymentSuccess { amount_minor: 90000 });
    }

    #[test]
    fn unsupported_updates_are_dropped() {
        assert!(into_inbound(update(json!({"update_id": 6}))).is_none());
        // A callback without data cannot be routed.
        assert!(into_inbound(update(json!({
            "update_id": 7,
            "callback_query": {"id": "cb-8", "from": {"id": 42}}
        })))
        .is_none());
    }
}
