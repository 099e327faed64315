use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::location::Coordinates;
use crate::domain::session::UserId;

/// One inline-keyboard button. `token` is what comes back as the button
/// payload when the user taps it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyboardButton {
    pub label: String,
    pub token: String,
}

impl KeyboardButton {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self { label: label.into(), token: token.into() }
    }
}

/// Rows of buttons attached to a text or photo message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<KeyboardButton>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<KeyboardButton>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn button(self, label: impl Into<String>, token: impl Into<String>) -> Self {
        self.row(vec![KeyboardButton::new(label, token)])
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Channel-neutral outbound payload. The messaging crate translates these
/// into concrete API calls; handlers never talk to the wire directly.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Text {
        chat: UserId,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    Photo {
        chat: UserId,
        image: Vec<u8>,
        caption: String,
        keyboard: Option<InlineKeyboard>,
    },
    Location {
        chat: UserId,
        point: Coordinates,
    },
    Invoice {
        chat: UserId,
        title: String,
        description: String,
        /// Correlation payload echoed back in the pre-checkout event.
        payload: String,
        currency: String,
        /// Amount in minor currency units.
        amount_minor: i64,
    },
    AnswerCallback {
        callback_id: String,
        text: Option<String>,
    },
    AnswerPreCheckout {
        query_id: String,
        ok: bool,
        error_message: Option<String>,
    },
    Delete {
        chat: UserId,
        message_id: i64,
    },
}

impl OutboundMessage {
    pub fn text(chat: UserId, text: impl Into<String>) -> Self {
        Self::Text { chat, text: text.into(), keyboard: None }
    }

    pub fn text_with_keyboard(
        chat: UserId,
        text: impl Into<String>,
        keyboard: InlineKeyboard,
    ) -> Self {
        Self::Text { chat, text: text.into(), keyboard: Some(keyboard) }
    }
}

/// Converts a major-unit amount into minor units for the payment call,
/// rounded to the nearest minor unit.
pub fn amount_minor_units(amount: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;

    let minor = (amount * Decimal::ONE_HUNDRED).round();
    minor.to_i64().unwrap_or(i64::MAX)
}
