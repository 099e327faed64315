use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::domain::session::{keys, DeliveryMode, State, UserId};
use crate::errors::TurnError;
use crate::flows::payment;
use crate::flows::states::{tokens, EventPayload, InboundEvent, Turn};
use crate::geo::{self, DeliveryTier};
use crate::outbound::{InlineKeyboard, OutboundMessage};
use crate::ports::Capabilities;
use crate::render;

const ADDRESS_PROMPT: &str = "Please send your delivery address as text, or share your location.";
const ADDRESS_NOT_RECOGNIZED: &str = "Sorry, we could not recognize that address. Try again?";
const NO_LOCATIONS: &str = "No location serves your area yet.";
const PAYMENT_PROMPT: &str = "How would you like to pay?";

/// Central router of the conversation flow. Loads the stored state for the
/// event's user, runs the matching handler with the injected capability
/// bundle, delivers the resulting messages, and only then persists the next
/// state. Any collaborator failure aborts the turn with the stored state
/// unchanged, so resending the same input is a safe retry.
pub struct Dispatcher {
    caps: Capabilities,
}

impl Dispatcher {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    pub async fn dispatch(&self, event: &InboundEvent) -> Result<(), TurnError> {
        let correlation_id = Uuid::new_v4();
        match self.process(event, correlation_id).await {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(
                    event_name = "flow.turn_aborted",
                    user_id = %event.user,
                    correlation_id = %correlation_id,
                    error = %error,
                    "turn aborted; stored state unchanged"
                );
                Err(error)
            }
        }
    }

    async fn process(&self, event: &InboundEvent, correlation_id: Uuid) -> Result<(), TurnError> {
        // Pre-checkout is answered without touching the session: approval or
        // rejection, the stored state and the cart stay as they are.
        if let EventPayload::PreCheckout { query_id, payload, .. } = &event.payload {
            let answer = payment::pre_checkout_answer(query_id, payload);
            let approved =
                matches!(&answer, OutboundMessage::AnswerPreCheckout { ok: true, .. });
            self.caps.gateway.deliver(&answer).await?;
            info!(
                event_name = "flow.pre_checkout_answered",
                user_id = %event.user,
                correlation_id = %correlation_id,
                approved,
                "pre-checkout answered"
            );
            return Ok(());
        }

        let from = if event.is_restart() {
            State::Start
        } else {
            self.caps.sessions.state(event.user).await?.unwrap_or(State::Start)
        };

        let turn = if matches!(event.payload, EventPayload::PaymentSuccess { .. }) {
            payment::complete_order(&self.caps, event.user).await?
        } else {
            match from {
                State::Start => self.handle_start(event).await?,
                State::Menu => self.handle_menu(event).await?,
                State::Description => self.handle_description(event).await?,
                State::Cart => self.handle_cart(event).await?,
                State::WaitingAddress => self.handle_waiting_address(event).await?,
                State::DeliveryChoice => self.handle_delivery_choice(event).await?,
                State::PaymentChoice => self.handle_payment_choice(event).await?,
            }
        };

        for message in &turn.messages {
            self.caps.gateway.deliver(message).await?;
        }
        self.caps.sessions.set_state(event.user, turn.next).await?;

        info!(
            event_name = "flow.turn_completed",
            user_id = %event.user,
            correlation_id = %correlation_id,
            from_state = from.as_str(),
            to_state = turn.next.as_str(),
            "turn completed"
        );
        Ok(())
    }

    async fn handle_start(&self, event: &InboundEvent) -> Result<Turn, TurnError> {
        self.menu_turn(event.user, 0, None).await
    }

    async fn handle_menu(&self, event: &InboundEvent) -> Result<Turn, TurnError> {
        let user = event.user;
        match &event.payload {
            EventPayload::Button { token, message_id, .. } => {
                if token == tokens::NAV_BACK || token == tokens::NAV_FORWARD {
                    let current = self.stored_page(user).await?;
                    let requested =
                        if token == tokens::NAV_FORWARD { current + 1 } else { current - 1 };
                    self.menu_turn(user, requested, Some(*message_id)).await
                } else if token == tokens::OPEN_CART {
                    self.cart_turn(user, Some(*message_id)).await
                } else if let Some(id) = token.strip_prefix(tokens::PRODUCT_PREFIX) {
                    self.description_turn(user, &ProductId(id.to_owned()), Some(*message_id), None)
                        .await
                } else {
                    let current = self.stored_page(user).await?;
                    self.menu_turn(user, current, None).await
                }
            }
            _ => {
                let current = self.stored_page(user).await?;
                self.menu_turn(user, current, None).await
            }
        }
    }

    async fn handle_description(&self, event: &InboundEvent) -> Result<Turn, TurnError> {
        let user = event.user;
        match &event.payload {
            EventPayload::Button { token, message_id, callback_id } => {
                if token == tokens::ADD_TO_CART {
                    let Some(selected) =
                        self.caps.sessions.value(user, keys::SELECTED_PRODUCT).await?
                    else {
                        return self.menu_turn(user, 0, Some(*message_id)).await;
                    };
                    let product_id = ProductId(selected);
                    self.caps.cart.add_item(user, &product_id, 1).await?;
                    let toast = (callback_id.clone(), "Added to cart".to_owned());
                    self.description_turn(user, &product_id, Some(*message_id), Some(toast)).await
                } else if token == tokens::OPEN_CART {
                    self.cart_turn(user, Some(*message_id)).await
                } else if token == tokens::BACK_TO_MENU {
                    self.menu_turn(user, 0, Some(*message_id)).await
                } else {
                    self.redraw_description(user).await
                }
            }
            _ => self.redraw_description(user).await,
        }
    }

    async fn handle_cart(&self, event: &InboundEvent) -> Result<Turn, TurnError> {
        let user = event.user;
        match &event.payload {
            EventPayload::Button { token, message_id, .. } => {
                if let Some(item_id) = token.strip_prefix(tokens::REMOVE_PREFIX) {
                    self.caps.cart.remove_item(user, item_id).await?;
                    self.cart_turn(user, Some(*message_id)).await
                } else if token == tokens::BACK_TO_MENU {
                    self.menu_turn(user, 0, Some(*message_id)).await
                } else if token == tokens::CHECKOUT {
                    Ok(Turn::new(State::WaitingAddress)
                        .message(OutboundMessage::text(user, ADDRESS_PROMPT)))
                } else {
                    self.cart_turn(user, None).await
                }
            }
            _ => self.cart_turn(user, None).await,
        }
    }

    async fn handle_waiting_address(&self, event: &InboundEvent) -> Result<Turn, TurnError> {
        let user = event.user;
        let point = match &event.payload {
            EventPayload::Location(point) => Some(*point),
            EventPayload::Text(text) => {
                self.caps.geocoder.resolve(text).await?.first().copied()
            }
            _ => {
                return Ok(Turn::new(State::WaitingAddress)
                    .message(OutboundMessage::text(user, ADDRESS_PROMPT)));
            }
        };
        let Some(point) = point else {
            return Ok(Turn::new(State::WaitingAddress)
                .message(OutboundMessage::text(user, ADDRESS_NOT_RECOGNIZED)));
        };

        let stores = self.caps.directory.list_locations().await?;
        let Some((store, distance)) = geo::nearest_store(&stores, point) else {
            return Ok(Turn::new(State::WaitingAddress)
                .message(OutboundMessage::text(user, NO_LOCATIONS)));
        };

        let tier = DeliveryTier::for_distance_km(distance);
        let address_ref = self.caps.directory.save_customer_address(point).await?;
        let context = crate::domain::session::OrderContext {
            address_ref,
            store_id: store.id.clone(),
            tier,
            mode: None,
            courier_id: None,
        };
        payment::store_order_context(&self.caps, user, &context).await?;

        let view = render::tier_view(
            tier,
            distance,
            store,
            &self.caps.settings.fees,
            &self.caps.settings.currency,
        );
        Ok(Turn::new(State::DeliveryChoice)
            .message(OutboundMessage::text_with_keyboard(user, view.text, view.keyboard)))
    }

    async fn handle_delivery_choice(&self, event: &InboundEvent) -> Result<Turn, TurnError> {
        let user = event.user;
        let Some(context) = payment::load_order_context(&self.caps, user).await? else {
            // The order context expired or was never written; start the
            // address step over.
            return Ok(Turn::new(State::WaitingAddress)
                .message(OutboundMessage::text(user, ADDRESS_PROMPT)));
        };

        match &event.payload {
            EventPayload::Button { token, .. }
                if token == tokens::DELIVERY && context.tier.delivery_offered() =>
            {
                let store = self.caps.directory.location(&context.store_id).await?;
                let mut context = context;
                context.mode = Some(DeliveryMode::Delivery);
                context.courier_id = store.courier_id.clone();
                payment::store_order_context(&self.caps, user, &context).await?;

                Ok(Turn::new(State::PaymentChoice).message(
                    OutboundMessage::text_with_keyboard(
                        user,
                        "Pay for your order and the courier will be on the way.",
                        render::payment_keyboard(),
                    ),
                ))
            }
            EventPayload::Button { token, .. } if token == tokens::PICKUP => {
                let store = self.caps.directory.location(&context.store_id).await?;
                let mut context = context;
                context.mode = Some(DeliveryMode::Pickup);
                context.courier_id = None;
                payment::store_order_context(&self.caps, user, &context).await?;

                Ok(Turn::new(State::PaymentChoice)
                    .message(OutboundMessage::Location { chat: user, point: store.coordinates() })
                    .message(OutboundMessage::text_with_keyboard(
                        user,
                        format!("After payment we will be waiting for you at {}", store.address),
                        render::payment_keyboard(),
                    )))
            }
            _ => {
                let mut keyboard = InlineKeyboard::new();
                if context.tier.delivery_offered() {
                    keyboard = keyboard.button("Delivery", tokens::DELIVERY);
                }
                keyboard = keyboard.button("Pickup", tokens::PICKUP);
                Ok(Turn::new(State::DeliveryChoice).message(
                    OutboundMessage::text_with_keyboard(user, "Delivery or pickup?", keyboard),
                ))
            }
        }
    }

    async fn handle_payment_choice(&self, event: &InboundEvent) -> Result<Turn, TurnError> {
        let user = event.user;
        match &event.payload {
            EventPayload::Button { token, .. } if token == tokens::PAY_CASH => {
                payment::complete_order(&self.caps, user).await
            }
            EventPayload::Button { token, .. } if token == tokens::PAY_CARD => {
                let Some(snapshot) = payment::load_snapshot(&self.caps, user).await? else {
                    return self.cart_turn(user, None).await;
                };
                Ok(Turn::new(State::PaymentChoice)
                    .message(payment::invoice(user, &snapshot, &self.caps.settings.currency)))
            }
            _ => Ok(Turn::new(State::PaymentChoice).message(
                OutboundMessage::text_with_keyboard(
                    user,
                    PAYMENT_PROMPT,
                    render::payment_keyboard(),
                ),
            )),
        }
    }

    /// Renders the requested menu page from a fresh catalog fetch, stores
    /// the resolved page index, and optionally deletes the superseded
    /// message.
    async fn menu_turn(
        &self,
        user: UserId,
        requested_page: i64,
        delete: Option<i64>,
    ) -> Result<Turn, TurnError> {
        let products = self.caps.catalog.list_products().await?;
        let view = render::menu_view(&products, requested_page, self.caps.settings.page_size);
        self.caps
            .sessions
            .put_value(user, keys::MENU_PAGE, &view.window.page.to_string(), None)
            .await?;

        let mut turn = Turn::new(State::Menu)
            .message(OutboundMessage::text_with_keyboard(user, view.text, view.keyboard));
        if let Some(message_id) = delete {
            turn = turn.message(OutboundMessage::Delete { chat: user, message_id });
        }
        Ok(turn)
    }

    async fn cart_turn(&self, user: UserId, delete: Option<i64>) -> Result<Turn, TurnError> {
        let cart = self.caps.cart.cart(user).await?;
        let view = render::cart_view(&cart);
        payment::store_snapshot(&self.caps, user, &view.snapshot).await?;

        let mut turn = Turn::new(State::Cart)
            .message(OutboundMessage::text_with_keyboard(user, view.text, view.keyboard));
        if let Some(message_id) = delete {
            turn = turn.message(OutboundMessage::Delete { chat: user, message_id });
        }
        Ok(turn)
    }

    async fn description_turn(
        &self,
        user: UserId,
        product_id: &ProductId,
        delete: Option<i64>,
        toast: Option<(String, String)>,
    ) -> Result<Turn, TurnError> {
        let products = self.caps.catalog.list_products().await?;
        let Some(product) = products.iter().find(|product| &product.id == product_id) else {
            // Stale button for a product that left the catalog.
            return self.menu_turn(user, 0, delete).await;
        };

        let cart = self.caps.cart.cart(user).await?;
        let quantity = cart.quantity_of(product_id);
        let view = render::description_view(product, quantity, &self.caps.settings.currency);
        self.caps.sessions.put_value(user, keys::SELECTED_PRODUCT, &product.id.0, None).await?;

        let card = match &product.image {
            Some(image) => {
                let bytes = self.caps.catalog.fetch_image(image).await?;
                OutboundMessage::Photo {
                    chat: user,
                    image: bytes,
                    caption: view.caption,
                    keyboard: Some(view.keyboard),
                }
            }
            None => OutboundMessage::Text {
                chat: user,
                text: view.caption,
                keyboard: Some(view.keyboard),
            },
        };

        let mut turn = Turn::new(State::Description);
        if let Some((callback_id, text)) = toast {
            turn = turn.message(OutboundMessage::AnswerCallback { callback_id, text: Some(text) });
        }
        turn = turn.message(card);
        if let Some(message_id) = delete {
            turn = turn.message(OutboundMessage::Delete { chat: user, message_id });
        }
        Ok(turn)
    }

    async fn redraw_description(&self, user: UserId) -> Result<Turn, TurnError> {
        match self.caps.sessions.value(user, keys::SELECTED_PRODUCT).await? {
            Some(selected) => {
                self.description_turn(user, &ProductId(selected), None, None).await
            }
            None => self.menu_turn(user, 0, None).await,
        }
    }

    async fn stored_page(&self, user: UserId) -> Result<i64, TurnError> {
        Ok(self
            .caps
            .sessions
            .value(user, keys::MENU_PAGE)
            .await?
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0))
    }
}
