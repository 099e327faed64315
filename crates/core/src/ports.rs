use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::cart::Cart;
use crate::domain::location::{AddressRef, Coordinates, StoreId, StoreLocation};
use crate::domain::product::{ImageRef, Product, ProductId};
use crate::domain::session::{State, UserId};
use crate::errors::PortError;
use crate::geo::FeeSchedule;
use crate::outbound::OutboundMessage;

/// Catalog/inventory reads. The product list is ordered and fetched fresh
/// on every render.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, PortError>;
    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, PortError>;
}

/// Cart commands. The collaborator owns the cart and computes all totals;
/// the core only reads and issues mutations.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn cart(&self, user: UserId) -> Result<Cart, PortError>;
    async fn add_item(&self, user: UserId, product: &ProductId, quantity: u32)
        -> Result<(), PortError>;
    async fn remove_item(&self, user: UserId, item_id: &str) -> Result<(), PortError>;
    async fn clear(&self, user: UserId) -> Result<(), PortError>;
}

/// Free-text address resolution. Candidates are ranked most-relevant first;
/// an empty list means the address was not recognized.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Vec<Coordinates>, PortError>;
}

/// Fulfillment-location directory plus persisted customer addresses.
#[async_trait]
pub trait StoreDirectory: Send + Sync {
    async fn list_locations(&self) -> Result<Vec<StoreLocation>, PortError>;
    async fn location(&self, id: &StoreId) -> Result<StoreLocation, PortError>;
    async fn save_customer_address(&self, point: Coordinates) -> Result<AddressRef, PortError>;
    async fn customer_address(&self, address: &AddressRef) -> Result<Coordinates, PortError>;
}

/// Externally persisted per-user conversation state. Every operation is a
/// remote call; a failure aborts the turn so the stored state is only ever
/// advanced after a fully successful turn.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn state(&self, user: UserId) -> Result<Option<State>, PortError>;
    async fn set_state(&self, user: UserId, state: State) -> Result<(), PortError>;
    async fn put_value(
        &self,
        user: UserId,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), PortError>;
    async fn value(&self, user: UserId, key: &str) -> Result<Option<String>, PortError>;
}

/// Outbound side of the messaging channel.
#[async_trait]
pub trait OutboundGateway: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), PortError>;
}

/// One-shot deferred follow-up per completed order. Scheduling must not
/// block the requesting turn; there is no cancellation hook.
#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    async fn schedule(&self, user: UserId) -> Result<(), PortError>;
}

/// Flow-level settings handed to the dispatcher alongside the collaborator
/// handles.
#[derive(Clone, Debug)]
pub struct FlowSettings {
    pub page_size: usize,
    pub currency: String,
    pub fees: FeeSchedule,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            page_size: 6,
            currency: "RUB".to_owned(),
            fees: FeeSchedule { near: Decimal::new(100, 0), far: Decimal::new(300, 0) },
        }
    }
}

/// Capability bundle injected into every handler invocation. Handlers get
/// an explicit handle set, never module-level singletons.
#[derive(Clone)]
pub struct Capabilities {
    pub catalog: Arc<dyn Catalog>,
    pub cart: Arc<dyn CartService>,
    pub geocoder: Arc<dyn Geocoder>,
    pub directory: Arc<dyn StoreDirectory>,
    pub sessions: Arc<dyn SessionStore>,
    pub gateway: Arc<dyn OutboundGateway>,
    pub reminders: Arc<dyn ReminderScheduler>,
    pub settings: FlowSettings,
}
