pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod geo;
pub mod outbound;
pub mod pagination;
pub mod ports;
pub mod render;

pub use domain::cart::{Cart, CartItem};
pub use domain::location::{AddressRef, Coordinates, StoreId, StoreLocation};
pub use domain::product::{ImageRef, Product, ProductId};
pub use domain::session::{CartSnapshot, DeliveryMode, OrderContext, State, UserId};
pub use errors::{PortError, TurnError};
pub use geo::DeliveryTier;
pub use outbound::{InlineKeyboard, KeyboardButton, OutboundMessage};
pub use ports::{
    Capabilities, CartService, Catalog, Geocoder, OutboundGateway, ReminderScheduler,
    SessionStore, StoreDirectory,
};
