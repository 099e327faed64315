pub mod engine;
pub mod payment;
pub mod states;

pub use engine::Dispatcher;
pub use states::{EventPayload, InboundEvent, Turn};
