//! Telegram Bot API integration.
//!
//! - `wire` - update payloads and their mapping onto the flow's inbound
//!   event type
//! - `api` - reqwest client for the outbound surface (messages, photos,
//!   locations, invoices, callback answers) and long-poll `getUpdates`
//! - `poller` - update transport trait plus the long-poll runner
//! - `router` - per-user ordered queues drained by spawned workers

pub mod api;
pub mod poller;
pub mod router;
pub mod wire;

pub use api::{ApiError, TelegramClient};
pub use poller::{LongPollRunner, LongPollSource, PollPolicy, UpdateSource};
pub use router::{InboundHandler, UserRouter};
