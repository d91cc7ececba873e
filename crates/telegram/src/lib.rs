//! Telegram interface for rosterbot
//!
//! - **Polling** (`polling`) - long-poll runner with reconnect backoff over a `BotTransport`
//! - **Bot API** (`api`) - `HttpBotTransport`, the reqwest-backed transport
//! - **Events** (`events`) - update envelopes, dispatcher and conversation handlers
//! - **Commands** (`commands`) - `/start`, `/menu`, `/cancel`, `/help`
//! - **Keyboards** (`keyboard`) - inline keyboard message builders
//!
//! # Architecture
//!
//! ```text
//! getUpdates → PollingRunner → EventDispatcher → Handlers → ConversationService
//!                   ↓
//!              sendMessage ← OutgoingMessage ← Reply
//! ```

pub mod api;
pub mod commands;
pub mod events;
pub mod keyboard;
pub mod polling;

pub use api::HttpBotTransport;
pub use events::{conversation_dispatcher, ConversationPort, EventDispatcher};
pub use polling::{
    BotTransport, NoopBotTransport, PollingHealth, PollingRunner, PollingSnapshot, PollingState,
    ReconnectPolicy, TransportError,
};
