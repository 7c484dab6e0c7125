//! Client core for the Poke email-analysis chat.
//!
//! Platform-independent: the browser front end supplies a `Gateway`, a
//! `KeyValueStore` and a `Scheduler`; everything else lives here.

pub mod config;
pub mod controller;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod poll;
pub mod setup;
pub mod storage;
pub mod view;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, PollPolicy};
pub use controller::{ChatSnapshot, ConversationController};
pub use errors::AppError;
pub use gateway::Gateway;
pub use models::{DeliveryStatus, Message, Sender, UiFlags};
pub use poll::Scheduler;
pub use setup::{ConnectionSetup, SetupProgress, SetupStep};
pub use storage::{KeyValueStore, MemoryStore, SessionRepository};
