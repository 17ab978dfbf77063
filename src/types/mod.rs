//! Types module for addressing and engine notifications.
//!
//! This module contains JIDs, the Signal addresses derived from them and the
//! events the engine publishes to the application layer.

mod address;
mod jid;
mod events;

pub use address::*;
pub use jid::*;
pub use events::*;
