//! Event types published by the session engine.
//!
//! The decrypt-failure retry machine emits these for the application layer,
//! which turns them into receipt nodes on the wire.

use crate::state::PreKeyBundle;
use crate::types::JID;

/// Ask the sender to re-encrypt a message we could not decrypt.
#[derive(Debug, Clone)]
pub struct RetryReceipt {
    /// ID of the undecryptable message
    pub message_id: String,
    /// Chat the message arrived in
    pub chat: JID,
    /// Sending participant, for group messages
    pub participant: Option<JID>,
    /// Retry attempt, starting at 1
    pub count: u32,
    /// Our key material, attached from the second attempt on so the sender
    /// can rebuild the session
    pub keys: Option<PreKeyBundle>,
}

/// Receipt event for message delivery/read status
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Message IDs this receipt is for
    pub message_ids: Vec<String>,
    /// The chat JID
    pub chat: JID,
    /// Sending participant, for group messages
    pub participant: Option<JID>,
    /// Type of receipt
    pub receipt_type: ReceiptType,
    /// Timestamp of the receipt
    pub timestamp: i64,
}

/// Type of receipt
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptType {
    /// Message was delivered
    Delivered,
    /// Message was read
    Read,
}

/// A message that failed to decrypt.
#[derive(Debug, Clone)]
pub struct UndecryptableMessage {
    pub message_id: String,
    pub chat: JID,
    pub participant: Option<JID>,
    /// Display form of the decryption error
    pub error: String,
}

/// All events the engine publishes
#[derive(Debug, Clone)]
pub enum Event {
    RetryReceipt(RetryReceipt),
    Receipt(Receipt),
    UndecryptableMessage(UndecryptableMessage),
}
