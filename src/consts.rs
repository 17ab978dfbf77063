//! Protocol constants and resource bounds.

/// Version mixed into every ciphertext message.
pub const CIPHERTEXT_MESSAGE_CURRENT_VERSION: u8 = 3;

/// Version byte prefixed to every serialized message: `version << 4 | version`.
pub const VERSION_BYTE: u8 = (CIPHERTEXT_MESSAGE_CURRENT_VERSION << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION;

/// Length of the truncated MAC appended to a WhisperMessage.
pub const MAC_LENGTH: usize = 8;

/// Length of an XEdDSA signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Encryption type tags exchanged with the node dispatcher.
pub mod enc_types {
    pub const MSG: &str = "msg";
    pub const PKMSG: &str = "pkmsg";
    pub const SKMSG: &str = "skmsg";
}

/// Bounds on retained state. Oldest entries are evicted first.
pub mod limits {
    /// Skipped message keys kept per chain for out-of-order delivery.
    pub const MAX_MESSAGE_KEYS: usize = 2000;
    /// Largest counter gap a receiving chain will walk in one decrypt.
    pub const MAX_FORWARD_JUMPS: u32 = 25_000;
    /// Receiver chains kept per session state.
    pub const MAX_RECEIVER_CHAINS: usize = 5;
    /// Superseded session states kept per record.
    pub const ARCHIVED_STATES_MAX_LENGTH: usize = 5;
    /// Sender key states kept per group sender.
    pub const MAX_SENDER_KEY_STATES: usize = 5;
}

/// Largest prekey id before wrapping back to 1.
pub const MAX_PRE_KEY_ID: u32 = 0x00FF_FFFF;
