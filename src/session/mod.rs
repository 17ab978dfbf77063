//! 1:1 sessions: establishment and the double ratchet cipher.

mod builder;
mod cipher;

pub use builder::SessionBuilder;
pub use cipher::SessionCipher;
