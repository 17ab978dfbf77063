//! Group messaging with sender keys.

mod builder;
mod cipher;

pub use builder::GroupSessionBuilder;
pub use cipher::GroupCipher;
