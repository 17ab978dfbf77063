//! Double ratchet key schedule.

mod keys;
mod params;

pub use keys::{ChainKey, MessageKeys, RootKey};
pub use params::{initialize_alice_session, initialize_bob_session, AliceParameters, BobParameters};
