//! Sender-key chain creation and distribution.

use std::sync::Arc;

use log::debug;
use rand::RngCore;

use crate::consts::limits::MAX_FORWARD_JUMPS;
use crate::crypto::KeyPair;
use crate::error::{Result, SignalError};
use crate::protocol::SenderKeyDistributionMessage;
use crate::state::{SenderChainKey, SenderKeyState, SigningKey};
use crate::store::SignalStore;
use crate::types::SenderKeyName;

pub struct GroupSessionBuilder<S: SignalStore + ?Sized> {
    store: Arc<S>,
}

impl<S: SignalStore + ?Sized> GroupSessionBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Start a new sending chain for `name` and return the message that
    /// announces it. Each call begins a new epoch; earlier chains stay in
    /// the record until the bound evicts them.
    pub fn create(&self, name: &SenderKeyName) -> Result<SenderKeyDistributionMessage> {
        let mut rng = rand::thread_rng();
        let key_id = rng.next_u32() & 0x7FFF_FFFF;
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let signing_key = KeyPair::generate();

        let distribution = SenderKeyDistributionMessage::new(key_id, 0, seed, signing_key.public);

        let mut record = self.store.load_sender_key(name)?.unwrap_or_default();
        record.add_sender_key_state(SenderKeyState::new(
            key_id,
            SenderChainKey::new(0, seed),
            SigningKey::Private(signing_key),
        ));
        self.store.store_sender_key(name, &record)?;

        debug!("Created sender key {key_id} for {name}");
        Ok(distribution)
    }

    /// Store the chain another participant announced. Trust comes from the
    /// pairwise session that delivered the message. A chain announced too
    /// close to the end of the iteration space is refused.
    pub fn process(&self, name: &SenderKeyName, message: &SenderKeyDistributionMessage) -> Result<()> {
        if message.iteration() > u32::MAX - MAX_FORWARD_JUMPS {
            return Err(SignalError::InvalidMessage(format!(
                "sender key iteration {} leaves no room to advance",
                message.iteration()
            )));
        }

        let mut record = self.store.load_sender_key(name)?.unwrap_or_default();
        record.add_sender_key_state(SenderKeyState::new(
            message.key_id(),
            SenderChainKey::new(message.iteration(), *message.chain_key()),
            SigningKey::Public(*message.signing_key()),
        ));
        self.store.store_sender_key(name, &record)?;

        debug!("Processed sender key {} for {name}", message.key_id());
        Ok(())
    }
}
