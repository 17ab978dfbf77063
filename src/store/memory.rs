//! In-memory store implementation for development and testing.
//!
//! Session and sender-key records are kept in serialized form, so a corrupt
//! record surfaces as an error exactly as it would from a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::crypto::KeyPair;
use crate::state::{SenderKeyRecord, SessionRecord};
use crate::store::{
    next_pre_key_id, Device, IdentityKeyStore, PreKeyRecord, PreKeyStore, SenderKeyStore, SessionStore,
    SignedPreKeyRecord, SignedPreKeyStore, StoreError, StoreResult,
};
use crate::types::{ProtocolAddress, SenderKeyName};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::DatabaseError("lock poisoned".to_string())
}

/// In-memory implementation of all store traits.
pub struct MemoryStore {
    device: Device,
    identities: RwLock<HashMap<ProtocolAddress, [u8; 32]>>,
    sessions: RwLock<HashMap<ProtocolAddress, Vec<u8>>>,
    pre_keys: RwLock<BTreeMap<u32, PreKeyRecord>>,
    last_pre_key_id: RwLock<u32>,
    signed_pre_keys: RwLock<HashMap<u32, SignedPreKeyRecord>>,
    sender_keys: RwLock<HashMap<SenderKeyName, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a store for a freshly initialized device.
    pub fn new() -> Self {
        let mut device = Device::new();
        device.initialize();
        Self::with_device(device)
    }

    /// Create a store around an existing device.
    pub fn with_device(device: Device) -> Self {
        let signed_pre_keys = device
            .signed_pre_key
            .iter()
            .map(|record| (record.id, record.clone()))
            .collect();
        Self {
            device,
            identities: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            pre_keys: RwLock::new(BTreeMap::new()),
            last_pre_key_id: RwLock::new(0),
            signed_pre_keys: RwLock::new(signed_pre_keys),
            sender_keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityKeyStore for MemoryStore {
    fn get_identity_key_pair(&self) -> StoreResult<KeyPair> {
        self.device.identity_key.clone().ok_or(StoreError::NotFound)
    }

    fn get_local_registration_id(&self) -> StoreResult<u32> {
        if !self.device.initialized {
            return Err(StoreError::NotFound);
        }
        Ok(self.device.registration_id)
    }

    fn save_identity(&self, address: &ProtocolAddress, identity: &[u8; 32]) -> StoreResult<bool> {
        let mut identities = self.identities.write().map_err(poisoned)?;
        let previous = identities.insert(address.clone(), *identity);
        Ok(previous.is_some_and(|key| &key != identity))
    }

    fn is_trusted_identity(&self, address: &ProtocolAddress, identity: &[u8; 32]) -> StoreResult<bool> {
        let identities = self.identities.read().map_err(poisoned)?;
        match identities.get(address) {
            Some(stored) => Ok(stored == identity),
            None => Ok(true), // Trust on first use
        }
    }

    fn get_identity(&self, address: &ProtocolAddress) -> StoreResult<Option<[u8; 32]>> {
        let identities = self.identities.read().map_err(poisoned)?;
        Ok(identities.get(address).copied())
    }
}

impl SessionStore for MemoryStore {
    fn load_session(&self, address: &ProtocolAddress) -> StoreResult<Option<SessionRecord>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        sessions
            .get(address)
            .map(|bytes| SessionRecord::deserialize(bytes))
            .transpose()
    }

    fn store_session(&self, address: &ProtocolAddress, record: &SessionRecord) -> StoreResult<()> {
        let bytes = record.serialize()?;
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(address.clone(), bytes);
        Ok(())
    }

    fn contains_session(&self, address: &ProtocolAddress) -> StoreResult<bool> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.contains_key(address))
    }

    fn delete_session(&self, address: &ProtocolAddress) -> StoreResult<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.remove(address);
        Ok(())
    }
}

impl PreKeyStore for MemoryStore {
    fn load_pre_key(&self, id: u32) -> StoreResult<Option<PreKeyRecord>> {
        let pre_keys = self.pre_keys.read().map_err(poisoned)?;
        Ok(pre_keys.get(&id).cloned())
    }

    fn store_pre_key(&self, record: &PreKeyRecord) -> StoreResult<()> {
        let mut pre_keys = self.pre_keys.write().map_err(poisoned)?;
        pre_keys.insert(record.id, record.clone());
        *self.last_pre_key_id.write().map_err(poisoned)? = record.id;
        Ok(())
    }

    fn contains_pre_key(&self, id: u32) -> StoreResult<bool> {
        let pre_keys = self.pre_keys.read().map_err(poisoned)?;
        Ok(pre_keys.contains_key(&id))
    }

    fn remove_pre_key(&self, id: u32) -> StoreResult<()> {
        let mut pre_keys = self.pre_keys.write().map_err(poisoned)?;
        pre_keys.remove(&id);
        Ok(())
    }

    fn unsent_pre_keys(&self) -> StoreResult<Vec<PreKeyRecord>> {
        let pre_keys = self.pre_keys.read().map_err(poisoned)?;
        Ok(pre_keys.values().filter(|pk| !pk.sent).cloned().collect())
    }

    fn mark_pre_keys_sent(&self, ids: &[u32]) -> StoreResult<()> {
        let mut pre_keys = self.pre_keys.write().map_err(poisoned)?;
        for id in ids {
            if let Some(pk) = pre_keys.get_mut(id) {
                pk.sent = true;
            }
        }
        Ok(())
    }

    fn next_pre_key_id(&self) -> StoreResult<u32> {
        let last = *self.last_pre_key_id.read().map_err(poisoned)?;
        Ok(next_pre_key_id(last))
    }
}

impl SignedPreKeyStore for MemoryStore {
    fn load_signed_pre_key(&self, id: u32) -> StoreResult<Option<SignedPreKeyRecord>> {
        let signed_pre_keys = self.signed_pre_keys.read().map_err(poisoned)?;
        Ok(signed_pre_keys.get(&id).cloned())
    }

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> StoreResult<()> {
        let mut signed_pre_keys = self.signed_pre_keys.write().map_err(poisoned)?;
        signed_pre_keys.insert(record.id, record.clone());
        Ok(())
    }

    fn active_signed_pre_key(&self) -> StoreResult<Option<SignedPreKeyRecord>> {
        let signed_pre_keys = self.signed_pre_keys.read().map_err(poisoned)?;
        Ok(signed_pre_keys.values().max_by_key(|record| record.timestamp).cloned())
    }
}

impl SenderKeyStore for MemoryStore {
    fn load_sender_key(&self, name: &SenderKeyName) -> StoreResult<Option<SenderKeyRecord>> {
        let sender_keys = self.sender_keys.read().map_err(poisoned)?;
        sender_keys
            .get(name)
            .map(|bytes| SenderKeyRecord::deserialize(bytes))
            .transpose()
    }

    fn store_sender_key(&self, name: &SenderKeyName, record: &SenderKeyRecord) -> StoreResult<()> {
        let bytes = record.serialize()?;
        let mut sender_keys = self.sender_keys.write().map_err(poisoned)?;
        sender_keys.insert(name.clone(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::generate_pre_keys;

    #[test]
    fn test_memory_store_identity_trust_on_first_use() {
        let store = MemoryStore::new();
        let address = ProtocolAddress::new("123", 0);

        assert!(store.is_trusted_identity(&address, &[0xab; 32]).unwrap());
        assert!(!store.save_identity(&address, &[0xab; 32]).unwrap());
        assert_eq!(store.get_identity(&address).unwrap(), Some([0xab; 32]));

        assert!(store.is_trusted_identity(&address, &[0xab; 32]).unwrap());
        assert!(!store.is_trusted_identity(&address, &[0xcd; 32]).unwrap());
        assert!(store.save_identity(&address, &[0xcd; 32]).unwrap());
    }

    #[test]
    fn test_memory_store_session() {
        let store = MemoryStore::new();
        let address = ProtocolAddress::new("123", 0);
        let record = SessionRecord::new_fresh();

        store.store_session(&address, &record).unwrap();

        assert!(store.contains_session(&address).unwrap());
        assert_eq!(store.load_session(&address).unwrap(), Some(record));

        store.delete_session(&address).unwrap();
        assert!(store.load_session(&address).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_session_is_surfaced() {
        let store = MemoryStore::new();
        let address = ProtocolAddress::new("123", 0);
        store.sessions.write().unwrap().insert(address.clone(), b"{not json".to_vec());

        assert!(matches!(
            store.load_session(&address),
            Err(StoreError::SerializationError(_))
        ));
    }

    #[test]
    fn test_pre_key_bookkeeping() {
        let store = MemoryStore::new();
        assert_eq!(store.next_pre_key_id().unwrap(), 1);

        for record in generate_pre_keys(store.next_pre_key_id().unwrap(), 4) {
            store.store_pre_key(&record).unwrap();
        }
        assert_eq!(store.next_pre_key_id().unwrap(), 5);
        assert_eq!(store.unsent_pre_keys().unwrap().len(), 4);

        store.mark_pre_keys_sent(&[1, 2]).unwrap();
        let unsent: Vec<u32> = store.unsent_pre_keys().unwrap().iter().map(|pk| pk.id).collect();
        assert_eq!(unsent, vec![3, 4]);

        store.remove_pre_key(3).unwrap();
        assert!(!store.contains_pre_key(3).unwrap());
        assert!(store.contains_pre_key(4).unwrap());
    }

    #[test]
    fn test_signed_pre_key_from_device() {
        let store = MemoryStore::new();
        let active = store.active_signed_pre_key().unwrap().unwrap();
        assert_eq!(active.id, 1);
        assert_eq!(store.load_signed_pre_key(1).unwrap(), Some(active));
        assert!(store.load_signed_pre_key(2).unwrap().is_none());
    }

    #[test]
    fn test_uninitialized_device_has_no_identity() {
        let store = MemoryStore::with_device(Device::new());
        assert_eq!(store.get_identity_key_pair(), Err(StoreError::NotFound));
        assert_eq!(store.get_local_registration_id(), Err(StoreError::NotFound));
    }
}
