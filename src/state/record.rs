//! Session record: the current state plus a ring of superseded states.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::consts::limits::ARCHIVED_STATES_MAX_LENGTH;
use crate::state::SessionState;
use crate::store::{StoreError, StoreResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    current: Option<SessionState>,
    previous_states: VecDeque<SessionState>,
}

impl SessionRecord {
    /// A record with no state yet.
    pub fn new_fresh() -> Self {
        Self::default()
    }

    pub fn from_state(state: SessionState) -> Self {
        Self {
            current: Some(state),
            previous_states: VecDeque::new(),
        }
    }

    pub fn session_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    pub fn previous_states(&self) -> impl Iterator<Item = &SessionState> {
        self.previous_states.iter()
    }

    pub fn previous_state(&self, index: usize) -> Option<&SessionState> {
        self.previous_states.get(index)
    }

    pub fn previous_state_count(&self) -> usize {
        self.previous_states.len()
    }

    /// Whether any state, current or archived, was built from `base_key`.
    pub fn has_session_state(&self, version: u8, base_key: &[u8; 32]) -> bool {
        self.current
            .iter()
            .chain(self.previous_states.iter())
            .any(|state| state.session_version() == version && state.alice_base_key() == base_key)
    }

    /// Install `state` as current, archiving the old current state.
    pub fn promote_state(&mut self, state: SessionState) {
        self.archive_current_state();
        self.current = Some(state);
    }

    /// Replace the current state in place.
    pub fn set_session_state(&mut self, state: SessionState) {
        self.current = Some(state);
    }

    /// Replace the archived state at `index` by `updated` and make it current.
    /// The promoted state is flagged for refresh until a new session replaces
    /// it.
    pub fn promote_old_session(&mut self, index: usize, mut updated: SessionState) {
        updated.set_needs_refresh(true);
        self.previous_states.remove(index);
        self.promote_state(updated);
    }

    pub fn archive_current_state(&mut self) {
        if let Some(state) = self.current.take() {
            self.previous_states.push_front(state);
            self.previous_states.truncate(ARCHIVED_STATES_MAX_LENGTH);
        }
    }

    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::ratchet::{ChainKey, RootKey};
    use crate::state::SenderChain;

    fn state_with_base(base: u8) -> SessionState {
        SessionState::new(
            3,
            [1; 32],
            [2; 32],
            RootKey::new([base; 32]),
            SenderChain {
                ratchet_key: KeyPair::generate(),
                chain_key: ChainKey::new([4; 32], 0),
            },
            [base; 32],
        )
    }

    #[test]
    fn test_promote_archives_current() {
        let mut record = SessionRecord::from_state(state_with_base(1));
        record.promote_state(state_with_base(2));

        assert_eq!(record.session_state().unwrap().alice_base_key(), &[2; 32]);
        assert_eq!(record.previous_state_count(), 1);
        assert!(record.has_session_state(3, &[1; 32]));
        assert!(!record.has_session_state(2, &[1; 32]));
    }

    #[test]
    fn test_archive_is_bounded_oldest_first() {
        let mut record = SessionRecord::new_fresh();
        for base in 0..(ARCHIVED_STATES_MAX_LENGTH as u8 + 3) {
            record.promote_state(state_with_base(base));
        }

        assert_eq!(record.previous_state_count(), ARCHIVED_STATES_MAX_LENGTH);
        assert!(!record.has_session_state(3, &[0; 32]));
        assert!(!record.has_session_state(3, &[1; 32]));
        assert!(record.has_session_state(3, &[2; 32]));
    }

    #[test]
    fn test_promote_old_session() {
        let mut record = SessionRecord::from_state(state_with_base(1));
        record.promote_state(state_with_base(2));

        let old = record.previous_states().next().unwrap().clone();
        record.promote_old_session(0, old);

        assert_eq!(record.session_state().unwrap().alice_base_key(), &[1; 32]);
        assert!(record.session_state().unwrap().needs_refresh());
        assert_eq!(record.previous_states().next().unwrap().alice_base_key(), &[2; 32]);
        assert!(!record.previous_states().next().unwrap().needs_refresh());

        record.promote_state(state_with_base(3));
        assert!(!record.session_state().unwrap().needs_refresh());
    }

    #[test]
    fn test_serialization_round_trip_and_corruption() {
        let record = SessionRecord::from_state(state_with_base(7));
        let bytes = record.serialize().unwrap();
        assert_eq!(SessionRecord::deserialize(&bytes).unwrap(), record);

        assert!(matches!(
            SessionRecord::deserialize(&bytes[..bytes.len() / 2]),
            Err(StoreError::SerializationError(_))
        ));
    }
}
