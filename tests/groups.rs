use std::sync::Arc;

use whatsmeow_signal::store::SenderKeyStore;
use whatsmeow_signal::{
    EncType, EngineConfig, MemoryStore, ProtocolAddress, SenderKeyName, SessionManager, SignalError, JID,
};

type Manager = SessionManager<MemoryStore>;

struct Group {
    alice: Manager,
    bob: Manager,
    alice_jid: JID,
    group: JID,
}

fn setup() -> Group {
    let alice = SessionManager::new(Arc::new(MemoryStore::new()), EngineConfig::default());
    let bob = SessionManager::new(Arc::new(MemoryStore::new()), EngineConfig::default());
    let alice_jid: JID = "1111111111@s.whatsapp.net".parse().unwrap();
    let group: JID = "120363000000000000@g.us".parse().unwrap();

    let distribution = alice.create_group_session(&group, &alice_jid).unwrap();
    bob.process_group_session(&group, &alice_jid, distribution.serialized())
        .unwrap();

    Group {
        alice,
        bob,
        alice_jid,
        group,
    }
}

impl Group {
    fn send(&self, text: &[u8]) -> Vec<u8> {
        self.alice
            .encrypt(&self.group, text, true, Some(&self.alice_jid))
            .unwrap()
            .serialize()
            .to_vec()
    }

    fn receive(&self, payload: &[u8]) -> Result<Vec<u8>, SignalError> {
        self.bob
            .decrypt(&self.group, Some(&self.alice_jid), payload, EncType::SkMsg)
    }
}

#[test]
fn group_round_trip() {
    let group = setup();
    for text in [&b"first"[..], &b"second"[..], &b""[..]] {
        assert_eq!(group.receive(&group.send(text)).unwrap(), text);
    }
}

#[test]
fn group_out_of_order() {
    let group = setup();
    let messages: Vec<_> = (1..=5).map(|i| group.send(format!("G{i}").as_bytes())).collect();
    for i in [3, 1, 5, 2, 4] {
        assert_eq!(group.receive(&messages[i - 1]).unwrap(), format!("G{i}").as_bytes());
    }
}

#[test]
fn flipped_signature_fails_without_advancing_chain() {
    let group = setup();
    let payload = group.send(b"authentic");
    let name = SenderKeyName::new(group.group.to_string(), ProtocolAddress::from(&group.alice_jid));
    let before = group.bob.store().load_sender_key(&name).unwrap();

    let mut tampered = payload.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    assert!(matches!(group.receive(&tampered), Err(SignalError::InvalidMessage(_))));
    assert_eq!(group.bob.store().load_sender_key(&name).unwrap(), before);
    assert_eq!(group.receive(&payload).unwrap(), b"authentic");
}

#[test]
fn rotated_chain_keeps_old_messages_readable() {
    let group = setup();
    let old = group.send(b"before rotation");

    let distribution = group
        .alice
        .create_group_session(&group.group, &group.alice_jid)
        .unwrap();
    group
        .bob
        .process_group_session(&group.group, &group.alice_jid, distribution.serialized())
        .unwrap();

    let new = group.send(b"after rotation");
    assert_eq!(group.receive(&new).unwrap(), b"after rotation");
    assert_eq!(group.receive(&old).unwrap(), b"before rotation");
}

#[test]
fn unknown_sender_has_no_sender_key() {
    let group = setup();
    let stranger: JID = "4444444444@s.whatsapp.net".parse().unwrap();
    let payload = group.send(b"hi");

    assert!(matches!(
        group.bob.decrypt(&group.group, Some(&stranger), &payload, EncType::SkMsg),
        Err(SignalError::NoSenderKey(_))
    ));
}
