//! Persistent protocol state: sessions, session records, sender keys and
//! prekey bundles.

mod bundle;
mod record;
mod sender_key;
mod session;

pub use bundle::PreKeyBundle;
pub use record::SessionRecord;
pub use sender_key::{
    SenderChainKey, SenderKeyRecord, SenderKeyState, SenderMessageKey, SigningKey,
};
pub use session::{PendingPreKey, ReceiverChain, SenderChain, SessionState};
