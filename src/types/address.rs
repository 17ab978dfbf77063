//! Addresses keying session and sender-key state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::JID;

/// A remote device a 1:1 session is held with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolAddress {
    pub name: String,
    pub device_id: u32,
}

impl ProtocolAddress {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }
}

impl From<&JID> for ProtocolAddress {
    fn from(jid: &JID) -> Self {
        Self::new(jid.signal_address_user(), u32::from(jid.device))
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// A sender's chain within one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SenderKeyName {
    pub group_id: String,
    pub sender: ProtocolAddress,
}

impl SenderKeyName {
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Self {
        Self {
            group_id: group_id.into(),
            sender,
        }
    }
}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.group_id, self.sender.name, self.sender.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_jid() {
        let jid: JID = "1234567890:3@s.whatsapp.net".parse().unwrap();
        let address = ProtocolAddress::from(&jid);
        assert_eq!(address, ProtocolAddress::new("1234567890", 3));
        assert_eq!(address.to_string(), "1234567890.3");
    }

    #[test]
    fn test_sender_key_name_display() {
        let name = SenderKeyName::new("123-456@g.us", ProtocolAddress::new("555", 0));
        assert_eq!(name.to_string(), "123-456@g.us::555::0");
    }
}
