//! WhatsApp JID (Jabber ID) parsing.
//!
//! The dispatcher hands the engine peer and group identifiers as JID strings;
//! only the user, agent and device parts matter for Signal addressing.

use std::fmt;
use std::str::FromStr;

/// Known JID servers on WhatsApp
pub mod servers {
    pub const DEFAULT_USER: &str = "s.whatsapp.net";
    pub const GROUP: &str = "g.us";
    pub const BROADCAST: &str = "broadcast";
    pub const HIDDEN_USER: &str = "lid";
}

/// Domain type constants
pub const WHATSAPP_DOMAIN: u8 = 0;
pub const LID_DOMAIN: u8 = 1;

/// JID represents a WhatsApp user, device or group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JID {
    pub user: String,
    pub raw_agent: u8,
    pub device: u16,
    pub server: String,
}

impl JID {
    /// Creates a new regular JID.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            ..Default::default()
        }
    }

    /// Returns the actual agent/domain type.
    pub fn actual_agent(&self) -> u8 {
        match self.server.as_str() {
            servers::DEFAULT_USER => WHATSAPP_DOMAIN,
            servers::HIDDEN_USER => LID_DOMAIN,
            _ => self.raw_agent,
        }
    }

    /// Whether this JID addresses a group or broadcast list.
    pub fn is_group(&self) -> bool {
        self.server == servers::GROUP || self.server == servers::BROADCAST
    }

    /// Returns the signal address user string.
    pub fn signal_address_user(&self) -> String {
        let agent = self.actual_agent();
        if agent != 0 {
            format!("{}_{}", self.user, agent)
        } else {
            self.user.clone()
        }
    }
}

impl fmt::Display for JID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw_agent > 0 {
            write!(f, "{}.{}:{}@{}", self.user, self.raw_agent, self.device, self.server)
        } else if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if !self.user.is_empty() {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}", self.server)
        }
    }
}

/// Error type for JID parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseJIDError(pub String);

impl fmt::Display for ParseJIDError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse JID: {}", self.0)
    }
}

impl std::error::Error for ParseJIDError {}

impl FromStr for JID {
    type Err = ParseJIDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((user_str, server)) = s.split_once('@') else {
            // Bare identifiers are treated as users on the default server.
            return Ok(JID::new(s, servers::DEFAULT_USER));
        };
        if server.contains('@') {
            return Err(ParseJIDError("unexpected number of @ in JID".to_string()));
        }

        let mut jid = JID::new(user_str, server);

        let (user, device) = match user_str.split_once(':') {
            Some((user, device)) => (user, Some(device)),
            None => (user_str, None),
        };
        if let Some(device) = device {
            jid.device = device
                .parse()
                .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?;
        }

        // AD JID format (user.agent:device@server)
        match user.split_once('.') {
            Some((name, agent)) => {
                jid.user = name.to_string();
                jid.raw_agent = agent
                    .parse()
                    .map_err(|_| ParseJIDError("failed to parse agent from JID".to_string()))?;
            }
            None => jid.user = user.to_string(),
        }

        Ok(jid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_jid() {
        let jid: JID = "1234567890@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.server, servers::DEFAULT_USER);
        assert_eq!(jid.device, 0);
        assert_eq!(jid.raw_agent, 0);
    }

    #[test]
    fn test_parse_device_jid() {
        let jid: JID = "1234567890:2@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 2);
    }

    #[test]
    fn test_parse_ad_jid() {
        let jid: JID = "1234567890.0:1@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.raw_agent, 0);
        assert_eq!(jid.device, 1);
    }

    #[test]
    fn test_parse_bare_user() {
        let jid: JID = "alice".parse().unwrap();
        assert_eq!(jid.user, "alice");
        assert_eq!(jid.server, servers::DEFAULT_USER);
    }

    #[test]
    fn test_parse_rejects_bad_device() {
        assert!("123:x@s.whatsapp.net".parse::<JID>().is_err());
        assert!("123.y@s.whatsapp.net".parse::<JID>().is_err());
    }

    #[test]
    fn test_lid_address_user() {
        let jid: JID = "9876@lid".parse().unwrap();
        assert_eq!(jid.signal_address_user(), "9876_1");
    }

    #[test]
    fn test_jid_to_string() {
        let jid = JID::new("1234567890", servers::DEFAULT_USER);
        assert_eq!(jid.to_string(), "1234567890@s.whatsapp.net");

        let jid = JID {
            user: "1234567890".to_string(),
            device: 2,
            server: servers::DEFAULT_USER.to_string(),
            ..Default::default()
        };
        assert_eq!(jid.to_string(), "1234567890:2@s.whatsapp.net");
    }

    #[test]
    fn test_group_jid() {
        let jid: JID = "123456789-1234567890@g.us".parse().unwrap();
        assert_eq!(jid.user, "123456789-1234567890");
        assert!(jid.is_group());
    }
}
