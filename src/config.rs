use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables of the session engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of one-time prekeys generated per top-up.
    pub pre_key_batch_size: u32,
    /// Unsent prekey count below which a top-up is generated.
    pub pre_key_low_water_mark: u32,
    /// Retry receipts sent for one message before it is acknowledged and
    /// given up.
    pub max_retry_receipts: u32,
    /// Message ids with retry state held at once. The oldest id is forgotten
    /// when a new one would exceed it.
    pub max_pending_retries: usize,
    /// Whether plaintext is padded before encryption and unpadded after
    /// decryption.
    pub pad_messages: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pre_key_batch_size: 812,
            pre_key_low_water_mark: 5,
            max_retry_receipts: 2,
            max_pending_retries: 1000,
            pad_messages: true,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Override the prekey batch size.
    pub fn with_pre_key_batch_size(mut self, size: u32) -> Self {
        self.pre_key_batch_size = size;
        self
    }

    /// Override the prekey low-water mark.
    pub fn with_pre_key_low_water_mark(mut self, mark: u32) -> Self {
        self.pre_key_low_water_mark = mark;
        self
    }

    /// Override how many retry receipts are sent before giving up.
    pub fn with_max_retry_receipts(mut self, count: u32) -> Self {
        self.max_retry_receipts = count;
        self
    }

    /// Override how many message ids keep retry state.
    pub fn with_max_pending_retries(mut self, count: usize) -> Self {
        self.max_pending_retries = count;
        self
    }

    /// Enable or disable plaintext padding.
    pub fn with_pad_messages(mut self, pad: bool) -> Self {
        self.pad_messages = pad;
        self
    }
}
