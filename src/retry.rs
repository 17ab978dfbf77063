//! Decrypt-failure handling for inbound messages.
//!
//! A message without a session triggers one key fetch and a synchronous
//! retry. Every other failure escalates per message id: a bare retry
//! receipt, then one carrying our keys, then the message is acknowledged as
//! delivered and given up. The plaintext of a given-up message is lost.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{Result, SignalError};
use crate::manager::SessionManager;
use crate::protocol::EncType;
use crate::state::PreKeyBundle;
use crate::store::SignalStore;
use crate::types::{Event, Receipt, ReceiptType, RetryReceipt, UndecryptableMessage, JID};

/// Fetches prekey bundles for peers we have no session with.
pub trait KeyFetcher: Send + Sync {
    /// Fetch bundles for `peers`. `force` bypasses any caching on the
    /// fetcher's side.
    fn get_pre_keys(&self, force: bool, peers: &[JID]) -> Result<Vec<(JID, PreKeyBundle)>>;
}

/// An inbound encrypted message as handed over by the node dispatcher.
#[derive(Debug, Clone)]
pub struct IncomingEnvelope {
    pub id: String,
    pub from: JID,
    pub participant: Option<JID>,
    pub enc_type: EncType,
    pub payload: Vec<u8>,
}

impl IncomingEnvelope {
    /// The device that encrypted the message.
    pub fn sender(&self) -> &JID {
        self.participant.as_ref().unwrap_or(&self.from)
    }
}

/// Retry bookkeeping for one message id.
#[derive(Debug, Clone)]
pub struct RetryInfo {
    pub error: String,
    pub original: IncomingEnvelope,
    pub attempts: u32,
}

/// Retry state keyed by message id, remembering insertion order so the
/// oldest id can be forgotten first.
#[derive(Debug, Default)]
struct PendingRetries {
    entries: HashMap<String, RetryInfo>,
    order: VecDeque<String>,
}

impl PendingRetries {
    fn get(&self, id: &str) -> Option<&RetryInfo> {
        self.entries.get(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// The entry for `id`, created from `init` when missing. Creating an
    /// entry evicts the oldest ones beyond `bound`.
    fn entry(&mut self, id: &str, bound: usize, init: impl FnOnce() -> RetryInfo) -> &mut RetryInfo {
        if !self.entries.contains_key(id) {
            while self.order.len() >= bound.max(1) {
                let Some(oldest) = self.order.pop_front() else { break };
                debug!("Forgetting retry state of message {oldest}");
                self.entries.remove(&oldest);
            }
            self.order.push_back(id.to_string());
        }
        self.entries.entry(id.to_string()).or_insert_with(init)
    }

    fn remove(&mut self, id: &str) -> Option<RetryInfo> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    Decrypted(Vec<u8>),
    /// A retry receipt with this count was emitted.
    RetryRequested(u32),
    /// The message was acknowledged without being decrypted.
    GivenUp,
}

pub struct RetryManager<S: SignalStore + ?Sized, F: KeyFetcher> {
    manager: Arc<SessionManager<S>>,
    fetcher: F,
    retries: Mutex<PendingRetries>,
    events: UnboundedSender<Event>,
}

impl<S: SignalStore + ?Sized, F: KeyFetcher> RetryManager<S, F> {
    /// Create the machine together with the receiving end of its event
    /// channel.
    pub fn new(manager: Arc<SessionManager<S>>, fetcher: F) -> (Self, UnboundedReceiver<Event>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let retry = Self {
            manager,
            fetcher,
            retries: Mutex::new(PendingRetries::default()),
            events,
        };
        (retry, receiver)
    }

    pub fn manager(&self) -> &Arc<SessionManager<S>> {
        &self.manager
    }

    /// Retry state held for `message_id`, if any.
    pub fn retry_info(&self, message_id: &str) -> Result<Option<RetryInfo>> {
        let retries = self.retries.lock().map_err(|_| SignalError::LockPoisoned("retries"))?;
        Ok(retries.get(message_id).cloned())
    }

    /// Number of message ids with retry state. Bounded by
    /// `max_pending_retries`; the oldest ids are forgotten first.
    pub fn pending_retries(&self) -> Result<usize> {
        let retries = self.retries.lock().map_err(|_| SignalError::LockPoisoned("retries"))?;
        Ok(retries.len())
    }

    /// Decrypt `envelope`, recovering decryption failures locally. Only
    /// store and lock failures are returned as errors.
    pub fn handle(&self, envelope: &IncomingEnvelope) -> Result<DecryptOutcome> {
        let result = match self.decrypt(envelope) {
            Err(SignalError::NoSession(address)) => {
                debug!("No session with {address}, fetching keys for {}", envelope.sender());
                self.fetch_and_retry(envelope, SignalError::NoSession(address))
            }
            other => other,
        };

        match result {
            Ok(plaintext) => {
                self.retries
                    .lock()
                    .map_err(|_| SignalError::LockPoisoned("retries"))?
                    .remove(&envelope.id);
                Ok(DecryptOutcome::Decrypted(plaintext))
            }
            Err(err) if err.is_decrypt_failure() => self.record_failure(envelope, err),
            Err(err) => Err(err),
        }
    }

    fn decrypt(&self, envelope: &IncomingEnvelope) -> Result<Vec<u8>> {
        self.manager.decrypt(
            &envelope.from,
            envelope.participant.as_ref(),
            &envelope.payload,
            envelope.enc_type,
        )
    }

    fn fetch_and_retry(&self, envelope: &IncomingEnvelope, original: SignalError) -> Result<Vec<u8>> {
        let bundles = match self.fetcher.get_pre_keys(false, std::slice::from_ref(envelope.sender())) {
            Ok(bundles) => bundles,
            Err(err) => {
                warn!("Failed to fetch prekeys for {}: {err}", envelope.sender());
                return Err(original);
            }
        };
        if bundles.is_empty() {
            return Err(original);
        }
        for (peer, bundle) in &bundles {
            self.manager.create_session(peer, bundle)?;
        }
        self.decrypt(envelope)
    }

    fn record_failure(&self, envelope: &IncomingEnvelope, err: SignalError) -> Result<DecryptOutcome> {
        let cap = self.manager.config().max_retry_receipts;
        let bound = self.manager.config().max_pending_retries;
        let attempts = {
            let mut retries = self.retries.lock().map_err(|_| SignalError::LockPoisoned("retries"))?;
            let info = retries.entry(&envelope.id, bound, || RetryInfo {
                error: err.to_string(),
                original: envelope.clone(),
                attempts: 0,
            });

            if info.attempts >= cap {
                retries.remove(&envelope.id);
                None
            } else {
                info.attempts += 1;
                info.error = err.to_string();
                Some(info.attempts)
            }
        };

        let Some(count) = attempts else {
            warn!(
                "Giving up on message {} from {} after {cap} retries: {err}",
                envelope.id,
                envelope.sender()
            );
            self.emit(Event::Receipt(Receipt {
                message_ids: vec![envelope.id.clone()],
                chat: envelope.from.clone(),
                participant: envelope.participant.clone(),
                receipt_type: ReceiptType::Delivered,
                timestamp: Utc::now().timestamp(),
            }));
            return Ok(DecryptOutcome::GivenUp);
        };

        warn!(
            "Failed to decrypt message {} from {} (attempt {count}): {err}",
            envelope.id,
            envelope.sender()
        );
        if count == 1 {
            self.emit(Event::UndecryptableMessage(UndecryptableMessage {
                message_id: envelope.id.clone(),
                chat: envelope.from.clone(),
                participant: envelope.participant.clone(),
                error: err.to_string(),
            }));
        }

        let keys = if count > 1 {
            Some(self.manager.local_pre_key_bundle()?)
        } else {
            None
        };
        self.emit(Event::RetryReceipt(RetryReceipt {
            message_id: envelope.id.clone(),
            chat: envelope.from.clone(),
            participant: envelope.participant.clone(),
            count,
            keys,
        }));
        Ok(DecryptOutcome::RetryRequested(count))
    }

    /// At-most-once delivery: the event is dropped when nobody listens.
    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Event receiver closed, dropping event");
        }
    }
}
