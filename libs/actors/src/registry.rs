//! Mailbox Registry
//!
//! Name-addressed mailboxes of the actors living in one domain.

use crate::error::{DeliveryFailure, Result, RuntimeError};
use cells_types::Envelope;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Whether other domains may address the actor by name alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Exported,
    Private,
}

/// Receiving end of an actor's mailbox
#[derive(Debug)]
pub struct Mailbox {
    actor: String,
    receiver: mpsc::Receiver<Envelope>,
}

impl Mailbox {
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Next envelope; `None` once the mailbox is closed and drained
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct MailboxEntry {
    sender: mpsc::Sender<Envelope>,
    visibility: Visibility,
}

#[derive(Debug)]
pub(crate) struct MailboxRegistry {
    entries: RwLock<HashMap<String, MailboxEntry>>,
    capacity: usize,
}

impl MailboxRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn open(&self, actor: &str, visibility: Visibility) -> Result<Mailbox> {
        let mut entries = self.entries.write();
        if entries.contains_key(actor) {
            return Err(RuntimeError::DuplicateMailbox {
                actor: actor.to_string(),
            });
        }
        let (sender, receiver) = mpsc::channel(self.capacity);
        entries.insert(actor.to_string(), MailboxEntry { sender, visibility });
        Ok(Mailbox {
            actor: actor.to_string(),
            receiver,
        })
    }

    pub(crate) fn close(&self, actor: &str) -> Result<Visibility> {
        self.entries
            .write()
            .remove(actor)
            .map(|entry| entry.visibility)
            .ok_or_else(|| RuntimeError::UnknownMailbox {
                actor: actor.to_string(),
            })
    }

    pub(crate) fn contains(&self, actor: &str) -> bool {
        self.entries.read().contains_key(actor)
    }

    /// Names of exported actors, sorted
    pub(crate) fn exported(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.visibility == Visibility::Exported)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Put `envelope` into the mailbox of `actor` without waiting
    pub(crate) fn offer(&self, actor: &str, envelope: Envelope) -> std::result::Result<(), DeliveryFailure> {
        let entries = self.entries.read();
        let Some(entry) = entries.get(actor) else {
            return Err(DeliveryFailure::new(
                envelope,
                RuntimeError::UnknownMailbox {
                    actor: actor.to_string(),
                },
            ));
        };
        entry.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(envelope) => DeliveryFailure::new(
                envelope,
                RuntimeError::MailboxFull {
                    actor: actor.to_string(),
                },
            ),
            mpsc::error::TrySendError::Closed(envelope) => DeliveryFailure::new(
                envelope,
                RuntimeError::UnknownMailbox {
                    actor: actor.to_string(),
                },
            ),
        })
    }
}
