// Authoritative message list. Only settled messages live here, in the order
// their remote calls settled.

use log::debug;
use thiserror::Error;

use crate::models::{DeliveryStatus, Message};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("message {0} has not settled yet")]
    NotSettled(String),
    #[error("message {0} is already stored")]
    Duplicate(String),
}

#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing conversation. Entries that have not settled are dropped.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        let mut store = Self::new();
        for message in messages {
            if let Err(e) = store.append(message) {
                debug!("Skipping seed message: {}", e);
            }
        }
        store
    }

    /// Append-only. Nothing in the store is ever reordered or removed.
    pub fn append(&mut self, message: Message) -> Result<(), StoreError> {
        if !message.status.is_settled() {
            return Err(StoreError::NotSettled(message.id));
        }
        if self.find(&message.id).is_some() {
            return Err(StoreError::Duplicate(message.id));
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last_failed(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.status == DeliveryStatus::Failed)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
