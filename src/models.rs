use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Prefix of the local token given to a message before the remote side confirms it
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Me,
    Other(String),
}

impl Sender {
    pub fn display_name(&self) -> &str {
        match self {
            Sender::Me => "You",
            Sender::Other(name) => name,
        }
    }

    pub fn is_me(&self) -> bool {
        matches!(self, Sender::Me)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DeliveryStatus {
    Sending, // Waiting on the remote call
    Sent,    // Confirmed by the remote side
    Failed,  // Remote call failed, terminal
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("cannot move message status from {from:?} to {to:?}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

impl DeliveryStatus {
    /// Status only moves forward, from Sending to one of the settled states.
    pub fn advance(self, next: DeliveryStatus) -> Result<DeliveryStatus, StatusError> {
        match (self, next) {
            (DeliveryStatus::Sending, DeliveryStatus::Sent)
            | (DeliveryStatus::Sending, DeliveryStatus::Failed) => Ok(next),
            (from, to) => Err(StatusError::InvalidTransition { from, to }),
        }
    }

    pub fn is_settled(self) -> bool {
        self != DeliveryStatus::Sending
    }
}

/// How a submission is shown while the remote call is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// The message shows up immediately with status Sending
    Optimistic,
    /// The message shows up only once the remote call settles
    Confirmed,
}

impl Default for SendMode {
    fn default() -> Self {
        SendMode::Optimistic
    }
}

impl SendMode {
    pub fn toggled(self) -> Self {
        match self {
            SendMode::Optimistic => SendMode::Confirmed,
            SendMode::Confirmed => SendMode::Optimistic,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SendMode::Optimistic => "optimistic",
            SendMode::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl Message {
    /// A locally created entry carrying a temporary token instead of a server id.
    pub fn sending(text: &str) -> Self {
        Message {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()),
            text: text.to_string(),
            sender: Sender::Me,
            timestamp: Utc::now(),
            status: DeliveryStatus::Sending,
        }
    }

    /// A message the remote side accepted, with a freshly assigned id.
    pub fn confirmed(text: &str) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            sender: Sender::Me,
            timestamp: Utc::now(),
            status: DeliveryStatus::Sent,
        }
    }

    /// Turn a pending entry into its failed record. The temporary id is kept.
    pub fn into_failed(mut self) -> Result<Self, StatusError> {
        self.status = self.status.advance(DeliveryStatus::Failed)?;
        self.timestamp = Utc::now();
        Ok(self)
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// The short conversation the chat opens with
pub fn initial_messages() -> Vec<Message> {
    let now = Utc::now();
    vec![
        Message {
            id: "1".to_string(),
            text: "Hey! How are you doing?".to_string(),
            sender: Sender::Other("Friend".to_string()),
            timestamp: now - Duration::minutes(5),
            status: DeliveryStatus::Sent,
        },
        Message {
            id: "2".to_string(),
            text: "I'm doing great! Working on some React 19 features.".to_string(),
            sender: Sender::Me,
            timestamp: now - Duration::minutes(4),
            status: DeliveryStatus::Sent,
        },
    ]
}
