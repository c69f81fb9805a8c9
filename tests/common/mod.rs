// Common test utilities for integration tests
// This module contains shared code for all integration tests

use std::collections::HashMap;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use log::{debug, LevelFilter};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout, Duration};

use optimist::{ChatEvent, Message, RemoteSend, SendError};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Transport whose sends only finish when the test says so, keyed by message text
#[derive(Default)]
pub struct ScriptedTransport {
    waiting: Mutex<HashMap<String, oneshot::Sender<Result<Message, SendError>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle the send of `text`, waiting for it to reach the transport first
    pub async fn resolve(&self, text: &str, succeed: bool) {
        let wait = async {
            loop {
                let tx = self.waiting.lock().unwrap().remove(text);
                if let Some(tx) = tx {
                    let outcome = if succeed {
                        Ok(Message::confirmed(text))
                    } else {
                        Err(SendError::NetworkFailure)
                    };
                    let _ = tx.send(outcome);
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        };

        timeout(Duration::from_secs(2), wait)
            .await
            .unwrap_or_else(|_| panic!("Send of {:?} never reached the transport", text));
    }
}

#[async_trait]
impl RemoteSend for ScriptedTransport {
    async fn send(&self, text: &str) -> Result<Message, SendError> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().unwrap().insert(text.to_string(), tx);
        debug!("Scripted send of {:?} waiting for the test", text);
        rx.await.unwrap_or(Err(SendError::NetworkFailure))
    }
}

/// Wait for the next `count` settled messages, skipping submit notifications
pub async fn wait_for_settled(events: &mut mpsc::Receiver<ChatEvent>, count: usize) -> Vec<Message> {
    let mut settled = Vec::new();
    while settled.len() < count {
        match timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(ChatEvent::Settled { message, .. })) => settled.push(message),
            Ok(Some(ChatEvent::Submitted { .. })) => continue,
            Ok(None) => panic!("Event channel closed"),
            Err(_) => panic!("Timed out waiting for {} settled messages, got {}", count, settled.len()),
        }
    }
    settled
}
