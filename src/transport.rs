// Simulated remote side of the chat. There is no network here: a send waits
// out a fixed latency and then succeeds or fails at random.

use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use thiserror::Error;

use crate::models::Message;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Failed to send message")]
    NetworkFailure,
}

/// The remote call a submission waits on
#[async_trait]
pub trait RemoteSend: Send + Sync {
    async fn send(&self, text: &str) -> Result<Message, SendError>;
}

/// Wait `delay`, then fail with probability `failure_rate` or return a confirmed message.
pub async fn simulate_remote_send(
    text: &str,
    delay: Duration,
    failure_rate: f64,
) -> Result<Message, SendError> {
    tokio::time::sleep(delay).await;

    // random() is in [0, 1), so 0.0 never fails and 1.0 always does
    if rand::random::<f64>() < failure_rate {
        debug!("Simulated network failure for {:?}", text);
        return Err(SendError::NetworkFailure);
    }

    Ok(Message::confirmed(text))
}

#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    delay: Duration,
    failure_rate: f64,
}

impl SimulatedTransport {
    pub fn new(delay: Duration, failure_rate: f64) -> Self {
        Self { delay, failure_rate }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.delay(), settings.failure_rate)
    }
}

#[async_trait]
impl RemoteSend for SimulatedTransport {
    async fn send(&self, text: &str) -> Result<Message, SendError> {
        simulate_remote_send(text, self.delay, self.failure_rate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryStatus;

    #[tokio::test]
    async fn test_never_fails_at_zero_rate() {
        let transport = SimulatedTransport::new(Duration::ZERO, 0.0);
        for _ in 0..50 {
            let msg = transport.send("hi").await.expect("Rate 0.0 should not fail");
            assert_eq!(msg.status, DeliveryStatus::Sent);
            assert_eq!(msg.text, "hi");
            assert!(!msg.is_temporary());
        }
    }

    #[tokio::test]
    async fn test_always_fails_at_full_rate() {
        let transport = SimulatedTransport::new(Duration::ZERO, 1.0);
        for _ in 0..50 {
            assert_eq!(transport.send("hi").await, Err(SendError::NetworkFailure));
        }
    }

    #[tokio::test]
    async fn test_failure_distribution() {
        let trials = 2000;
        let mut failures = 0;
        for _ in 0..trials {
            if simulate_remote_send("x", Duration::ZERO, 0.2).await.is_err() {
                failures += 1;
            }
        }

        // Expected 400, more than five standard deviations of slack either side
        assert!(
            (300..=500).contains(&failures),
            "Expected roughly 20% failures, got {}/{}",
            failures,
            trials
        );
    }

    #[tokio::test]
    async fn test_waits_for_delay() {
        let delay = Duration::from_millis(50);
        let transport = SimulatedTransport::new(delay, 0.0);

        let started = tokio::time::Instant::now();
        transport.send("slow").await.unwrap();
        assert!(started.elapsed() >= delay);
    }

    #[tokio::test]
    async fn test_confirmed_ids_are_unique() {
        let transport = SimulatedTransport::new(Duration::ZERO, 0.0);
        let a = transport.send("a").await.unwrap();
        let b = transport.send("a").await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
