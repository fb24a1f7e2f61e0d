//! Hand-off of alert-worthy matches to the delivery side.
//!
//! The pipeline does not talk to notification providers itself. It emits
//! an [`AlertSignal`] carrying the policy's provider list to an
//! [`AlertSink`], which forwards it to whatever does the delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;
use watchpost_core::EventId;

use crate::error::DeliveryError;

/// A match that passed throttling and should be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSignal {
    pub id: Uuid,
    pub policy_id: String,
    pub policy_name: String,
    pub tenant_id: Option<String>,
    pub event_id: EventId,
    pub event_type: String,
    /// Copied unchanged from the policy.
    pub providers: Vec<String>,
    pub suppression_key: String,
    /// Alerts raised by this policy in the current hour, this one included.
    /// `None` when the throttle store was unavailable and the fail mode
    /// let the alert through.
    pub alert_count: Option<u32>,
    pub triggered_at: DateTime<Utc>,
}

/// Receiver of alert signals.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, signal: &AlertSignal) -> Result<(), DeliveryError>;

    /// Human-readable name for logs.
    fn sink_name(&self) -> &str;
}

/// Forwards signals into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<AlertSignal>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AlertSignal>) -> Self {
        Self { tx }
    }

    /// A sink and the receiving end of its bounded channel.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AlertSignal>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait::async_trait]
impl AlertSink for ChannelSink {
    async fn deliver(&self, signal: &AlertSignal) -> Result<(), DeliveryError> {
        self.tx
            .send(signal.clone())
            .await
            .map_err(|_| DeliveryError::Closed)
    }

    fn sink_name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> AlertSignal {
        AlertSignal {
            id: Uuid::new_v4(),
            policy_id: "p1".to_string(),
            policy_name: "Policy one".to_string(),
            tenant_id: None,
            event_id: Uuid::new_v4(),
            event_type: "login".to_string(),
            providers: vec!["slack".to_string()],
            suppression_key: "default".to_string(),
            alert_count: Some(1),
            triggered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::channel(4);
        let s = signal();
        sink.deliver(&s).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), s);
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert!(matches!(sink.deliver(&signal()).await, Err(DeliveryError::Closed)));
    }
}
