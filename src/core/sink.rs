//! Delivery sink abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::message::DispatchJob;
use crate::core::DeliveryError;

/// What the sink transmits. Payload fields are passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender identity, for transports that need a from-address.
    pub sender: String,
    /// Destination address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub body: String,
}

impl From<&DispatchJob> for Envelope {
    fn from(job: &DispatchJob) -> Self {
        Self {
            sender: job.sender_id.clone(),
            recipient: job.recipient.clone(),
            subject: job.subject.clone(),
            body: job.body.clone(),
        }
    }
}

/// Transport acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Transport-assigned message reference.
    pub message_ref: String,
}

/// External capability that actually transmits a message.
///
/// A single call makes a single attempt; retrying is the work queue's job.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Transmit `envelope`.
    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryReceipt, DeliveryError>;
}
