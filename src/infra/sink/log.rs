//! Delivery sink that only logs.
//!
//! Stands in for a real transport in development: every delivery succeeds
//! and is reported through `tracing` with a fresh reference.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::core::{DeliveryError, DeliveryReceipt, DeliverySink, Envelope};

/// Simulated transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryReceipt, DeliveryError> {
        let message_ref = format!("log-{}", Uuid::new_v4());
        info!(
            from = %envelope.sender,
            to = %envelope.recipient,
            subject = %envelope.subject,
            body_len = envelope.body.len(),
            message_ref = %message_ref,
            "simulated delivery"
        );
        Ok(DeliveryReceipt { message_ref })
    }
}
