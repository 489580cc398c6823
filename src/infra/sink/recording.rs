//! Delivery sink that records envelopes, with scriptable failures.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{DeliveryError, DeliveryReceipt, DeliverySink, Envelope};
use crate::util::clock::Clock;

/// A delivery as seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDelivery {
    /// What was delivered.
    pub envelope: Envelope,
    /// Clock reading at delivery.
    pub at_ms: u128,
}

#[derive(Debug, Default)]
struct RecordingState {
    delivered: Vec<RecordedDelivery>,
    scripted_failures: VecDeque<String>,
    fail_always: Option<String>,
}

/// In-memory transport for tests and simulations.
///
/// Clones share the same record.
#[derive(Clone)]
pub struct RecordingSink {
    state: Arc<Mutex<RecordingState>>,
    clock: Arc<dyn Clock>,
}

impl RecordingSink {
    /// Create a sink stamping deliveries with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState::default())),
            clock,
        }
    }

    /// Fail the next delivery attempt with `reason`. Calls queue up.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().scripted_failures.push_back(reason.into());
    }

    /// Fail every attempt with `reason` until cleared with `None`.
    pub fn fail_always(&self, reason: Option<String>) {
        self.state.lock().fail_always = reason;
    }

    /// Successful deliveries, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<RecordedDelivery> {
        self.state.lock().delivered.clone()
    }

    /// Successful deliveries from `sender`.
    #[must_use]
    pub fn delivered_from(&self, sender: &str) -> Vec<RecordedDelivery> {
        self.state
            .lock()
            .delivered
            .iter()
            .filter(|d| d.envelope.sender == sender)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryReceipt, DeliveryError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.scripted_failures.pop_front() {
            return Err(DeliveryError::new(reason));
        }
        if let Some(reason) = &state.fail_always {
            return Err(DeliveryError::new(reason.clone()));
        }
        state.delivered.push(RecordedDelivery {
            envelope: envelope.clone(),
            at_ms: self.clock.now_ms(),
        });
        Ok(DeliveryReceipt {
            message_ref: format!("rec-{}", state.delivered.len()),
        })
    }
}
