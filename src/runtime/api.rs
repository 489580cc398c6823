//! API-facing request/response models.
//!
//! The HTTP layer itself lives outside this crate; these are the shapes it
//! exchanges, with camelCase field names.

use serde::{Deserialize, Serialize};

use crate::core::{
    DispatchError, Message, MessageId, ScheduleRequest, SenderStats, DEFAULT_HISTORY_LIMIT,
};
use crate::runtime::DispatchService;

/// Successful schedule response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Number of messages created.
    pub count: usize,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error category or message.
    pub error: String,
    /// Extra detail, e.g. the violated constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&DispatchError> for ErrorResponse {
    fn from(err: &DispatchError) -> Self {
        match err {
            DispatchError::Validation(v) => Self {
                error: "Validation Error".into(),
                details: Some(v.to_string()),
            },
            other => Self {
                error: other.to_string(),
                details: None,
            },
        }
    }
}

/// Body of a star update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarRequest {
    /// New flag value.
    pub is_starred: bool,
}

/// Query string of a history request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Maximum records returned; [`DEFAULT_HISTORY_LIMIT`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Configured worker count.
    pub workers: usize,
    /// Live queue entries.
    pub queued: usize,
}

/// Schedule a batch and shape the result for the request layer.
pub async fn schedule(
    service: &DispatchService,
    request: &ScheduleRequest,
) -> Result<ScheduleResponse, ErrorResponse> {
    let receipt = service
        .schedule(request)
        .await
        .map_err(|e| ErrorResponse::from(&e))?;
    Ok(ScheduleResponse {
        success: true,
        message: format!("Scheduled {} emails.", receipt.count),
        count: receipt.count,
    })
}

/// Per-sender counts.
pub async fn stats(service: &DispatchService, sender_id: &str) -> Result<SenderStats, ErrorResponse> {
    service
        .sender_stats(sender_id)
        .await
        .map_err(|e| ErrorResponse::from(&e))
}

/// A sender's messages, newest first.
pub async fn history(
    service: &DispatchService,
    sender_id: &str,
    query: HistoryQuery,
) -> Result<Vec<Message>, ErrorResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    service
        .history(sender_id, limit)
        .await
        .map_err(|e| ErrorResponse::from(&e))
}

/// Set the starred flag of one message.
pub async fn star(
    service: &DispatchService,
    id: MessageId,
    request: StarRequest,
) -> Result<Message, ErrorResponse> {
    service
        .set_starred(id, request.is_starred)
        .await
        .map_err(|e| ErrorResponse::from(&e))
}

/// Current service health.
#[must_use]
pub fn health(service: &DispatchService) -> Health {
    Health {
        ok: service.is_running(),
        workers: service.stats().worker_count,
        queued: service.queue().len(),
    }
}
