//! Admin API request and response types for giveaway events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Event status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `giveaway-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Completing,
    Ended,
    Cancelled,
    Errored,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Active => write!(f, "active"),
            EventStatus::Completing => write!(f, "completing"),
            EventStatus::Ended => write!(f, "ended"),
            EventStatus::Cancelled => write!(f, "cancelled"),
            EventStatus::Errored => write!(f, "errored"),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request payload for starting a new giveaway in a tenant.
///
/// `duration` uses the operator syntax understood by
/// [`parse_duration`](crate::duration::parse_duration), e.g. `"1d12h"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub channel_id: u64,
    pub creator_id: u64,
    pub prize: String,
    pub duration: String,
    #[serde(default = "default_winners")]
    pub winners: i64,
    /// Entrants must hold this role when the giveaway is resolved.
    #[serde(default)]
    pub required_role_id: Option<u64>,
}

/// Request payload for rerolling an ended giveaway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerollRequest {
    #[serde(default = "default_winners")]
    pub winners: i64,
}

/// Request payload for pushing the deadline of an active giveaway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendEventRequest {
    /// Additional time on top of the current deadline, e.g. `"30m"`.
    pub by: String,
}

/// Query parameters for listing the giveaways of a tenant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEventsQuery {
    /// Include ended, cancelled and errored events.
    #[serde(default)]
    pub all: bool,
}

fn default_winners() -> i64 {
    1
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Full giveaway detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    pub event_id: Uuid,
    pub tenant_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub prize: String,
    pub winner_count: u32,
    pub required_role_id: Option<u64>,
    pub creator_id: u64,
    pub status: EventStatus,
    pub winners: Vec<u64>,
    /// Unix timestamp of the deadline.
    pub deadline: i64,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub failure_reason: Option<String>,
}

/// Outcome of ending or rerolling a giveaway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionResponse {
    /// Winners were drawn and persisted.
    Completed { winners: Vec<u64>, announced: bool },
    /// Nobody qualified; the giveaway ended without winners.
    NoEntrants { announced: bool },
    /// Another trigger already finished this giveaway.
    AlreadyFinished {
        status: EventStatus,
        winners: Vec<u64>,
    },
    /// Entrants could not be resolved; the giveaway is now `errored`.
    Errored { reason: String },
    /// The deadline has not been reached yet.
    NotDue { deadline: i64 },
}

/// Outcome of cancelling a giveaway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    /// `false` when the giveaway was no longer active.
    pub cancelled: bool,
    pub status: EventStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let json = r#"{"channel_id": 42, "creator_id": 7, "prize": "Nitro", "duration": "1h"}"#;
        let req: CreateEventRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.winners, 1);
        assert_eq!(req.required_role_id, None);
    }

    #[test]
    fn test_completion_response_is_tagged() {
        let value = serde_json::to_value(CompletionResponse::NoEntrants { announced: true }).unwrap();
        assert_eq!(value["outcome"], "no_entrants");
        assert_eq!(value["announced"], true);

        let value = serde_json::to_value(CompletionResponse::AlreadyFinished {
            status: EventStatus::Ended,
            winners: vec![1],
        })
        .unwrap();
        assert_eq!(value["outcome"], "already_finished");
        assert_eq!(value["status"], "ended");
    }
}
