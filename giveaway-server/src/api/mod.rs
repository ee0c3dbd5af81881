//! Admin API handlers.
//!
//! Every endpoint requires the `Giveaway-Admin-Authorization` header with the
//! plaintext admin secret.
//!
//! # Endpoints
//!
//! - `POST /tenants/{tenant_id}/events`  – start a giveaway
//! - `GET  /tenants/{tenant_id}/events`  – list giveaways (`?all=true` includes finished ones)
//! - `GET  /events/{event_id}`           – show one giveaway
//! - `POST /events/{event_id}/end`       – end now and draw winners
//! - `POST /events/{event_id}/cancel`    – cancel without drawing
//! - `POST /events/{event_id}/reroll`    – draw new winners for an ended giveaway
//! - `POST /events/{event_id}/extend`    – push the deadline back

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use giveaway_core::entities::GiveawayEvent;
use giveaway_core::service::{CompletionResult, ServiceError};
use giveaway_sdk::objects::{CompletionResponse, EventResponse};

use crate::state::AppState;

pub mod extractors;
mod events;

#[cfg(test)]
mod tests;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants/{tenant_id}/events",
            post(events::create_event).get(events::list_events),
        )
        .route("/events/{event_id}", get(events::get_event))
        .route("/events/{event_id}/end", post(events::end_event))
        .route("/events/{event_id}/cancel", post(events::cancel_event))
        .route("/events/{event_id}/reroll", post(events::reroll_event))
        .route("/events/{event_id}/extend", post(events::extend_event))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::Service(ServiceError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            ApiError::Service(ServiceError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "giveaway not found").into_response()
            }
            ApiError::Service(e @ ServiceError::InvalidState { .. }) => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            ApiError::Service(ServiceError::Gateway(e)) => {
                tracing::warn!(error = %e, "Admin API gateway error");
                (StatusCode::BAD_GATEWAY, "messaging gateway error").into_response()
            }
            ApiError::Service(e @ ServiceError::PartialFailure { .. }) => {
                tracing::error!(error = %e, "Admin API partial failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "announcement posted but giveaway not saved",
                )
                    .into_response()
            }
            ApiError::Service(ServiceError::Storage(e)) => {
                tracing::error!(error = %e, "Admin API storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared conversion helpers
// ---------------------------------------------------------------------------

pub(crate) fn event_to_response(event: &GiveawayEvent) -> EventResponse {
    EventResponse {
        event_id: event.id.0,
        tenant_id: event.tenant_id.0,
        channel_id: event.channel_id.0,
        message_id: event.announcement.message_id.0,
        prize: event.prize.clone(),
        winner_count: event.winner_count,
        required_role_id: event.eligibility.required_role().map(|role| role.0),
        creator_id: event.creator_id.0,
        status: event.status.into(),
        winners: event.winners.iter().map(|user| user.0).collect(),
        deadline: event.deadline.unix_timestamp(),
        created_at: event.created_at.unix_timestamp(),
        completed_at: event.completed_at.map(|t| t.unix_timestamp()),
        failure_reason: event.failure_reason.clone(),
    }
}

pub(crate) fn completion_to_response(result: CompletionResult) -> CompletionResponse {
    match result {
        CompletionResult::Completed { winners, announced } => CompletionResponse::Completed {
            winners: winners.into_iter().map(|user| user.0).collect(),
            announced,
        },
        CompletionResult::NoEntrants { announced } => CompletionResponse::NoEntrants { announced },
        CompletionResult::AlreadyFinished { status, winners } => {
            CompletionResponse::AlreadyFinished {
                status: status.into(),
                winners: winners.into_iter().map(|user| user.0).collect(),
            }
        }
        CompletionResult::Errored { reason } => CompletionResponse::Errored { reason },
        CompletionResult::NotDue { deadline } => CompletionResponse::NotDue {
            deadline: deadline.unix_timestamp(),
        },
    }
}
