//! Giveaway event handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use giveaway_core::entities::{ChannelId, Eligibility, EventId, RoleId, TenantId, UserId};
use giveaway_core::service::{CancelOutcome, CreateEvent};
use giveaway_core::store::StatusFilter;
use giveaway_sdk::duration::parse_duration;
use giveaway_sdk::objects::{
    CancelResponse, CreateEventRequest, ExtendEventRequest, ListEventsQuery, RerollRequest,
};
use std::time::Duration;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{ApiError, completion_to_response, event_to_response};

/// Keep a requested winner count inside `1..=max`.
fn clamp_winners(requested: i64, max: u32) -> u32 {
    u32::try_from(requested.clamp(1, i64::from(max))).unwrap_or(max)
}

fn parse_operator_duration(raw: &str) -> Result<Duration, ApiError> {
    parse_duration(raw).map_err(|e| ApiError::BadRequest(format!("invalid duration: {e}")))
}

/// `POST /tenants/{tenant_id}/events`: Announce and schedule a giveaway.
pub async fn create_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(tenant_id): Path<u64>,
    Json(request): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let duration = parse_operator_duration(&request.duration)?;
    let (max_winners, max_duration) = {
        let engine = state.config.engine.read().await;
        (engine.max_winners, engine.max_duration)
    };

    let event = state
        .service
        .create(CreateEvent {
            tenant_id: TenantId(tenant_id),
            channel_id: ChannelId(request.channel_id),
            creator_id: UserId(request.creator_id),
            prize: request.prize,
            duration: duration.min(max_duration),
            winner_count: clamp_winners(request.winners, max_winners),
            eligibility: Eligibility::from_required_role(request.required_role_id.map(RoleId)),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(event_to_response(&event))))
}

/// `GET /tenants/{tenant_id}/events`: List giveaways of a tenant.
pub async fn list_events(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(tenant_id): Path<u64>,
    Query(query): Query<ListEventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = if query.all {
        StatusFilter::All
    } else {
        StatusFilter::Active
    };
    let events = state
        .service
        .list_filtered(TenantId(tenant_id), filter)
        .await?;

    Ok(Json(events.iter().map(event_to_response).collect::<Vec<_>>()))
}

/// `GET /events/{event_id}`: Show one giveaway.
pub async fn get_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.service.get(EventId(event_id)).await?;
    Ok(Json(event_to_response(&event)))
}

/// `POST /events/{event_id}/end`: End now and draw winners.
///
/// Racing the timer is harmless: the loser gets `already_finished`.
pub async fn end_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.service.complete(EventId(event_id)).await?;
    Ok(Json(completion_to_response(result)))
}

/// `POST /events/{event_id}/cancel`: Stop a giveaway without drawing.
pub async fn cancel_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let response = match state.service.cancel_early(EventId(event_id)).await? {
        CancelOutcome::Cancelled(event) => CancelResponse {
            cancelled: true,
            status: event.status.into(),
        },
        CancelOutcome::NotActive { status } => CancelResponse {
            cancelled: false,
            status: status.into(),
        },
    };
    Ok(Json(response))
}

/// `POST /events/{event_id}/reroll`: Draw new winners for an ended giveaway.
pub async fn reroll_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(event_id): Path<Uuid>,
    Json(request): Json<RerollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let max_winners = state.config.engine.read().await.max_winners;
    let result = state
        .service
        .reroll(EventId(event_id), clamp_winners(request.winners, max_winners))
        .await?;
    Ok(Json(completion_to_response(result)))
}

/// `POST /events/{event_id}/extend`: Push the deadline back by a duration.
///
/// The new deadline is capped at `max_duration` from now.
pub async fn extend_event(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(event_id): Path<Uuid>,
    Json(request): Json<ExtendEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let by = parse_operator_duration(&request.by)?;
    let max_duration = state.config.engine.read().await.max_duration;
    let id = EventId(event_id);

    let current = state.service.get(id).await?;
    let now = state.service.clock().now();
    let requested = time::Duration::try_from(by)
        .ok()
        .and_then(|by| current.deadline.checked_add(by));
    let limit = time::Duration::try_from(max_duration)
        .ok()
        .and_then(|max| now.checked_add(max));
    let new_deadline = match (requested, limit) {
        (Some(requested), Some(limit)) => requested.min(limit),
        (Some(requested), None) => requested,
        (None, Some(limit)) => limit,
        (None, None) => {
            return Err(ApiError::BadRequest("duration is too large".to_string()));
        }
    };

    let event = state.service.extend(id, new_deadline).await?;
    Ok(Json(event_to_response(&event)))
}
