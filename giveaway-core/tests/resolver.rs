mod common;

use common::{BOT_ID, MockGateway, stored_event};
use giveaway_core::entities::{Eligibility, EventId, GiveawayEvent, RoleId, UserId};
use giveaway_core::gateway::GatewayError;
use giveaway_core::resolver::EntrantResolver;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use time::macros::datetime;

fn event(eligibility: Eligibility) -> GiveawayEvent {
    let mut new_event = stored_event(datetime!(2026-01-01 00:00 UTC));
    new_event.eligibility = eligibility;
    new_event.into_event(EventId::generate())
}

fn users(ids: &[u64]) -> Vec<UserId> {
    ids.iter().copied().map(UserId).collect()
}

#[tokio::test]
async fn test_drops_self_and_duplicates_in_reaction_order() {
    let gateway = Arc::new(MockGateway::with_participants(&[BOT_ID.0, 5, 3, 5, 7, 3]));
    let resolver = EntrantResolver::new(gateway.clone(), Duration::from_secs(5));

    let entrants = resolver.resolve(&event(Eligibility::Anyone)).await.unwrap();
    assert_eq!(entrants, users(&[5, 3, 7]));
    assert_eq!(gateway.eligibility_checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_role_gate_is_checked_at_resolution() {
    let gateway = Arc::new(MockGateway::with_participants(&[5, 3, 7]));
    gateway.roles.lock().insert(UserId(5), vec![RoleId(1)]);
    gateway.roles.lock().insert(UserId(7), vec![RoleId(2), RoleId(1)]);
    let resolver = EntrantResolver::new(gateway.clone(), Duration::from_secs(5));
    let gated = event(Eligibility::RequiredRole(RoleId(1)));

    assert_eq!(resolver.resolve(&gated).await.unwrap(), users(&[5, 7]));

    // Losing the role after reacting disqualifies.
    gateway.roles.lock().remove(&UserId(7));
    assert_eq!(resolver.resolve(&gated).await.unwrap(), users(&[5]));
}

#[tokio::test]
async fn test_no_reactions_resolve_to_empty() {
    let gateway = Arc::new(MockGateway::default());
    let resolver = EntrantResolver::new(gateway, Duration::from_secs(5));
    assert!(
        resolver
            .resolve(&event(Eligibility::Anyone))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_gateway_times_out() {
    let gateway = Arc::new(MockGateway::with_participants(&[5]));
    *gateway.fetch_delay.lock() = Some(Duration::from_secs(30));
    let resolver = EntrantResolver::new(gateway, Duration::from_secs(2));

    let err = resolver
        .resolve(&event(Eligibility::Anyone))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(limit) if limit == Duration::from_secs(2)));
}
