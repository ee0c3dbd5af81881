//! Turns the reactions on an announcement into the list of entrants.

use crate::entities::{Eligibility, GiveawayEvent, UserId};
use crate::gateway::{GatewayError, MessagingGateway, with_timeout};
use futures_util::{StreamExt, TryStreamExt, stream};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Member lookups in flight at once while checking a role gate.
const ELIGIBILITY_CONCURRENCY: usize = 8;

pub struct EntrantResolver {
    gateway: Arc<dyn MessagingGateway>,
    timeout: Duration,
}

impl EntrantResolver {
    pub fn new(gateway: Arc<dyn MessagingGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    /// Deduplicated entrants of `event` in first-reaction order.
    ///
    /// The engine's own account is never an entrant. Role gates are checked
    /// now, not when the user reacted. Any gateway failure (including a
    /// timeout of a single call) fails the whole resolution.
    pub async fn resolve(&self, event: &GiveawayEvent) -> Result<Vec<UserId>, GatewayError> {
        let reacted = with_timeout(
            self.timeout,
            self.gateway.fetch_participants(&event.announcement),
        )
        .await?;
        let self_id = self.gateway.self_id();
        let candidates: Vec<UserId> = reacted
            .into_iter()
            .filter(|user| *user != self_id)
            .unique()
            .collect();

        if event.eligibility == Eligibility::Anyone {
            return Ok(candidates);
        }

        let gateway = self.gateway.as_ref();
        let limit = self.timeout;
        let tenant = event.tenant_id;
        let eligibility = event.eligibility;
        let checked: Vec<Option<UserId>> = stream::iter(candidates)
            .map(|user| async move {
                let eligible =
                    with_timeout(limit, gateway.is_eligible(tenant, user, &eligibility)).await?;
                Ok::<_, GatewayError>(eligible.then_some(user))
            })
            .buffered(ELIGIBILITY_CONCURRENCY)
            .try_collect()
            .await?;

        let entrants: Vec<UserId> = checked.into_iter().flatten().collect();
        debug!(
            event_id = %event.id,
            entrants = entrants.len(),
            "Applied eligibility filter"
        );
        Ok(entrants)
    }
}
