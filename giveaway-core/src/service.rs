//! Giveaway lifecycle operations.
//!
//! Every trigger (timer, manual end, sweep, cancel) races through the same
//! status CAS, so whichever caller wins `Active -> Completing` is the only
//! one that draws winners and announces them. Losers get a no-op result.

use crate::config::{ConfigStore, ServiceConfig};
use crate::entities::{
    AnnouncementRef, ChannelId, Eligibility, EventId, EventStatus, GiveawayEvent,
    NewGiveawayEvent, TenantId, UserId, mutate, status_only,
};
use crate::gateway::{GatewayError, MessagingGateway, content, with_timeout};
use crate::resolver::EntrantResolver;
use crate::scheduler::channels::{ScheduleCommand, ScheduleCommandSender};
use crate::selector::select_winners;
use crate::store::{EventStore, StatusFilter, StoreError};
use crate::utils::{Clock, SystemClock};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Reason recorded on events found mid-completion at startup.
pub const INTERRUPTED_REASON: &str = "interrupted by restart";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("giveaway not found: {0}")]
    NotFound(EventId),
    #[error("giveaway {id} is {status}, expected {expected}")]
    InvalidState {
        id: EventId,
        status: EventStatus,
        expected: EventStatus,
    },
    #[error("messaging gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("announcement {announcement} was posted but the giveaway was not saved: {source}")]
    PartialFailure {
        announcement: AnnouncementRef,
        #[source]
        source: StoreError,
    },
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Storage(other),
        }
    }
}

/// Input of [`EventService::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEvent {
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub creator_id: UserId,
    pub prize: String,
    pub duration: Duration,
    pub winner_count: u32,
    pub eligibility: Eligibility,
}

/// What a completion or reroll attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    Completed {
        winners: Vec<UserId>,
        announced: bool,
    },
    NoEntrants {
        announced: bool,
    },
    /// Another trigger already moved the event out of `Active`.
    AlreadyFinished {
        status: EventStatus,
        winners: Vec<UserId>,
    },
    Errored {
        reason: String,
    },
    /// The stored deadline is still in the future (it was extended).
    NotDue {
        deadline: OffsetDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(GiveawayEvent),
    NotActive { status: EventStatus },
}

pub struct EventService {
    store: Arc<dyn EventStore>,
    gateway: Arc<dyn MessagingGateway>,
    schedule_tx: ScheduleCommandSender,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    config: ConfigStore<ServiceConfig>,
}

impl EventService {
    pub fn new(
        store: Arc<dyn EventStore>,
        gateway: Arc<dyn MessagingGateway>,
        schedule_tx: ScheduleCommandSender,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            schedule_tx,
            clock: Arc::new(SystemClock),
            rng: Mutex::new(StdRng::from_os_rng()),
            config: ConfigStore::new(config),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    /// Handle for swapping the service settings at runtime. Every gateway
    /// call reads the timeout when it starts.
    pub fn config_store(&self) -> ConfigStore<ServiceConfig> {
        self.config.clone()
    }

    fn gateway_timeout(&self) -> Duration {
        self.config.current().gateway_timeout
    }

    fn resolver(&self) -> EntrantResolver {
        EntrantResolver::new(Arc::clone(&self.gateway), self.gateway_timeout())
    }

    // -- Commands -----------------------------------------------------------

    /// Announce a new giveaway, persist it and arm its timer.
    pub async fn create(&self, request: CreateEvent) -> Result<GiveawayEvent, ServiceError> {
        if request.duration.is_zero() {
            return Err(ServiceError::Validation(
                "duration must be greater than zero".to_string(),
            ));
        }
        if request.winner_count == 0 {
            return Err(ServiceError::Validation(
                "winner count must be at least 1".to_string(),
            ));
        }
        if i32::try_from(request.winner_count).is_err() {
            return Err(ServiceError::Validation(
                "winner count is too large".to_string(),
            ));
        }
        let prize = request.prize.trim();
        if prize.is_empty() {
            return Err(ServiceError::Validation("prize must not be empty".to_string()));
        }

        let now = self.clock.now();
        let deadline = time::Duration::try_from(request.duration)
            .ok()
            .and_then(|d| now.checked_add(d))
            .ok_or_else(|| ServiceError::Validation("duration is too large".to_string()))?;

        let text = content::announcement(
            prize,
            request.winner_count,
            deadline,
            request.creator_id,
            &request.eligibility,
        );
        let announcement = with_timeout(
            self.gateway_timeout(),
            self.gateway.post_announcement(request.channel_id, &text),
        )
        .await?;

        let new_event = NewGiveawayEvent {
            id: None,
            tenant_id: request.tenant_id,
            channel_id: request.channel_id,
            announcement,
            prize: prize.to_string(),
            winner_count: request.winner_count,
            eligibility: request.eligibility,
            creator_id: request.creator_id,
            deadline,
            created_at: now,
        };
        let event = match self.store.create(new_event).await {
            Ok(event) => event,
            Err(source) => {
                error!(
                    tenant_id = %request.tenant_id,
                    announcement = %announcement,
                    error = %source,
                    "Giveaway announced but not persisted, announcement is orphaned"
                );
                return Err(ServiceError::PartialFailure {
                    announcement,
                    source,
                });
            }
        };

        info!(
            event_id = %event.id,
            tenant_id = %event.tenant_id,
            deadline = %event.deadline,
            winners = event.winner_count,
            "Giveaway created"
        );
        self.arm(event.id, event.deadline);
        Ok(event)
    }

    /// End a giveaway now, whatever its deadline.
    ///
    /// Safe to call any number of times from any trigger; only the caller
    /// that wins the `Active -> Completing` swap draws and announces.
    pub async fn complete(&self, id: EventId) -> Result<CompletionResult, ServiceError> {
        let Some(event) = self
            .store
            .compare_and_swap_status(id, EventStatus::Active, EventStatus::Completing, status_only())
            .await?
        else {
            return self.already_finished(id).await;
        };
        self.disarm(id);
        debug!(event_id = %id, "Claimed giveaway for completion");

        let entrants = match self.resolver().resolve(&event).await {
            Ok(entrants) => entrants,
            Err(e) => return self.fail_completion(&event, e).await,
        };
        let winners = self.draw(&entrants, event.winner_count);

        let now = self.clock.now();
        let stored = winners.clone();
        let ended = match self
            .store
            .compare_and_swap_status(
                id,
                EventStatus::Completing,
                EventStatus::Ended,
                mutate(move |u| {
                    u.set_winners(stored);
                    u.mark_completed(now);
                }),
            )
            .await
        {
            Ok(Some(ended)) => ended,
            Ok(None) => {
                warn!(event_id = %id, "Giveaway left Completing while winners were drawn");
                return self.already_finished(id).await;
            }
            Err(e) => {
                error!(event_id = %id, error = %e, "Failed to persist winners");
                self.revert_to_active(&event).await;
                return Err(e.into());
            }
        };

        info!(
            event_id = %id,
            entrants = entrants.len(),
            winners = ended.winners.len(),
            "Giveaway ended"
        );
        let announced = self.announce_completion(&ended).await;
        Ok(if winners.is_empty() {
            CompletionResult::NoEntrants { announced }
        } else {
            CompletionResult::Completed { winners, announced }
        })
    }

    /// Timer entry point: complete only if the stored deadline has passed.
    pub async fn complete_due(&self, id: EventId) -> Result<CompletionResult, ServiceError> {
        let event = self.store.get(id).await?;
        if event.status.is_terminal() {
            return Ok(CompletionResult::AlreadyFinished {
                status: event.status,
                winners: event.winners,
            });
        }
        if event.status == EventStatus::Active && event.deadline > self.clock.now() {
            return Ok(CompletionResult::NotDue {
                deadline: event.deadline,
            });
        }
        self.complete(id).await
    }

    /// Cancel an active giveaway without drawing winners.
    pub async fn cancel_early(&self, id: EventId) -> Result<CancelOutcome, ServiceError> {
        let now = self.clock.now();
        let Some(cancelled) = self
            .store
            .compare_and_swap_status(
                id,
                EventStatus::Active,
                EventStatus::Cancelled,
                mutate(move |u| u.mark_completed(now)),
            )
            .await?
        else {
            let current = self.store.get(id).await?;
            debug!(event_id = %id, status = %current.status, "Cancel ignored, giveaway not active");
            return Ok(CancelOutcome::NotActive {
                status: current.status,
            });
        };

        self.disarm(id);
        info!(event_id = %id, "Giveaway cancelled");
        self.edit_best_effort(&cancelled, &content::cancelled_announcement(&cancelled))
            .await;
        Ok(CancelOutcome::Cancelled(cancelled))
    }

    /// Draw a fresh set of winners for an ended giveaway.
    ///
    /// Status and `completed_at` stay as they are; only `winners` is replaced.
    pub async fn reroll(
        &self,
        id: EventId,
        winner_count: u32,
    ) -> Result<CompletionResult, ServiceError> {
        if winner_count == 0 {
            return Err(ServiceError::Validation(
                "winner count must be at least 1".to_string(),
            ));
        }
        let event = self.store.get(id).await?;
        if event.status != EventStatus::Ended {
            return Err(ServiceError::InvalidState {
                id,
                status: event.status,
                expected: EventStatus::Ended,
            });
        }

        let entrants = self.resolver().resolve(&event).await?;
        let winners = self.draw(&entrants, winner_count);

        let stored = winners.clone();
        let Some(rerolled) = self
            .store
            .compare_and_swap_status(
                id,
                EventStatus::Ended,
                EventStatus::Ended,
                mutate(move |u| u.set_winners(stored)),
            )
            .await?
        else {
            let current = self.store.get(id).await?;
            return Err(ServiceError::InvalidState {
                id,
                status: current.status,
                expected: EventStatus::Ended,
            });
        };

        info!(
            event_id = %id,
            entrants = entrants.len(),
            winners = rerolled.winners.len(),
            "Giveaway rerolled"
        );
        let text = if winners.is_empty() {
            content::NO_REROLL_ENTRANTS_MESSAGE.to_string()
        } else {
            content::reroll_message(&rerolled.prize, &winners)
        };
        let announced = self.send_best_effort(&rerolled, &text).await;
        Ok(if winners.is_empty() {
            CompletionResult::NoEntrants { announced }
        } else {
            CompletionResult::Completed { winners, announced }
        })
    }

    /// Move the deadline of an active giveaway later and re-arm its timer.
    pub async fn extend(
        &self,
        id: EventId,
        new_deadline: OffsetDateTime,
    ) -> Result<GiveawayEvent, ServiceError> {
        if new_deadline <= self.clock.now() {
            return Err(ServiceError::Validation(
                "new deadline must be in the future".to_string(),
            ));
        }
        let current = self.store.get(id).await?;
        if current.status != EventStatus::Active {
            return Err(ServiceError::InvalidState {
                id,
                status: current.status,
                expected: EventStatus::Active,
            });
        }
        if new_deadline <= current.deadline {
            return Err(ServiceError::Validation(
                "new deadline must be later than the current one".to_string(),
            ));
        }

        let Some(extended) = self
            .store
            .compare_and_swap_status(
                id,
                EventStatus::Active,
                EventStatus::Active,
                mutate(move |u| {
                    // A concurrent extend may already have pushed it further.
                    if new_deadline > u.event().deadline {
                        u.set_deadline(new_deadline);
                    }
                }),
            )
            .await?
        else {
            let current = self.store.get(id).await?;
            return Err(ServiceError::InvalidState {
                id,
                status: current.status,
                expected: EventStatus::Active,
            });
        };

        info!(event_id = %id, deadline = %extended.deadline, "Giveaway extended");
        self.arm(id, extended.deadline);
        let text = content::announcement(
            &extended.prize,
            extended.winner_count,
            extended.deadline,
            extended.creator_id,
            &extended.eligibility,
        );
        self.edit_best_effort(&extended, &text).await;
        Ok(extended)
    }

    /// Mark an event found in `Completing` at startup as `Errored`.
    ///
    /// Returns `false` if it was no longer `Completing`.
    pub async fn abandon_interrupted(&self, id: EventId) -> Result<bool, ServiceError> {
        let now = self.clock.now();
        let abandoned = self
            .store
            .compare_and_swap_status(
                id,
                EventStatus::Completing,
                EventStatus::Errored,
                mutate(move |u| {
                    u.set_failure_reason(INTERRUPTED_REASON);
                    u.mark_completed(now);
                }),
            )
            .await?;
        if abandoned.is_some() {
            warn!(event_id = %id, "Giveaway was interrupted mid-completion, marked errored");
        }
        Ok(abandoned.is_some())
    }

    // -- Queries ------------------------------------------------------------

    pub async fn get(&self, id: EventId) -> Result<GiveawayEvent, ServiceError> {
        Ok(self.store.get(id).await?)
    }

    /// Active giveaways of a tenant.
    pub async fn list(&self, tenant: TenantId) -> Result<Vec<GiveawayEvent>, ServiceError> {
        self.list_filtered(tenant, StatusFilter::Active).await
    }

    pub async fn list_filtered(
        &self,
        tenant: TenantId,
        filter: StatusFilter,
    ) -> Result<Vec<GiveawayEvent>, ServiceError> {
        Ok(self.store.list_by_tenant(tenant, filter).await?)
    }

    // -- Internals ----------------------------------------------------------

    async fn already_finished(&self, id: EventId) -> Result<CompletionResult, ServiceError> {
        let current = self.store.get(id).await?;
        debug!(event_id = %id, status = %current.status, "Completion skipped, already claimed");
        Ok(CompletionResult::AlreadyFinished {
            status: current.status,
            winners: current.winners,
        })
    }

    async fn fail_completion(
        &self,
        event: &GiveawayEvent,
        cause: GatewayError,
    ) -> Result<CompletionResult, ServiceError> {
        let reason = cause.to_string();
        warn!(event_id = %event.id, error = %cause, "Could not resolve entrants, giveaway errored");

        let now = self.clock.now();
        let stored = reason.clone();
        self.store
            .compare_and_swap_status(
                event.id,
                EventStatus::Completing,
                EventStatus::Errored,
                mutate(move |u| {
                    u.set_failure_reason(stored);
                    u.mark_completed(now);
                }),
            )
            .await
            .inspect_err(|e| {
                error!(event_id = %event.id, error = %e, "Failed to persist errored giveaway");
            })?;
        Ok(CompletionResult::Errored { reason })
    }

    /// Give a claimed event back to the sweep after a storage failure.
    async fn revert_to_active(&self, event: &GiveawayEvent) {
        match self
            .store
            .compare_and_swap_status(
                event.id,
                EventStatus::Completing,
                EventStatus::Active,
                status_only(),
            )
            .await
        {
            Ok(Some(_)) => {
                // Not re-armed: the deadline has passed, so the next sweep
                // pass is the retry.
                warn!(event_id = %event.id, "Giveaway returned to active for the next sweep");
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    event_id = %event.id,
                    error = %e,
                    "Giveaway stuck in Completing, it will be errored on next restart"
                );
            }
        }
    }

    fn draw(&self, entrants: &[UserId], want: u32) -> Vec<UserId> {
        let mut rng = self.rng.lock();
        select_winners(entrants, want as usize, &mut *rng)
    }

    async fn announce_completion(&self, ended: &GiveawayEvent) -> bool {
        self.edit_best_effort(ended, &content::ended_announcement(ended))
            .await;
        let text = if ended.winners.is_empty() {
            content::NO_ENTRANTS_MESSAGE.to_string()
        } else {
            content::winners_message(&ended.prize, &ended.winners)
        };
        self.send_best_effort(ended, &text).await
    }

    async fn edit_best_effort(&self, event: &GiveawayEvent, text: &str) {
        if let Err(e) = with_timeout(
            self.gateway_timeout(),
            self.gateway.edit_announcement(&event.announcement, text),
        )
        .await
        {
            warn!(event_id = %event.id, error = %e, "Failed to edit giveaway announcement");
        }
    }

    /// Reply to the announcement. Returns whether the message went out.
    async fn send_best_effort(&self, event: &GiveawayEvent, text: &str) -> bool {
        match with_timeout(
            self.gateway_timeout(),
            self.gateway
                .send_message(event.channel_id, text, Some(&event.announcement)),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Failed to announce giveaway result");
                false
            }
        }
    }

    fn arm(&self, event_id: EventId, deadline: OffsetDateTime) {
        self.send_command(ScheduleCommand::Arm { event_id, deadline });
    }

    fn disarm(&self, event_id: EventId) {
        self.send_command(ScheduleCommand::Disarm { event_id });
    }

    fn send_command(&self, command: ScheduleCommand) {
        if let Err(e) = self.schedule_tx.try_send(command) {
            // The sweep picks up anything a lost command would have handled.
            debug!(event_id = %command.event_id(), error = %e, "Schedule command dropped");
        }
    }
}
