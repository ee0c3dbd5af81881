//! Durable home of giveaway events.
//!
//! [`EventStore::compare_and_swap_status`] is the only way an existing
//! event changes; every trigger path (timer, manual end, sweep, cancel,
//! reroll, extend) goes through it.

pub mod memory;
pub mod postgres;

use crate::entities::{EventId, EventMutator, EventStatus, GiveawayEvent, NewGiveawayEvent, TenantId};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event not found: {0}")]
    NotFound(EventId),
    #[error("event id already exists: {0}")]
    DuplicateId(EventId),
    #[error("database unavailable: {0}")]
    Database(#[from] sqlx::Error),
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Which events of a tenant to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Active,
    All,
}

impl StatusFilter {
    fn as_status(self) -> Option<EventStatus> {
        match self {
            StatusFilter::Active => Some(EventStatus::Active),
            StatusFilter::All => None,
        }
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new `Active` event. Generates the id unless the caller supplied one.
    async fn create(&self, event: NewGiveawayEvent) -> Result<GiveawayEvent, StoreError>;

    async fn get(&self, id: EventId) -> Result<GiveawayEvent, StoreError>;

    /// Atomically move `id` from `expected` to `new`, applying `mutator` in the
    /// same step.
    ///
    /// Returns `Ok(None)` when the current status is not `expected` or the id is
    /// unknown. `expected == new` is allowed.
    async fn compare_and_swap_status(
        &self,
        id: EventId,
        expected: EventStatus,
        new: EventStatus,
        mutator: EventMutator,
    ) -> Result<Option<GiveawayEvent>, StoreError>;

    /// `Active` events with `deadline <= before`, earliest deadline first.
    async fn list_due(&self, before: OffsetDateTime) -> Result<Vec<GiveawayEvent>, StoreError>;

    async fn list_by_tenant(
        &self,
        tenant: TenantId,
        filter: StatusFilter,
    ) -> Result<Vec<GiveawayEvent>, StoreError>;

    async fn list_by_status(&self, status: EventStatus) -> Result<Vec<GiveawayEvent>, StoreError>;
}
