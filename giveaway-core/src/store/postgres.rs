use crate::entities::giveaway_event::{
    CompareAndSwapEventStatus, GetGiveawayEventById, InsertGiveawayEvent, ListDueGiveawayEvents,
    ListGiveawayEventsByStatus, ListTenantGiveawayEvents,
};
use crate::entities::{EventId, EventMutator, EventStatus, GiveawayEvent, NewGiveawayEvent, TenantId};
use crate::framework::DatabaseProcessor;
use crate::store::{EventStore, StatusFilter, StoreError};
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use time::OffsetDateTime;

/// [`EventStore`] backed by the `giveaway_events` table.
#[derive(Clone)]
pub struct PgEventStore {
    db: DatabaseProcessor,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn create(&self, event: NewGiveawayEvent) -> Result<GiveawayEvent, StoreError> {
        let id = event.id.unwrap_or_else(EventId::generate);
        let event = event.into_event(id);
        match self
            .db
            .process(InsertGiveawayEvent {
                event: event.clone(),
            })
            .await
        {
            Ok(()) => Ok(event),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateId(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: EventId) -> Result<GiveawayEvent, StoreError> {
        self.db
            .process(GetGiveawayEventById { id })
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn compare_and_swap_status(
        &self,
        id: EventId,
        expected: EventStatus,
        new: EventStatus,
        mutator: EventMutator,
    ) -> Result<Option<GiveawayEvent>, StoreError> {
        let updated = self
            .db
            .process(CompareAndSwapEventStatus {
                id,
                expected,
                new,
                mutator,
            })
            .await?;
        Ok(updated)
    }

    async fn list_due(&self, before: OffsetDateTime) -> Result<Vec<GiveawayEvent>, StoreError> {
        Ok(self.db.process(ListDueGiveawayEvents { before }).await?)
    }

    async fn list_by_tenant(
        &self,
        tenant: TenantId,
        filter: StatusFilter,
    ) -> Result<Vec<GiveawayEvent>, StoreError> {
        Ok(self
            .db
            .process(ListTenantGiveawayEvents {
                tenant_id: tenant,
                status: filter.as_status(),
            })
            .await?)
    }

    async fn list_by_status(&self, status: EventStatus) -> Result<Vec<GiveawayEvent>, StoreError> {
        Ok(self.db.process(ListGiveawayEventsByStatus { status }).await?)
    }
}
