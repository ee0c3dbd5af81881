use crate::entities::{
    AnnouncementRef, ChannelId, Eligibility, EventId, EventStatus, MessageId, RoleId, TenantId,
    UserId,
};
use crate::framework::{DatabaseProcessor, TransactionProcessor};
use kanau::processor::Processor;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A scheduled giveaway.
///
/// Status changes only go through `EventStore::compare_and_swap_status`;
/// the fields a transition may touch are exposed through [`EventUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiveawayEvent {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub announcement: AnnouncementRef,
    pub prize: String,
    pub winner_count: u32,
    pub eligibility: Eligibility,
    pub creator_id: UserId,
    pub deadline: OffsetDateTime,
    pub status: EventStatus,
    pub winners: Vec<UserId>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub failure_reason: Option<String>,
}

/// Everything needed to persist a freshly announced giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGiveawayEvent {
    /// Caller supplied id; the store generates one when `None`.
    pub id: Option<EventId>,
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub announcement: AnnouncementRef,
    pub prize: String,
    pub winner_count: u32,
    pub eligibility: Eligibility,
    pub creator_id: UserId,
    pub deadline: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl NewGiveawayEvent {
    pub fn into_event(self, id: EventId) -> GiveawayEvent {
        GiveawayEvent {
            id,
            tenant_id: self.tenant_id,
            channel_id: self.channel_id,
            announcement: self.announcement,
            prize: self.prize,
            winner_count: self.winner_count,
            eligibility: self.eligibility,
            creator_id: self.creator_id,
            deadline: self.deadline,
            status: EventStatus::Active,
            winners: Vec::new(),
            created_at: self.created_at,
            completed_at: None,
            failure_reason: None,
        }
    }
}

/// Mutable view of an event handed to CAS mutators.
pub struct EventUpdate<'a> {
    event: &'a mut GiveawayEvent,
}

impl<'a> EventUpdate<'a> {
    pub(crate) fn new(event: &'a mut GiveawayEvent) -> Self {
        Self { event }
    }

    pub fn event(&self) -> &GiveawayEvent {
        self.event
    }

    pub fn set_winners(&mut self, winners: Vec<UserId>) {
        self.event.winners = winners;
    }

    pub fn set_deadline(&mut self, deadline: OffsetDateTime) {
        self.event.deadline = deadline;
    }

    pub fn set_failure_reason(&mut self, reason: impl Into<String>) {
        self.event.failure_reason = Some(reason.into());
    }

    /// Record the terminal transition time. Later calls keep the first value.
    pub fn mark_completed(&mut self, at: OffsetDateTime) {
        if self.event.completed_at.is_none() {
            self.event.completed_at = Some(at);
        }
    }
}

/// Boxed mutator applied while the CAS holds the event.
pub type EventMutator = Box<dyn for<'a> FnOnce(&mut EventUpdate<'a>) + Send>;

/// Box a closure as an [`EventMutator`].
pub fn mutate(f: impl FnOnce(&mut EventUpdate<'_>) + Send + 'static) -> EventMutator {
    Box::new(f)
}

/// A mutator that only changes the status.
pub fn status_only() -> EventMutator {
    mutate(|_| {})
}

/// Apply a successful CAS to `event`: run the mutator, then set the new status.
pub(crate) fn apply_transition(event: &mut GiveawayEvent, new: EventStatus, mutator: EventMutator) {
    let mut update = EventUpdate::new(event);
    mutator(&mut update);
    event.status = new;
}

// ---------------------------------------------------------------------------
// Postgres rows and queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct GiveawayEventRow {
    pub id: Uuid,
    pub tenant_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub prize: String,
    pub winner_count: i32,
    pub required_role_id: Option<i64>,
    pub creator_id: i64,
    pub deadline: OffsetDateTime,
    pub status: EventStatus,
    pub winners: Vec<i64>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub failure_reason: Option<String>,
}

impl From<GiveawayEventRow> for GiveawayEvent {
    fn from(row: GiveawayEventRow) -> Self {
        let channel_id = ChannelId::from_db(row.channel_id);
        GiveawayEvent {
            id: EventId(row.id),
            tenant_id: TenantId::from_db(row.tenant_id),
            channel_id,
            announcement: AnnouncementRef {
                channel_id,
                message_id: MessageId::from_db(row.message_id),
            },
            prize: row.prize,
            winner_count: row.winner_count.max(1) as u32,
            eligibility: Eligibility::from_required_role(row.required_role_id.map(RoleId::from_db)),
            creator_id: UserId::from_db(row.creator_id),
            deadline: row.deadline,
            status: row.status,
            winners: row.winners.into_iter().map(UserId::from_db).collect(),
            created_at: row.created_at,
            completed_at: row.completed_at,
            failure_reason: row.failure_reason,
        }
    }
}

fn winners_to_db(winners: &[UserId]) -> Vec<i64> {
    winners.iter().map(|w| w.to_db()).collect()
}

macro_rules! select_events {
    ($tail:literal) => {
        concat!(
            "SELECT id, tenant_id, channel_id, message_id, prize, winner_count, required_role_id, \
             creator_id, deadline, status, winners, created_at, completed_at, failure_reason \
             FROM giveaway_events ",
            $tail
        )
    };
}

#[derive(Debug, Clone)]
/// Insert a new event row. Fails with a unique violation when the id exists.
pub struct InsertGiveawayEvent {
    pub event: GiveawayEvent,
}

impl Processor<InsertGiveawayEvent> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertGiveawayEvent")]
    async fn process(&self, insert: InsertGiveawayEvent) -> Result<(), sqlx::Error> {
        let event = insert.event;
        let winner_count =
            i32::try_from(event.winner_count).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            r#"
            INSERT INTO giveaway_events
                (id, tenant_id, channel_id, message_id, prize, winner_count, required_role_id,
                 creator_id, deadline, status, winners, created_at, completed_at, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(event.id.0)
        .bind(event.tenant_id.to_db())
        .bind(event.channel_id.to_db())
        .bind(event.announcement.message_id.to_db())
        .bind(&event.prize)
        .bind(winner_count)
        .bind(event.eligibility.required_role().map(RoleId::to_db))
        .bind(event.creator_id.to_db())
        .bind(event.deadline)
        .bind(event.status)
        .bind(winners_to_db(&event.winners))
        .bind(event.created_at)
        .bind(event.completed_at)
        .bind(&event.failure_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetGiveawayEventById {
    pub id: EventId,
}

impl Processor<GetGiveawayEventById> for DatabaseProcessor {
    type Output = Option<GiveawayEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetGiveawayEventById")]
    async fn process(
        &self,
        query: GetGiveawayEventById,
    ) -> Result<Option<GiveawayEvent>, sqlx::Error> {
        let row = sqlx::query_as::<_, GiveawayEventRow>(select_events!("WHERE id = $1"))
            .bind(query.id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(GiveawayEvent::from))
    }
}

/// Swap the status of one event if it still equals `expected`.
///
/// Locks the row with `SELECT ... FOR UPDATE`, applies the mutator in Rust
/// and writes the mutable columns back in the same transaction. Returns
/// `None` when the row is missing or its status differs.
pub struct CompareAndSwapEventStatus {
    pub id: EventId,
    pub expected: EventStatus,
    pub new: EventStatus,
    pub mutator: EventMutator,
}

impl Processor<CompareAndSwapEventStatus> for DatabaseProcessor {
    type Output = Option<GiveawayEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompareAndSwapEventStatus")]
    async fn process(
        &self,
        cas: CompareAndSwapEventStatus,
    ) -> Result<Option<GiveawayEvent>, sqlx::Error> {
        let CompareAndSwapEventStatus {
            id,
            expected,
            new,
            mutator,
        } = cas;
        let mut tx = TransactionProcessor::begin(&self.pool).await?;

        let row = sqlx::query_as::<_, GiveawayEventRow>(select_events!("WHERE id = $1 FOR UPDATE"))
            .bind(id.0)
            .fetch_optional(tx.conn())
            .await?;
        let Some(mut event) = row.map(GiveawayEvent::from) else {
            tx.rollback().await?;
            return Ok(None);
        };
        if event.status != expected {
            tx.rollback().await?;
            return Ok(None);
        }

        apply_transition(&mut event, new, mutator);

        sqlx::query(
            r#"
            UPDATE giveaway_events
            SET status = $2, deadline = $3, winners = $4, completed_at = $5, failure_reason = $6
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(event.status)
        .bind(event.deadline)
        .bind(winners_to_db(&event.winners))
        .bind(event.completed_at)
        .bind(&event.failure_reason)
        .execute(tx.conn())
        .await?;
        tx.commit().await?;
        Ok(Some(event))
    }
}

#[derive(Debug, Clone)]
/// Active events whose deadline is at or before `before`, earliest first.
pub struct ListDueGiveawayEvents {
    pub before: OffsetDateTime,
}

impl Processor<ListDueGiveawayEvents> for DatabaseProcessor {
    type Output = Vec<GiveawayEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListDueGiveawayEvents")]
    async fn process(&self, query: ListDueGiveawayEvents) -> Result<Vec<GiveawayEvent>, sqlx::Error> {
        let rows = sqlx::query_as::<_, GiveawayEventRow>(select_events!(
            "WHERE status = 'active' AND deadline <= $1 ORDER BY deadline ASC"
        ))
        .bind(query.before)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GiveawayEvent::from).collect())
    }
}

#[derive(Debug, Clone)]
/// Events of one tenant, optionally restricted to a status.
pub struct ListTenantGiveawayEvents {
    pub tenant_id: TenantId,
    pub status: Option<EventStatus>,
}

impl Processor<ListTenantGiveawayEvents> for DatabaseProcessor {
    type Output = Vec<GiveawayEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListTenantGiveawayEvents")]
    async fn process(
        &self,
        query: ListTenantGiveawayEvents,
    ) -> Result<Vec<GiveawayEvent>, sqlx::Error> {
        let rows = sqlx::query_as::<_, GiveawayEventRow>(select_events!(
            "WHERE tenant_id = $1 AND ($2::giveaway_status IS NULL OR status = $2) \
             ORDER BY deadline ASC"
        ))
        .bind(query.tenant_id.to_db())
        .bind(query.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GiveawayEvent::from).collect())
    }
}

#[derive(Debug, Clone)]
pub struct ListGiveawayEventsByStatus {
    pub status: EventStatus,
}

impl Processor<ListGiveawayEventsByStatus> for DatabaseProcessor {
    type Output = Vec<GiveawayEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListGiveawayEventsByStatus")]
    async fn process(
        &self,
        query: ListGiveawayEventsByStatus,
    ) -> Result<Vec<GiveawayEvent>, sqlx::Error> {
        let rows = sqlx::query_as::<_, GiveawayEventRow>(select_events!(
            "WHERE status = $1 ORDER BY deadline ASC"
        ))
        .bind(query.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GiveawayEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_event() -> GiveawayEvent {
        NewGiveawayEvent {
            id: None,
            tenant_id: TenantId(1),
            channel_id: ChannelId(2),
            announcement: AnnouncementRef {
                channel_id: ChannelId(2),
                message_id: MessageId(3),
            },
            prize: "Nitro".to_string(),
            winner_count: 1,
            eligibility: Eligibility::Anyone,
            creator_id: UserId(4),
            deadline: datetime!(2026-01-01 12:00 UTC),
            created_at: datetime!(2026-01-01 11:00 UTC),
        }
        .into_event(EventId::generate())
    }

    #[test]
    fn test_new_event_starts_active_without_winners() {
        let event = sample_event();
        assert_eq!(event.status, EventStatus::Active);
        assert!(event.winners.is_empty());
        assert_eq!(event.completed_at, None);
    }

    #[test]
    fn test_completed_at_is_set_once() {
        let mut event = sample_event();
        let first = datetime!(2026-01-01 12:00 UTC);
        apply_transition(
            &mut event,
            EventStatus::Ended,
            mutate(move |u| u.mark_completed(first)),
        );
        apply_transition(
            &mut event,
            EventStatus::Ended,
            mutate(|u| u.mark_completed(datetime!(2026-02-01 00:00 UTC))),
        );
        assert_eq!(event.completed_at, Some(first));
    }

    #[test]
    fn test_row_conversion_keeps_role_gate() {
        let row = GiveawayEventRow {
            id: Uuid::now_v7(),
            tenant_id: 1,
            channel_id: 2,
            message_id: 3,
            prize: "Key".to_string(),
            winner_count: 2,
            required_role_id: Some(77),
            creator_id: 4,
            deadline: datetime!(2026-01-01 12:00 UTC),
            status: EventStatus::Ended,
            winners: vec![10, -1],
            created_at: datetime!(2026-01-01 11:00 UTC),
            completed_at: None,
            failure_reason: None,
        };
        let event = GiveawayEvent::from(row);
        assert_eq!(event.eligibility, Eligibility::RequiredRole(RoleId(77)));
        assert_eq!(event.announcement.message_id, MessageId(3));
        assert_eq!(event.winners, vec![UserId(10), UserId(u64::MAX)]);
    }
}
