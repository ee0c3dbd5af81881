//! Shared fakes for the giveaway-core integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use giveaway_core::config::ServiceConfig;
use giveaway_core::entities::{
    AnnouncementRef, ChannelId, Eligibility, EventId, EventMutator, EventStatus, GiveawayEvent,
    MessageId, NewGiveawayEvent, RoleId, TenantId, UserId,
};
use giveaway_core::gateway::{GatewayError, MessagingGateway};
use giveaway_core::scheduler::channels::ScheduleCommandReceiver;
use giveaway_core::scheduler::schedule_command_channel;
use giveaway_core::service::{CreateEvent, EventService};
use giveaway_core::store::{EventStore, MemoryEventStore, StatusFilter, StoreError};
use giveaway_core::utils::Clock;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

pub const BOT_ID: UserId = UserId(999);
pub const TENANT: TenantId = TenantId(1);
pub const CHANNEL: ChannelId = ChannelId(100);

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall clock that follows tokio time, so paused-time tests see deadlines pass.
pub struct TokioClock {
    base: OffsetDateTime,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: datetime!(2026-01-01 00:00 UTC),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        self.base + self.started.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockGateway {
    next_message: AtomicU64,
    pub participants: Mutex<Vec<UserId>>,
    pub roles: Mutex<HashMap<UserId, Vec<RoleId>>>,
    pub fail_fetch: AtomicBool,
    pub fail_send: AtomicBool,
    pub fetch_delay: Mutex<Option<Duration>>,
    pub posts: AtomicUsize,
    pub edits: AtomicUsize,
    pub fetches: AtomicUsize,
    pub eligibility_checks: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn with_participants(users: &[u64]) -> Self {
        let gateway = Self::default();
        *gateway.participants.lock() = users.iter().copied().map(UserId).collect();
        gateway
    }

    pub fn set_participants(&self, users: &[u64]) {
        *self.participants.lock() = users.iter().copied().map(UserId).collect();
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessagingGateway for MockGateway {
    fn self_id(&self) -> UserId {
        BOT_ID
    }

    async fn post_announcement(
        &self,
        channel: ChannelId,
        _content: &str,
    ) -> Result<AnnouncementRef, GatewayError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        Ok(AnnouncementRef {
            channel_id: channel,
            message_id: MessageId(self.next_message.fetch_add(1, Ordering::SeqCst) + 1),
        })
    }

    async fn edit_announcement(
        &self,
        _announcement: &AnnouncementRef,
        _content: &str,
    ) -> Result<(), GatewayError> {
        self.edits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_participants(
        &self,
        _announcement: &AnnouncementRef,
    ) -> Result<Vec<UserId>, GatewayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // Give racing completions a chance to interleave.
        tokio::task::yield_now().await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("fetch disabled".to_string()));
        }
        Ok(self.participants.lock().clone())
    }

    async fn is_eligible(
        &self,
        _tenant: TenantId,
        user: UserId,
        eligibility: &Eligibility,
    ) -> Result<bool, GatewayError> {
        self.eligibility_checks.fetch_add(1, Ordering::SeqCst);
        let Some(required) = eligibility.required_role() else {
            return Ok(true);
        };
        Ok(self
            .roles
            .lock()
            .get(&user)
            .is_some_and(|roles| roles.contains(&required)))
    }

    async fn send_message(
        &self,
        _channel: ChannelId,
        content: &str,
        _reply_to: Option<&AnnouncementRef>,
    ) -> Result<(), GatewayError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("send disabled".to_string()));
        }
        self.sent.lock().push(content.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Memory store that records every successful status swap.
pub struct CountingStore {
    inner: MemoryEventStore,
    pub swaps: Mutex<Vec<(EventId, EventStatus, EventStatus)>>,
    /// Fail `Completing -> Ended` swaps with a storage error.
    pub fail_finish: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: MemoryEventStore) -> Self {
        Self {
            inner,
            swaps: Mutex::new(Vec::new()),
            fail_finish: AtomicBool::new(false),
        }
    }

    pub fn swaps_into(&self, id: EventId, status: EventStatus) -> usize {
        self.swaps
            .lock()
            .iter()
            .filter(|(event, _, new)| *event == id && *new == status)
            .count()
    }
}

#[async_trait]
impl EventStore for CountingStore {
    async fn create(&self, event: NewGiveawayEvent) -> Result<GiveawayEvent, StoreError> {
        self.inner.create(event).await
    }

    async fn get(&self, id: EventId) -> Result<GiveawayEvent, StoreError> {
        self.inner.get(id).await
    }

    async fn compare_and_swap_status(
        &self,
        id: EventId,
        expected: EventStatus,
        new: EventStatus,
        mutator: EventMutator,
    ) -> Result<Option<GiveawayEvent>, StoreError> {
        if expected == EventStatus::Completing
            && new == EventStatus::Ended
            && self.fail_finish.load(Ordering::SeqCst)
        {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        let updated = self
            .inner
            .compare_and_swap_status(id, expected, new, mutator)
            .await?;
        if updated.is_some() {
            self.swaps.lock().push((id, expected, new));
        }
        Ok(updated)
    }

    async fn list_due(&self, before: OffsetDateTime) -> Result<Vec<GiveawayEvent>, StoreError> {
        self.inner.list_due(before).await
    }

    async fn list_by_tenant(
        &self,
        tenant: TenantId,
        filter: StatusFilter,
    ) -> Result<Vec<GiveawayEvent>, StoreError> {
        self.inner.list_by_tenant(tenant, filter).await
    }

    async fn list_by_status(&self, status: EventStatus) -> Result<Vec<GiveawayEvent>, StoreError> {
        self.inner.list_by_status(status).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: Arc<EventService>,
    pub store: Arc<CountingStore>,
    pub gateway: Arc<MockGateway>,
    pub clock: Arc<TokioClock>,
    pub command_rx: ScheduleCommandReceiver,
}

pub fn harness(gateway: MockGateway) -> Harness {
    harness_with_store(gateway, MemoryEventStore::new())
}

pub fn harness_with_store(gateway: MockGateway, store: MemoryEventStore) -> Harness {
    let store = Arc::new(CountingStore::new(store));
    let gateway = Arc::new(gateway);
    let clock = Arc::new(TokioClock::new());
    let (command_tx, command_rx) = schedule_command_channel();
    let service = EventService::new(
        store.clone(),
        gateway.clone(),
        command_tx,
        ServiceConfig {
            gateway_timeout: Duration::from_secs(5),
        },
    )
    .with_clock(clock.clone())
    .with_rng(StdRng::seed_from_u64(7));
    Harness {
        service: Arc::new(service),
        store,
        gateway,
        clock,
        command_rx,
    }
}

pub fn create_request(duration: Duration, winner_count: u32) -> CreateEvent {
    CreateEvent {
        tenant_id: TENANT,
        channel_id: CHANNEL,
        creator_id: UserId(1),
        prize: "Nitro".to_string(),
        duration,
        winner_count,
        eligibility: Eligibility::Anyone,
    }
}

/// An event persisted directly, as if left behind by a previous process.
pub fn stored_event(deadline: OffsetDateTime) -> NewGiveawayEvent {
    NewGiveawayEvent {
        id: None,
        tenant_id: TENANT,
        channel_id: CHANNEL,
        announcement: AnnouncementRef {
            channel_id: CHANNEL,
            message_id: MessageId(5000),
        },
        prize: "Steam key".to_string(),
        winner_count: 1,
        eligibility: Eligibility::Anyone,
        creator_id: UserId(1),
        deadline,
        created_at: deadline - Duration::from_secs(3600),
    }
}
