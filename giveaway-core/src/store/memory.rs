//! In-process [`EventStore`] with optional JSON snapshots.
//!
//! Every event sits behind its own mutex so a CAS on one event never waits
//! on another. `Active` events are additionally indexed by `(deadline, id)`
//! for the due query. Locks are always taken event first, index second, and
//! none is held across an await.

use crate::entities::giveaway_event::apply_transition;
use crate::entities::{EventId, EventMutator, EventStatus, GiveawayEvent, NewGiveawayEvent, TenantId};
use crate::store::{EventStore, StatusFilter, StoreError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type Slot = Arc<Mutex<GiveawayEvent>>;

pub struct MemoryEventStore {
    events: RwLock<HashMap<EventId, Slot>>,
    due_index: Mutex<BTreeSet<(OffsetDateTime, EventId)>>,
    snapshot_path: Option<PathBuf>,
    dirty: AtomicBool,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventStore {
    /// A store that lives only as long as the process.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            due_index: Mutex::new(BTreeSet::new()),
            snapshot_path: None,
            dirty: AtomicBool::new(false),
        }
    }

    /// Open a store persisted to `path`, loading the existing snapshot if any.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut store = Self::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let events: Vec<GiveawayEvent> = serde_json::from_str(&content)?;
                info!(
                    path = %path.display(),
                    count = events.len(),
                    "Loaded giveaway snapshot"
                );
                store.load(events);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No giveaway snapshot yet, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        store.snapshot_path = Some(path);
        Ok(store)
    }

    fn load(&mut self, events: Vec<GiveawayEvent>) {
        let map = self.events.get_mut();
        let index = self.due_index.get_mut();
        for event in events {
            if event.status == EventStatus::Active {
                index.insert((event.deadline, event.id));
            }
            map.insert(event.id, Arc::new(Mutex::new(event)));
        }
    }

    fn slot(&self, id: EventId) -> Option<Slot> {
        self.events.read().get(&id).cloned()
    }

    /// Clone every event matching `keep`, earliest deadline first.
    fn collect(&self, keep: impl Fn(&GiveawayEvent) -> bool) -> Vec<GiveawayEvent> {
        let slots: Vec<Slot> = self.events.read().values().cloned().collect();
        let mut events: Vec<GiveawayEvent> = slots
            .iter()
            .filter_map(|slot| {
                let event = slot.lock();
                keep(&event).then(|| event.clone())
            })
            .collect();
        events.sort_by_key(|e| (e.deadline, e.id));
        events
    }

    fn reindex(&self, before: &GiveawayEvent, after: &GiveawayEvent) {
        let mut index = self.due_index.lock();
        if before.status == EventStatus::Active {
            index.remove(&(before.deadline, before.id));
        }
        if after.status == EventStatus::Active {
            index.insert((after.deadline, after.id));
        }
    }

    /// Write all events to the snapshot file if anything changed since the
    /// last write. Returns whether a file was written.
    ///
    /// The file is replaced atomically through a temporary sibling.
    pub async fn snapshot(&self) -> Result<bool, StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(false);
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let events = self.collect(|_| true);
        let result = write_atomically(path, &events).await;
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result?;
        debug!(path = %path.display(), count = events.len(), "Wrote giveaway snapshot");
        Ok(true)
    }

    /// Periodically snapshot until shutdown, then write a final snapshot.
    pub async fn run_snapshot_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        if self.snapshot_path.is_none() {
            return;
        }
        info!(interval_secs = interval.as_secs(), "Snapshot loop started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.snapshot().await {
                        warn!(error = %e, "Failed to write giveaway snapshot");
                    }
                }
            }
        }

        if let Err(e) = self.snapshot().await {
            error!(error = %e, "Failed to write final giveaway snapshot");
        }
        info!("Snapshot loop shutdown complete");
    }
}

async fn write_atomically(path: &Path, events: &[GiveawayEvent]) -> Result<(), StoreError> {
    let content = serde_json::to_vec(events)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create(&self, event: NewGiveawayEvent) -> Result<GiveawayEvent, StoreError> {
        let id = event.id.unwrap_or_else(EventId::generate);
        let event = event.into_event(id);

        let mut events = self.events.write();
        if events.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        events.insert(id, Arc::new(Mutex::new(event.clone())));
        self.due_index.lock().insert((event.deadline, id));
        drop(events);

        self.dirty.store(true, Ordering::Release);
        Ok(event)
    }

    async fn get(&self, id: EventId) -> Result<GiveawayEvent, StoreError> {
        let slot = self.slot(id).ok_or(StoreError::NotFound(id))?;
        let event = slot.lock().clone();
        Ok(event)
    }

    async fn compare_and_swap_status(
        &self,
        id: EventId,
        expected: EventStatus,
        new: EventStatus,
        mutator: EventMutator,
    ) -> Result<Option<GiveawayEvent>, StoreError> {
        let Some(slot) = self.slot(id) else {
            return Ok(None);
        };
        let mut current = slot.lock();
        if current.status != expected {
            return Ok(None);
        }

        let mut updated = current.clone();
        apply_transition(&mut updated, new, mutator);
        self.reindex(&current, &updated);
        *current = updated.clone();
        drop(current);

        self.dirty.store(true, Ordering::Release);
        Ok(Some(updated))
    }

    async fn list_due(&self, before: OffsetDateTime) -> Result<Vec<GiveawayEvent>, StoreError> {
        let due: Vec<EventId> = self
            .due_index
            .lock()
            .iter()
            .take_while(|(deadline, _)| *deadline <= before)
            .map(|(_, id)| *id)
            .collect();

        // The index is only a hint; recheck each event under its own lock.
        let mut events = Vec::with_capacity(due.len());
        for id in due {
            if let Some(slot) = self.slot(id) {
                let event = slot.lock();
                if event.status == EventStatus::Active && event.deadline <= before {
                    events.push(event.clone());
                }
            }
        }
        Ok(events)
    }

    async fn list_by_tenant(
        &self,
        tenant: TenantId,
        filter: StatusFilter,
    ) -> Result<Vec<GiveawayEvent>, StoreError> {
        let status = filter.as_status();
        Ok(self.collect(|e| e.tenant_id == tenant && status.is_none_or(|s| e.status == s)))
    }

    async fn list_by_status(&self, status: EventStatus) -> Result<Vec<GiveawayEvent>, StoreError> {
        Ok(self.collect(|e| e.status == status))
    }
}
