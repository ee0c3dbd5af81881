//! Drives giveaways to completion.
//!
//! The Scheduler is responsible for:
//! - Recovering after a restart (erroring interrupted completions, completing
//!   overdue events, re-arming timers for the rest)
//! - Keeping one sleeping timer task per active event, armed and disarmed by
//!   [`ScheduleCommand`]s from the [`EventService`]
//! - Running the periodic sweep that completes anything a timer missed,
//!   with its interval hot-swapped through a [`ConfigStore`]
//!
//! Timers and sweep only ever call into the service, so they race through
//! the same status CAS as manual commands. On shutdown, timers that already
//! fired are joined so no event is left in `Completing`.

pub mod channels;

use crate::config::{ConfigStore, ConfigWatcher, SchedulerConfig};
use crate::entities::{EventId, EventStatus};
use crate::service::{CompletionResult, EventService, ServiceError};
use crate::utils::time_until;
use channels::{ScheduleCommand, ScheduleCommandReceiver};
use futures_util::{StreamExt, future, stream};
use kanau::processor::Processor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub use channels::{ScheduleCommandSender, schedule_command_channel};

/// Outcome counts of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub finished: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome counts of the startup recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub interrupted: usize,
    pub completed: SweepReport,
    pub armed: usize,
}

/// Upper bound for joining fired timers on shutdown.
const TIMER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A sleeping timer. Dropping `cancel` stops it unless it already fired.
struct Timer {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    service: Arc<EventService>,
    config_store: ConfigStore<SchedulerConfig>,
    timers: Mutex<HashMap<EventId, Timer>>,
    /// Disarmed or replaced timers whose completion may still be running.
    detached: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(service: Arc<EventService>, config_store: ConfigStore<SchedulerConfig>) -> Self {
        Self {
            service,
            config_store,
            timers: Mutex::new(HashMap::new()),
            detached: Mutex::new(Vec::new()),
        }
    }

    /// Run until shutdown is signaled.
    ///
    /// Recovers first, then spawns the sweep loop and applies schedule
    /// commands as they arrive. On shutdown sleeping timers are cancelled,
    /// fired timers get a bounded wait to finish, and the sweep loop finishes
    /// its current pass.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut command_rx: ScheduleCommandReceiver,
        config_watcher: ConfigWatcher<SchedulerConfig>,
    ) {
        match self.recover().await {
            Ok(report) => info!(
                interrupted = report.interrupted,
                completed = report.completed.finished,
                failed = report.completed.failed,
                armed = report.armed,
                "Scheduler recovery complete"
            ),
            Err(e) => error!(error = %e, "Scheduler recovery failed, sweep will retry"),
        }

        let sweep_handle = tokio::spawn(sweep_loop(
            Arc::clone(&self.service),
            self.config_store.clone(),
            config_watcher,
            shutdown_rx.clone(),
        ));

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                Some(command) = command_rx.recv() => {
                    let _ = self.process(command).await;
                }
            }
        }

        let timers = std::mem::take(&mut *self.timers.lock());
        debug!(count = timers.len(), "Cancelling sleeping timers");
        for timer in timers.into_values() {
            self.detach(timer);
        }
        self.drain_fired_timers().await;

        if let Err(e) = sweep_handle.await {
            warn!(error = %e, "Sweep loop ended abnormally");
        }
        info!("Scheduler shutdown complete");
    }

    /// Startup pass: error events stuck in `Completing`, complete overdue
    /// events, and arm timers for the ones still running.
    pub async fn recover(&self) -> Result<RecoveryReport, ServiceError> {
        let store = self.service.store();
        let mut report = RecoveryReport::default();

        for event in store.list_by_status(EventStatus::Completing).await? {
            if self.service.abandon_interrupted(event.id).await? {
                report.interrupted += 1;
            }
        }

        let now = self.service.clock().now();
        let concurrency = self.config_store.current().sweep_concurrency;
        report.completed = sweep_due(&self.service, now, concurrency).await?;

        for event in store.list_by_status(EventStatus::Active).await? {
            if event.deadline > now {
                self.arm(event.id, event.deadline);
                report.armed += 1;
            }
        }
        Ok(report)
    }

    /// Complete every event that is due right now.
    pub async fn sweep(&self) -> Result<SweepReport, ServiceError> {
        let concurrency = self.config_store.current().sweep_concurrency;
        sweep_due(&self.service, self.service.clock().now(), concurrency).await
    }

    /// Number of timers that are still running.
    pub fn armed_count(&self) -> usize {
        let mut timers = self.timers.lock();
        timers.retain(|_, timer| !timer.handle.is_finished());
        timers.len()
    }

    fn arm(&self, event_id: EventId, deadline: OffsetDateTime) {
        let (cancel, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(run_timer(
            Arc::clone(&self.service),
            event_id,
            deadline,
            cancel_rx,
        ));

        let mut timers = self.timers.lock();
        timers.retain(|_, timer| !timer.handle.is_finished());
        if let Some(old) = timers.insert(event_id, Timer { cancel, handle }) {
            self.detach(old);
        }
    }

    fn disarm(&self, event_id: EventId) {
        let mut timers = self.timers.lock();
        timers.retain(|_, timer| !timer.handle.is_finished());
        if let Some(timer) = timers.remove(&event_id) {
            self.detach(timer);
        }
    }

    /// Stop a timer if it is still sleeping, and keep its handle if it fired.
    fn detach(&self, timer: Timer) {
        drop(timer.cancel);
        let mut detached = self.detached.lock();
        detached.retain(|handle| !handle.is_finished());
        if !timer.handle.is_finished() {
            detached.push(timer.handle);
        }
    }

    /// Wait for fired timers to finish their completion.
    async fn drain_fired_timers(&self) {
        let handles = std::mem::take(&mut *self.detached.lock());
        if handles.is_empty() {
            return;
        }
        debug!(count = handles.len(), "Waiting for fired timers");
        if tokio::time::timeout(TIMER_DRAIN_TIMEOUT, future::join_all(handles))
            .await
            .is_err()
        {
            warn!(
                timeout_secs = TIMER_DRAIN_TIMEOUT.as_secs(),
                "Fired timers still running at shutdown, their giveaways will be errored on restart"
            );
        }
    }
}

impl Processor<ScheduleCommand> for Scheduler {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, command: ScheduleCommand) -> Result<(), Infallible> {
        match command {
            ScheduleCommand::Arm { event_id, deadline } => {
                debug!(event_id = %event_id, deadline = %deadline, "Arming timer");
                self.arm(event_id, deadline);
            }
            ScheduleCommand::Disarm { event_id } => {
                debug!(event_id = %event_id, "Disarming timer");
                self.disarm(event_id);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Sleep until the deadline, then complete the event.
///
/// Cancellation only takes effect while sleeping. Once fired, the completion
/// runs to the end so a claimed event is never left in `Completing`.
async fn run_timer(
    service: Arc<EventService>,
    event_id: EventId,
    mut deadline: OffsetDateTime,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    loop {
        let wait = time_until(deadline, service.clock().now());
        tokio::select! {
            _ = &mut cancel_rx => {
                debug!(event_id = %event_id, "Timer cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        match service.complete_due(event_id).await {
            Ok(CompletionResult::NotDue { deadline: next }) => {
                debug!(event_id = %event_id, deadline = %next, "Deadline moved, sleeping again");
                deadline = next;
            }
            Ok(outcome) => {
                info!(event_id = %event_id, outcome = ?outcome, "Timer fired");
                return;
            }
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Timer could not complete giveaway, sweep will retry");
                return;
            }
        }
    }
}

fn sweep_ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn sweep_loop(
    service: Arc<EventService>,
    config_store: ConfigStore<SchedulerConfig>,
    mut config_watcher: ConfigWatcher<SchedulerConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let config = config_store.current();
    let mut concurrency = config.sweep_concurrency;
    let mut ticker = sweep_ticker(config.sweep_interval);
    info!(
        interval_secs = config.sweep_interval.as_secs(),
        "Sweep loop started"
    );

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            Some(config) = config_watcher.changed() => {
                ticker = sweep_ticker(config.sweep_interval);
                concurrency = config.sweep_concurrency;
                info!(
                    interval_secs = config.sweep_interval.as_secs(),
                    concurrency,
                    "Sweep loop reconfigured"
                );
            }

            _ = ticker.tick() => {
                match sweep_due(&service, service.clock().now(), concurrency).await {
                    Ok(report) if report.due > 0 => info!(
                        due = report.due,
                        finished = report.finished,
                        skipped = report.skipped,
                        failed = report.failed,
                        "Sweep pass complete"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Sweep pass failed"),
                }
            }
        }
    }
    info!("Sweep loop shutdown complete");
}

/// Complete all events due at `now`, `concurrency` at a time.
async fn sweep_due(
    service: &EventService,
    now: OffsetDateTime,
    concurrency: usize,
) -> Result<SweepReport, ServiceError> {
    let due = service.store().list_due(now).await?;
    let mut report = SweepReport {
        due: due.len(),
        ..SweepReport::default()
    };

    let results: Vec<(EventId, Result<CompletionResult, ServiceError>)> = stream::iter(due)
        .map(|event| async move { (event.id, service.complete(event.id).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (event_id, result) in results {
        match result {
            Ok(CompletionResult::AlreadyFinished { .. }) => report.skipped += 1,
            Ok(_) => report.finished += 1,
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Sweep could not complete giveaway");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}
