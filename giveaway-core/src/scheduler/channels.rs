//! Timer commands sent from the service to the scheduler.

use crate::entities::EventId;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Default buffer size for the schedule command channel.
///
/// A full buffer only drops timer hints; the sweep still completes the event.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleCommand {
    /// Start, or restart with a new deadline, the timer of an event.
    Arm {
        event_id: EventId,
        deadline: OffsetDateTime,
    },
    /// Stop the timer of an event if it is still sleeping.
    Disarm { event_id: EventId },
}

impl ScheduleCommand {
    pub fn event_id(&self) -> EventId {
        match self {
            ScheduleCommand::Arm { event_id, .. } | ScheduleCommand::Disarm { event_id } => *event_id,
        }
    }
}

/// Sender handle for schedule commands.
pub type ScheduleCommandSender = mpsc::Sender<ScheduleCommand>;
/// Receiver handle for schedule commands.
pub type ScheduleCommandReceiver = mpsc::Receiver<ScheduleCommand>;

/// Create a new schedule command channel.
///
/// The sender goes to the `EventService`, the receiver to the `Scheduler`.
pub fn schedule_command_channel() -> (ScheduleCommandSender, ScheduleCommandReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
