//! Scheduled actions: local-time windows, at-most-once reservations,
//! deferred deletion and the dispatcher loop that ties them together.

pub mod actions;
pub mod content;
pub mod deletion;
pub mod dispatcher;
pub mod ledger;

pub use actions::{ActionKind, LocalSchedule, ScheduledAction, local_time, resolve_timezone};
pub use content::{ContentSource, NudgeContext, TemplateContent};
pub use deletion::{DeletionReport, DeletionRequest, DeletionStatus};
pub use dispatcher::{ActionReport, Dispatcher, TickReport};
pub use ledger::{DeliveryOutcome, DeliveryRecord, Reservation, ReservationLedger};
