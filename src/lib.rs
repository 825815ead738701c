//! dayweave merges fixed-date blocks, recurring blocks, meetings and todos
//! from a remote record store into one chronological task list, tracks
//! optimistic local edits against it, and derives the reminders a host
//! application should fire.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::agenda_service::{AgendaConfig, AgendaService, TaskCounts};
pub use application::auto_refresh::AutoRefreshScheduler;
pub use application::notifications::NotificationScheduler;
pub use application::pending_edits::PendingEditTracker;
pub use application::skip_registry::SkipRegistry;
pub use domain::models::{Task, TaskKind, TaskSnapshot};
pub use infrastructure::error::InfraError;
pub use infrastructure::record_store::{RecordStore, ReqwestRecordStore};
pub use infrastructure::reminder_sink::{ReminderRequest, ReminderSink};
