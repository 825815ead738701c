pub mod error;
pub mod record_store;
pub mod reminder_sink;
