pub mod agenda_service;
pub mod auto_refresh;
pub mod notifications;
pub mod pending_edits;
pub mod skip_registry;
