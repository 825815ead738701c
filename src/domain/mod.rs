pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod recurrence;
