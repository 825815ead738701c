use crate::application::agenda_service::AgendaService;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::RecordStore;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Periodic refresh driver. Ticks are suppressed, not deferred: while the
/// loop is paused or an optimistic edit is in flight the tick is dropped and
/// the next interval fires as usual.
pub struct AutoRefreshScheduler<S: RecordStore + 'static> {
    service: Arc<AgendaService<S>>,
    interval: Duration,
    paused: AtomicBool,
}

impl<S: RecordStore + 'static> AutoRefreshScheduler<S> {
    pub fn new(service: Arc<AgendaService<S>>) -> Self {
        let interval = Duration::from_secs(service.config().refresh_interval_secs);
        Self {
            service,
            interval,
            paused: AtomicBool::new(false),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn should_tick(&self) -> Result<bool, InfraError> {
        Ok(!self.is_paused() && !self.service.pending_edits().is_blocking()?)
    }

    /// Runs one scheduled tick. Returns whether a refresh actually happened.
    pub async fn tick(&self) -> Result<bool, InfraError> {
        if !self.should_tick()? {
            debug!("auto-refresh tick suppressed");
            return Ok(false);
        }
        self.service.refresh().await?;
        Ok(true)
    }

    /// Drives ticks forever. The interval's immediate first tick is consumed
    /// before the loop so the caller controls the initial load explicitly.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(error) = self.tick().await {
                warn!("auto-refresh tick failed: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agenda_service::AgendaConfig;
    use crate::domain::models::fixtures::sample_block;
    use crate::infrastructure::record_store::{InMemoryRecordStore, RecordStore};
    use crate::infrastructure::reminder_sink::InMemoryReminderSink;
    use chrono::{NaiveDate, NaiveDateTime};

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 16)
            .expect("valid date")
            .and_hms_opt(8, 0, 0)
            .expect("valid time")
    }

    fn scheduler() -> AutoRefreshScheduler<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::default());
        store.seed_block(sample_block());
        let service = AgendaService::new(store, AgendaConfig::new("user-1"))
            .expect("valid service config")
            .with_now_provider(Arc::new(fixed_now));
        AutoRefreshScheduler::new(Arc::new(service))
    }

    #[tokio::test]
    async fn tick_refreshes_the_snapshot() {
        let scheduler = scheduler();
        assert!(scheduler.service.snapshot().expect("snapshot").all.is_empty());

        assert!(scheduler.tick().await.expect("tick"));
        assert_eq!(scheduler.service.snapshot().expect("snapshot").all.len(), 1);
    }

    #[tokio::test]
    async fn paused_scheduler_suppresses_ticks() {
        let scheduler = scheduler();
        scheduler.pause();

        assert!(!scheduler.tick().await.expect("tick"));
        assert!(scheduler.service.snapshot().expect("snapshot").all.is_empty());

        scheduler.resume();
        assert!(scheduler.tick().await.expect("tick"));
    }

    #[tokio::test]
    async fn pending_edit_suppresses_the_tick_without_pausing() {
        let scheduler = scheduler();
        scheduler.service.begin_edit("blk-1").expect("begin_edit");

        assert!(!scheduler.tick().await.expect("tick"));
        assert!(!scheduler.is_paused());

        scheduler.service.end_edit("blk-1").expect("end_edit");
        assert!(scheduler.tick().await.expect("tick"));
    }

    #[tokio::test]
    async fn tick_replaces_stale_reminders() {
        let store = Arc::new(InMemoryRecordStore::default());
        store.seed_block(sample_block());
        let sink = Arc::new(InMemoryReminderSink::default());
        let service = AgendaService::new(Arc::clone(&store), AgendaConfig::new("user-1"))
            .expect("valid service config")
            .with_now_provider(Arc::new(fixed_now))
            .with_reminder_sink(sink.clone());
        let scheduler = AutoRefreshScheduler::new(Arc::new(service));

        assert!(scheduler.tick().await.expect("tick"));
        assert_eq!(sink.scheduled().len(), 1);

        store
            .patch_record("timeblock", "blk-1", "completed", serde_json::json!(true))
            .await
            .expect("patch block");
        assert!(scheduler.tick().await.expect("tick"));

        assert!(sink.scheduled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_ticks_on_the_configured_interval() {
        let scheduler = Arc::new(scheduler());
        tokio::spawn(Arc::clone(&scheduler).run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.service.snapshot().expect("snapshot").all.is_empty());

        tokio::time::sleep(scheduler.interval()).await;
        assert_eq!(scheduler.service.snapshot().expect("snapshot").all.len(), 1);
    }
}
