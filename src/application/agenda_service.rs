use crate::application::notifications::NotificationScheduler;
use crate::application::pending_edits::PendingEditTracker;
use crate::application::skip_registry::SkipRegistry;
use crate::domain::models::{Task, TaskKind, TaskSnapshot};
use crate::domain::reconcile::{reconcile, snapshot_from, ReconcileInput};
use crate::domain::recurrence::ExpansionWindow;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordStore, SKIP_COLLECTION};
use crate::infrastructure::reminder_sink::ReminderSink;
use chrono::{Local, NaiveDateTime};
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard};

pub type NowProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Composition-root knobs for the agenda core.
#[derive(Debug, Clone)]
pub struct AgendaConfig {
    pub user_id: String,
    pub refresh_interval_secs: u64,
    pub reminder_lead_minutes: u32,
}

impl AgendaConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            reminder_lead_minutes: crate::application::notifications::DEFAULT_LEAD_MINUTES,
        }
    }

    pub fn validate(&self) -> Result<(), InfraError> {
        if self.user_id.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "agenda user_id must not be empty".to_string(),
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(InfraError::InvalidConfig(
                "refresh_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub blocks: usize,
    pub meetings: usize,
    pub todos: usize,
}

/// The reconciliation confinement domain: the current snapshot, the skip
/// overlay and the pending-edit set all live behind this service, and every
/// mutation goes through serialized calls into it. Source fetches run
/// concurrently; remote writes are fire-and-forget and never block reads.
pub struct AgendaService<S: RecordStore + 'static> {
    store: Arc<S>,
    config: AgendaConfig,
    skip_registry: Arc<SkipRegistry>,
    pending_edits: Arc<PendingEditTracker>,
    snapshot: Mutex<TaskSnapshot>,
    reminders: Option<NotificationScheduler>,
    now_provider: NowProvider,
}

impl<S: RecordStore + 'static> AgendaService<S> {
    pub fn new(store: Arc<S>, config: AgendaConfig) -> Result<Self, InfraError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            skip_registry: Arc::new(SkipRegistry::default()),
            pending_edits: Arc::new(PendingEditTracker::default()),
            snapshot: Mutex::new(TaskSnapshot::default()),
            reminders: None,
            now_provider: Arc::new(|| Local::now().naive_local()),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Attaches a reminder sink; every refresh then re-derives reminders
    /// from the new snapshot.
    pub fn with_reminder_sink(mut self, sink: Arc<dyn ReminderSink>) -> Self {
        self.reminders = Some(NotificationScheduler::new(sink));
        self
    }

    pub fn config(&self) -> &AgendaConfig {
        &self.config
    }

    pub fn pending_edits(&self) -> &Arc<PendingEditTracker> {
        &self.pending_edits
    }

    pub fn skip_registry(&self) -> &Arc<SkipRegistry> {
        &self.skip_registry
    }

    fn snapshot_guard(&self) -> Result<MutexGuard<'_, TaskSnapshot>, InfraError> {
        self.snapshot.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("agenda snapshot lock poisoned: {error}"))
        })
    }

    /// One full reconciliation pass. The per-source fetches run concurrently
    /// and each degrades to an empty list on failure, so a meetings outage
    /// still shows blocks and todos. The snapshot swap is the only write
    /// readers can observe; an attached reminder sink is rescheduled from
    /// the new snapshot afterwards.
    pub async fn refresh(&self) -> Result<TaskSnapshot, InfraError> {
        let now = (self.now_provider)();
        let window = ExpansionWindow::around(now.date());
        let user = self.config.user_id.as_str();

        let (recurring, dated, meetings, todos, skips) = tokio::join!(
            self.store.list_recurring_blocks(user),
            self.store.list_dated_blocks(user, window.start, window.end),
            self.store.list_meetings(user),
            self.store.list_todos(user),
            self.store.list_skips(user),
        );

        let input = ReconcileInput {
            recurring_blocks: degrade("recurring blocks", recurring),
            dated_blocks: degrade("dated blocks", dated),
            meetings: degrade("meetings", meetings),
            todos: degrade("todos", todos),
        };
        self.skip_registry.absorb(degrade("skip records", skips))?;

        let reconciled = reconcile(&input, &self.skip_registry.overlay()?, user, now);
        *self.snapshot_guard()? = reconciled.clone();

        if let Some(reminders) = &self.reminders {
            if let Err(error) =
                reminders.schedule(&reconciled.all, self.config.reminder_lead_minutes, now)
            {
                warn!("reminder rescheduling failed: {error}");
            }
        }
        Ok(reconciled)
    }

    pub fn snapshot(&self) -> Result<TaskSnapshot, InfraError> {
        Ok(self.snapshot_guard()?.clone())
    }

    pub fn today(&self) -> Result<Vec<Task>, InfraError> {
        let now = (self.now_provider)();
        Ok(self.snapshot_guard()?.today(now.date()))
    }

    /// First open task whose interval contains "now".
    pub fn current_task(&self) -> Result<Option<Task>, InfraError> {
        let now = (self.now_provider)();
        Ok(self
            .snapshot_guard()?
            .all
            .iter()
            .find(|task| !task.completed && task.contains_moment(now))
            .cloned())
    }

    /// First open, unskipped task starting after "now".
    pub fn next_task(&self) -> Result<Option<Task>, InfraError> {
        Ok(self.snapshot_guard()?.upcoming.first().cloned())
    }

    pub fn counts(&self) -> Result<TaskCounts, InfraError> {
        let snapshot = self.snapshot_guard()?;
        let mut counts = TaskCounts::default();
        for task in &snapshot.all {
            match task.kind {
                TaskKind::Block => counts.blocks += 1,
                TaskKind::Meeting => counts.meetings += 1,
                TaskKind::Todo => counts.todos += 1,
            }
        }
        Ok(counts)
    }

    /// Flips completion in the snapshot immediately and issues the remote
    /// patch in the background; the flip survives regardless of the write's
    /// outcome. Returns the new value, or `None` for an unknown id.
    pub fn toggle_completion(&self, task_id: &str) -> Result<Option<bool>, InfraError> {
        let now = (self.now_provider)();
        let (collection, record_id, new_value) = {
            let mut snapshot = self.snapshot_guard()?;
            let Some(task) = snapshot.all.iter_mut().find(|task| task.id == task_id) else {
                return Ok(None);
            };
            task.completed = !task.completed;
            let routed = (task.source_kind.collection(), task.source_id.clone(), task.completed);
            let tasks = std::mem::take(&mut snapshot.all);
            *snapshot = snapshot_from(tasks, now);
            routed
        };

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(error) = store
                .patch_record(collection, &record_id, "completed", serde_json::json!(new_value))
                .await
            {
                warn!("background completion patch for {collection}/{record_id} failed: {error}");
            }
        });
        Ok(Some(new_value))
    }

    /// Removes the task from the snapshot and deletes the backing record in
    /// the background.
    pub fn delete_task(&self, task_id: &str) -> Result<bool, InfraError> {
        let now = (self.now_provider)();
        let removed = {
            let mut snapshot = self.snapshot_guard()?;
            let Some(position) = snapshot.all.iter().position(|task| task.id == task_id) else {
                return Ok(false);
            };
            let removed = snapshot.all.remove(position);
            let tasks = std::mem::take(&mut snapshot.all);
            *snapshot = snapshot_from(tasks, now);
            removed
        };

        let store = Arc::clone(&self.store);
        let collection = removed.source_kind.collection();
        let record_id = removed.source_id;
        tokio::spawn(async move {
            if let Err(error) = store.delete_record(collection, &record_id).await {
                warn!("background delete of {collection}/{record_id} failed: {error}");
            }
        });
        Ok(true)
    }

    /// Marks the task skipped in the overlay and the snapshot, then persists
    /// the skip record in the background. Returns whether the id was present
    /// in the current snapshot; the overlay entry is kept either way.
    pub fn skip_task(&self, task_id: &str, reason: Option<String>) -> Result<bool, InfraError> {
        self.skip_registry.skip(task_id, reason.clone())?;
        let now = (self.now_provider)();
        let found = self.patch_skip_state(task_id, true, reason.clone(), now)?;

        let store = Arc::clone(&self.store);
        let body = serde_json::json!({
            "owner_id": self.config.user_id,
            "task_id": task_id,
            "reason": reason,
        });
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Err(error) = store.create_record(SKIP_COLLECTION, body).await {
                warn!("background skip persistence for {task_id} failed: {error}");
            }
        });
        Ok(found)
    }

    /// Reverses a skip. The persisted skip records carry their own ids, so
    /// the background removal goes through the by-task gateway operation
    /// rather than a direct record delete.
    pub fn unskip_task(&self, task_id: &str) -> Result<bool, InfraError> {
        let was_skipped = self.skip_registry.unskip(task_id)?;
        let now = (self.now_provider)();
        self.patch_skip_state(task_id, false, None, now)?;

        let store = Arc::clone(&self.store);
        let owner_id = self.config.user_id.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Err(error) = store.delete_skips_for_task(&owner_id, &task_id).await {
                warn!("background skip removal for {task_id} failed: {error}");
            }
        });
        Ok(was_skipped)
    }

    pub fn begin_edit(&self, task_id: &str) -> Result<(), InfraError> {
        self.pending_edits.begin_edit(task_id)
    }

    pub fn end_edit(&self, task_id: &str) -> Result<(), InfraError> {
        self.pending_edits.end_edit(task_id)
    }

    fn patch_skip_state(
        &self,
        task_id: &str,
        skipped: bool,
        reason: Option<String>,
        now: NaiveDateTime,
    ) -> Result<bool, InfraError> {
        let mut snapshot = self.snapshot_guard()?;
        let Some(task) = snapshot.all.iter_mut().find(|task| task.id == task_id) else {
            return Ok(false);
        };
        task.skipped = skipped;
        task.skip_reason = reason;
        let tasks = std::mem::take(&mut snapshot.all);
        *snapshot = snapshot_from(tasks, now);
        Ok(true)
    }
}

fn degrade<T>(source: &str, result: Result<Vec<T>, InfraError>) -> Vec<T> {
    result.unwrap_or_else(|error| {
        warn!("{source} fetch failed, degrading to empty: {error}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::{sample_block, sample_meeting, sample_todo};
    use crate::infrastructure::record_store::{InMemoryRecordStore, WriteOp};
    use crate::infrastructure::reminder_sink::InMemoryReminderSink;
    use chrono::NaiveDate;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 16)
            .expect("valid date")
            .and_hms_opt(8, 0, 0)
            .expect("valid time")
    }

    fn seeded_store() -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::default());
        store.seed_block(sample_block());
        store.seed_meeting(sample_meeting());
        store.seed_todo(sample_todo());
        store
    }

    fn service(store: Arc<InMemoryRecordStore>) -> AgendaService<InMemoryRecordStore> {
        AgendaService::new(store, AgendaConfig::new("user-1"))
            .expect("valid service config")
            .with_now_provider(Arc::new(fixed_now))
    }

    async fn drain_background_writes() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn refresh_merges_all_sources_into_one_sorted_snapshot() {
        init_logs();
        let agenda = service(seeded_store());

        let snapshot = agenda.refresh().await.expect("refresh");

        let ids: Vec<&str> = snapshot.all.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["blk-1", "todo-1", "meeting-42"]);
        assert_eq!(snapshot.upcoming.len(), 3);
    }

    #[tokio::test]
    async fn one_source_outage_degrades_to_a_partial_snapshot() {
        init_logs();
        let store = seeded_store();
        store.set_failing("meeting");
        let agenda = service(Arc::clone(&store));

        let snapshot = agenda.refresh().await.expect("refresh");

        assert!(snapshot.all.iter().all(|task| task.kind != TaskKind::Meeting));
        assert_eq!(snapshot.all.len(), 2);
    }

    #[tokio::test]
    async fn toggle_completion_is_visible_before_the_write_lands() {
        let store = seeded_store();
        let agenda = service(Arc::clone(&store));
        agenda.refresh().await.expect("refresh");

        let new_value = agenda.toggle_completion("blk-1").expect("toggle");

        assert_eq!(new_value, Some(true));
        let snapshot = agenda.snapshot().expect("snapshot");
        let task = snapshot.all.iter().find(|task| task.id == "blk-1").expect("task");
        assert!(task.completed);
        assert!(snapshot.upcoming.iter().all(|task| task.id != "blk-1"));
        assert_eq!(snapshot.completed.len(), 1);

        drain_background_writes().await;
        assert!(store.writes().iter().any(|op| matches!(
            op,
            WriteOp::Patch { collection, record_id, field, .. }
                if collection == "timeblock" && record_id == "blk-1" && field == "completed"
        )));
    }

    #[tokio::test]
    async fn toggle_completion_survives_a_failed_remote_write() {
        init_logs();
        let store = seeded_store();
        let agenda = service(Arc::clone(&store));
        agenda.refresh().await.expect("refresh");
        store.set_failing("todo");

        let new_value = agenda.toggle_completion("todo-1").expect("toggle");
        drain_background_writes().await;

        assert_eq!(new_value, Some(true));
        let snapshot = agenda.snapshot().expect("snapshot");
        let task = snapshot.all.iter().find(|task| task.id == "todo-1").expect("task");
        assert!(task.completed);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn toggle_completion_routes_meetings_by_integer_record_id() {
        let store = seeded_store();
        let agenda = service(Arc::clone(&store));
        agenda.refresh().await.expect("refresh");

        agenda.toggle_completion("meeting-42").expect("toggle");
        drain_background_writes().await;

        assert!(store.writes().iter().any(|op| matches!(
            op,
            WriteOp::Patch { collection, record_id, .. }
                if collection == "meeting" && record_id == "42"
        )));
    }

    #[tokio::test]
    async fn unknown_task_id_toggles_nothing() {
        let agenda = service(seeded_store());
        agenda.refresh().await.expect("refresh");
        assert_eq!(agenda.toggle_completion("missing").expect("toggle"), None);
    }

    #[tokio::test]
    async fn skip_persists_and_survives_the_next_refresh() {
        let store = seeded_store();
        let agenda = service(Arc::clone(&store));
        agenda.refresh().await.expect("refresh");

        assert!(agenda
            .skip_task("blk-1", Some("travel day".to_string()))
            .expect("skip"));
        let snapshot = agenda.snapshot().expect("snapshot");
        let task = snapshot.all.iter().find(|task| task.id == "blk-1").expect("task");
        assert!(task.skipped);
        assert_eq!(task.skip_reason.as_deref(), Some("travel day"));
        assert!(snapshot.upcoming.iter().all(|task| task.id != "blk-1"));

        drain_background_writes().await;
        let refreshed = agenda.refresh().await.expect("refresh");
        let task = refreshed.all.iter().find(|task| task.id == "blk-1").expect("task");
        assert!(task.skipped);
    }

    #[tokio::test]
    async fn unskip_restores_the_task_to_upcoming() {
        let store = seeded_store();
        let agenda = service(Arc::clone(&store));
        agenda.refresh().await.expect("refresh");
        agenda.skip_task("blk-1", None).expect("skip");
        drain_background_writes().await;

        assert!(agenda.unskip_task("blk-1").expect("unskip"));
        drain_background_writes().await;

        let snapshot = agenda.snapshot().expect("snapshot");
        assert!(snapshot.upcoming.iter().any(|task| task.id == "blk-1"));
        let refreshed = agenda.refresh().await.expect("refresh");
        let task = refreshed.all.iter().find(|task| task.id == "blk-1").expect("task");
        assert!(!task.skipped);
    }

    #[tokio::test]
    async fn unskip_deletes_the_persisted_skip_by_its_record_id() {
        let store = seeded_store();
        let agenda = service(Arc::clone(&store));
        agenda.refresh().await.expect("refresh");
        agenda.skip_task("blk-1", None).expect("skip");
        drain_background_writes().await;
        let persisted = store.list_skips("user-1").await.expect("skips");
        assert_eq!(persisted.len(), 1);
        let record_id = persisted[0].id.clone();

        agenda.unskip_task("blk-1").expect("unskip");
        drain_background_writes().await;

        let mut saw_delete = false;
        for op in store.writes() {
            if let WriteOp::Delete { collection, record_id: deleted } = op {
                saw_delete = true;
                assert_eq!(collection, SKIP_COLLECTION);
                assert_eq!(deleted, record_id);
                assert_ne!(deleted, "blk-1");
            }
        }
        assert!(saw_delete);
        assert!(store.list_skips("user-1").await.expect("skips").is_empty());
    }

    #[tokio::test]
    async fn delete_removes_locally_and_issues_background_delete() {
        let store = seeded_store();
        let agenda = service(Arc::clone(&store));
        agenda.refresh().await.expect("refresh");

        assert!(agenda.delete_task("todo-1").expect("delete"));
        assert!(!agenda.delete_task("todo-1").expect("delete"));
        assert!(agenda
            .snapshot()
            .expect("snapshot")
            .all
            .iter()
            .all(|task| task.id != "todo-1"));

        drain_background_writes().await;
        assert!(store.writes().iter().any(|op| matches!(
            op,
            WriteOp::Delete { collection, record_id }
                if collection == "todo" && record_id == "todo-1"
        )));
    }

    #[tokio::test]
    async fn refresh_rederives_reminders_for_the_new_snapshot() {
        let store = seeded_store();
        let sink = Arc::new(InMemoryReminderSink::default());
        let agenda = service(Arc::clone(&store)).with_reminder_sink(sink.clone());

        agenda.refresh().await.expect("refresh");
        assert_eq!(sink.scheduled().len(), 3);

        store
            .patch_record("timeblock", "blk-1", "completed", serde_json::json!(true))
            .await
            .expect("patch block");
        agenda.refresh().await.expect("refresh");

        let scheduled = sink.scheduled();
        assert_eq!(scheduled.len(), 2);
        assert!(scheduled.iter().all(|request| request.task_id != "blk-1"));
    }

    #[tokio::test]
    async fn current_and_next_task_follow_the_clock() {
        let store = seeded_store();
        let mid_block = NaiveDate::from_ymd_opt(2026, 2, 16)
            .expect("valid date")
            .and_hms_opt(9, 30, 0)
            .expect("valid time");
        let agenda = AgendaService::new(Arc::clone(&store), AgendaConfig::new("user-1"))
            .expect("valid service config")
            .with_now_provider(Arc::new(move || mid_block));
        agenda.refresh().await.expect("refresh");

        let current = agenda.current_task().expect("current").expect("current task");
        let next = agenda.next_task().expect("next").expect("next task");
        assert_eq!(current.id, "blk-1");
        assert_eq!(next.id, "todo-1");
    }

    #[tokio::test]
    async fn counts_split_by_task_kind() {
        let agenda = service(seeded_store());
        agenda.refresh().await.expect("refresh");

        assert_eq!(
            agenda.counts().expect("counts"),
            TaskCounts {
                blocks: 1,
                meetings: 1,
                todos: 1
            }
        );
    }

    #[tokio::test]
    async fn edit_passthrough_reaches_the_tracker() {
        let agenda = service(seeded_store());
        agenda.begin_edit("blk-1").expect("begin_edit");
        assert!(agenda.pending_edits().is_blocking().expect("is_blocking"));
        agenda.end_edit("blk-1").expect("end_edit");
        assert!(!agenda.pending_edits().is_blocking().expect("is_blocking"));
    }

    #[test]
    fn config_validation_rejects_blank_user_and_zero_interval() {
        assert!(AgendaConfig::new(" ").validate().is_err());
        let mut config = AgendaConfig::new("user-1");
        config.refresh_interval_secs = 0;
        assert!(config.validate().is_err());
        assert!(AgendaConfig::new("user-1").validate().is_ok());
    }
}
