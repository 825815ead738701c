use crate::domain::models::{MeetingRecord, TimeBlockRecord, TodoRecord};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use url::Url;

pub const SKIP_COLLECTION: &str = "task_skip";

/// Persisted form of one skip overlay entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkipRecord {
    pub id: String,
    pub owner_id: String,
    pub task_id: String,
    pub reason: Option<String>,
}

/// Remote Data Gateway: typed reads per record source plus collection-routed
/// write primitives. Implementations own transport and decoding; the read
/// path treats every error as "that source is empty for this pass".
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_dated_blocks(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeBlockRecord>, InfraError>;

    async fn list_recurring_blocks(
        &self,
        owner_id: &str,
    ) -> Result<Vec<TimeBlockRecord>, InfraError>;

    /// Server-side filter is `(owner = user) OR (user ∈ attendees)`; the
    /// reconciler re-checks the same predicate client-side.
    async fn list_meetings(&self, user_id: &str) -> Result<Vec<MeetingRecord>, InfraError>;

    async fn list_todos(&self, owner_id: &str) -> Result<Vec<TodoRecord>, InfraError>;

    async fn list_skips(&self, owner_id: &str) -> Result<Vec<SkipRecord>, InfraError>;

    /// Single-field partial update addressed by record id and collection.
    async fn patch_record(
        &self,
        collection: &str,
        record_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), InfraError>;

    async fn create_record(
        &self,
        collection: &str,
        body: serde_json::Value,
    ) -> Result<String, InfraError>;

    async fn delete_record(&self, collection: &str, record_id: &str) -> Result<(), InfraError>;

    /// Removes every persisted skip for the task. Skip records carry their
    /// own ids, so callers that only know the task id go through this
    /// instead of `delete_record`.
    async fn delete_skips_for_task(
        &self,
        owner_id: &str,
        task_id: &str,
    ) -> Result<(), InfraError>;
}

/// REST-shaped store speaking filter-by-equality/range query parameters
/// against `{base}/records/{collection}`.
#[derive(Debug, Clone)]
pub struct ReqwestRecordStore {
    client: Client,
    base_url: Url,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct RecordListResponse<T> {
    items: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecordResponse {
    id: Option<String>,
}

impl ReqwestRecordStore {
    pub fn new(base_url: &str, auth_token: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid store base url: {error}")))?;
        if auth_token.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "store auth token must not be empty".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            auth_token: auth_token.trim().to_string(),
        })
    }

    fn collection_endpoint(&self, collection: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("store base URL cannot be a base".to_string())
            })?;
            segments.push("records");
            segments.push(collection);
        }
        Ok(url)
    }

    fn record_endpoint(&self, collection: &str, record_id: &str) -> Result<Url, InfraError> {
        let mut url = self.collection_endpoint(collection)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("store records URL cannot be a base".to_string())
            })?;
            segments.push(record_id);
        }
        Ok(url)
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        if body.trim().is_empty() {
            InfraError::Transport(format!("record store error: http {}", status.as_u16()))
        } else {
            InfraError::Transport(format!(
                "record store error: http {}; body={body}",
                status.as_u16()
            ))
        }
    }

    async fn list_records<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let response = self
            .client
            .get(endpoint)
            .query(query)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|error| {
                InfraError::Transport(format!("network error while listing {collection}: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Transport(format!("failed reading {collection} list response: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        let parsed: RecordListResponse<T> = serde_json::from_str(&body).map_err(|error| {
            InfraError::Decode(format!("invalid {collection} list payload: {error}"))
        })?;
        Ok(parsed.items.unwrap_or_default())
    }
}

#[async_trait]
impl RecordStore for ReqwestRecordStore {
    async fn list_dated_blocks(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeBlockRecord>, InfraError> {
        self.list_records(
            "timeblock",
            &[
                ("owner", owner_id.to_string()),
                ("date_from", from.to_string()),
                ("date_to", to.to_string()),
                ("is_recurring", "false".to_string()),
            ],
        )
        .await
    }

    async fn list_recurring_blocks(
        &self,
        owner_id: &str,
    ) -> Result<Vec<TimeBlockRecord>, InfraError> {
        self.list_records(
            "timeblock",
            &[
                ("owner", owner_id.to_string()),
                ("is_recurring", "true".to_string()),
            ],
        )
        .await
    }

    async fn list_meetings(&self, user_id: &str) -> Result<Vec<MeetingRecord>, InfraError> {
        self.list_records("meeting", &[("participant", user_id.to_string())])
            .await
    }

    async fn list_todos(&self, owner_id: &str) -> Result<Vec<TodoRecord>, InfraError> {
        self.list_records("todo", &[("owner", owner_id.to_string())])
            .await
    }

    async fn list_skips(&self, owner_id: &str) -> Result<Vec<SkipRecord>, InfraError> {
        self.list_records(SKIP_COLLECTION, &[("owner", owner_id.to_string())])
            .await
    }

    async fn patch_record(
        &self,
        collection: &str,
        record_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), InfraError> {
        let endpoint = self.record_endpoint(collection, record_id)?;
        let body = serde_json::json!({ field: value });
        let response = self
            .client
            .patch(endpoint)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                InfraError::Transport(format!("network error while patching {collection}: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Transport(format!("failed reading {collection} patch response: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(())
    }

    async fn create_record(
        &self,
        collection: &str,
        body: serde_json::Value,
    ) -> Result<String, InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                InfraError::Transport(format!("network error while creating {collection}: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Transport(format!("failed reading {collection} create response: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        let parsed: CreatedRecordResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Decode(format!("invalid {collection} create payload: {error}"))
        })?;
        parsed
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                InfraError::Decode(format!("{collection} create response did not include id"))
            })
    }

    async fn delete_record(&self, collection: &str, record_id: &str) -> Result<(), InfraError> {
        let endpoint = self.record_endpoint(collection, record_id)?;
        let response = self
            .client
            .delete(endpoint)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|error| {
                InfraError::Transport(format!("network error while deleting {collection}: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Transport(format!("failed reading {collection} delete response: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(())
    }

    async fn delete_skips_for_task(
        &self,
        owner_id: &str,
        task_id: &str,
    ) -> Result<(), InfraError> {
        let skips: Vec<SkipRecord> = self
            .list_records(
                SKIP_COLLECTION,
                &[
                    ("owner", owner_id.to_string()),
                    ("task_id", task_id.to_string()),
                ],
            )
            .await?;
        for skip in skips {
            self.delete_record(SKIP_COLLECTION, &skip.id).await?;
        }
        Ok(())
    }
}

/// One recorded write primitive, kept so tests and composition roots can
/// observe the fire-and-forget write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Patch {
        collection: String,
        record_id: String,
        field: String,
        value: serde_json::Value,
    },
    Create {
        collection: String,
        body: serde_json::Value,
    },
    Delete {
        collection: String,
        record_id: String,
    },
}

fn guard<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, InfraError> {
    mutex
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("{what} lock poisoned: {error}")))
}

/// In-memory store for tests and offline composition. Reads serve seeded
/// records; writes are journaled, with `completed` patches applied back to
/// the seeds so repeated refreshes observe them. Individual collections can
/// be marked failing to exercise the degrade path.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    blocks: Mutex<Vec<TimeBlockRecord>>,
    meetings: Mutex<Vec<MeetingRecord>>,
    todos: Mutex<Vec<TodoRecord>>,
    skips: Mutex<Vec<SkipRecord>>,
    writes: Mutex<Vec<WriteOp>>,
    failing: Mutex<HashSet<String>>,
    next_id: Mutex<u64>,
}

impl InMemoryRecordStore {
    pub fn seed_block(&self, block: TimeBlockRecord) {
        self.blocks.lock().expect("block seed lock").push(block);
    }

    pub fn seed_meeting(&self, meeting: MeetingRecord) {
        self.meetings.lock().expect("meeting seed lock").push(meeting);
    }

    pub fn seed_todo(&self, todo: TodoRecord) {
        self.todos.lock().expect("todo seed lock").push(todo);
    }

    pub fn seed_skip(&self, skip: SkipRecord) {
        self.skips.lock().expect("skip seed lock").push(skip);
    }

    pub fn set_failing(&self, collection: &str) {
        self.failing
            .lock()
            .expect("failing set lock")
            .insert(collection.to_string());
    }

    pub fn clear_failing(&self, collection: &str) {
        self.failing
            .lock()
            .expect("failing set lock")
            .remove(collection);
    }

    pub fn writes(&self) -> Vec<WriteOp> {
        self.writes.lock().expect("write journal lock").clone()
    }

    fn check_available(&self, collection: &str) -> Result<(), InfraError> {
        if guard(&self.failing, "failing set")?.contains(collection) {
            return Err(InfraError::Transport(format!(
                "simulated outage for {collection}"
            )));
        }
        Ok(())
    }

    fn allocate_id(&self) -> Result<String, InfraError> {
        let mut next = guard(&self.next_id, "id sequence")?;
        *next += 1;
        Ok(format!("rec-{}", *next))
    }

    fn apply_completed_patch(
        &self,
        collection: &str,
        record_id: &str,
        value: bool,
    ) -> Result<(), InfraError> {
        match collection {
            "timeblock" => {
                let mut blocks = guard(&self.blocks, "block store")?;
                if let Some(block) = blocks.iter_mut().find(|block| block.id == record_id) {
                    block.completed = value;
                }
            }
            "meeting" => {
                let mut meetings = guard(&self.meetings, "meeting store")?;
                if let Some(meeting) = meetings
                    .iter_mut()
                    .find(|meeting| meeting.id.to_string() == record_id)
                {
                    meeting.completed = Some(value);
                }
            }
            "todo" => {
                let mut todos = guard(&self.todos, "todo store")?;
                if let Some(todo) = todos.iter_mut().find(|todo| todo.id == record_id) {
                    todo.completed = value;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list_dated_blocks(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeBlockRecord>, InfraError> {
        self.check_available("timeblock")?;
        Ok(guard(&self.blocks, "block store")?
            .iter()
            .filter(|block| {
                block.owner_id == owner_id
                    && !block.is_recurring
                    && block.date >= from
                    && block.date <= to
            })
            .cloned()
            .collect())
    }

    async fn list_recurring_blocks(
        &self,
        owner_id: &str,
    ) -> Result<Vec<TimeBlockRecord>, InfraError> {
        self.check_available("timeblock")?;
        Ok(guard(&self.blocks, "block store")?
            .iter()
            .filter(|block| block.owner_id == owner_id && block.is_recurring)
            .cloned()
            .collect())
    }

    async fn list_meetings(&self, user_id: &str) -> Result<Vec<MeetingRecord>, InfraError> {
        self.check_available("meeting")?;
        Ok(guard(&self.meetings, "meeting store")?
            .iter()
            .filter(|meeting| meeting.is_accessible_by(user_id))
            .cloned()
            .collect())
    }

    async fn list_todos(&self, owner_id: &str) -> Result<Vec<TodoRecord>, InfraError> {
        self.check_available("todo")?;
        Ok(guard(&self.todos, "todo store")?
            .iter()
            .filter(|todo| todo.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_skips(&self, owner_id: &str) -> Result<Vec<SkipRecord>, InfraError> {
        self.check_available(SKIP_COLLECTION)?;
        Ok(guard(&self.skips, "skip store")?
            .iter()
            .filter(|skip| skip.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn patch_record(
        &self,
        collection: &str,
        record_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), InfraError> {
        self.check_available(collection)?;
        if field == "completed" {
            if let Some(flag) = value.as_bool() {
                self.apply_completed_patch(collection, record_id, flag)?;
            }
        }
        guard(&self.writes, "write journal")?.push(WriteOp::Patch {
            collection: collection.to_string(),
            record_id: record_id.to_string(),
            field: field.to_string(),
            value,
        });
        Ok(())
    }

    async fn create_record(
        &self,
        collection: &str,
        body: serde_json::Value,
    ) -> Result<String, InfraError> {
        self.check_available(collection)?;
        let id = self.allocate_id()?;
        if collection == SKIP_COLLECTION {
            let skip = SkipRecord {
                id: id.clone(),
                owner_id: body
                    .get("owner_id")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                task_id: body
                    .get("task_id")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                reason: body
                    .get("reason")
                    .and_then(serde_json::Value::as_str)
                    .map(ToOwned::to_owned),
            };
            guard(&self.skips, "skip store")?.push(skip);
        }
        guard(&self.writes, "write journal")?.push(WriteOp::Create {
            collection: collection.to_string(),
            body,
        });
        Ok(id)
    }

    async fn delete_record(&self, collection: &str, record_id: &str) -> Result<(), InfraError> {
        self.check_available(collection)?;
        match collection {
            "timeblock" => {
                guard(&self.blocks, "block store")?.retain(|block| block.id != record_id)
            }
            "meeting" => guard(&self.meetings, "meeting store")?
                .retain(|meeting| meeting.id.to_string() != record_id),
            "todo" => guard(&self.todos, "todo store")?.retain(|todo| todo.id != record_id),
            SKIP_COLLECTION => {
                guard(&self.skips, "skip store")?.retain(|skip| skip.id != record_id)
            }
            _ => {}
        }
        guard(&self.writes, "write journal")?.push(WriteOp::Delete {
            collection: collection.to_string(),
            record_id: record_id.to_string(),
        });
        Ok(())
    }

    async fn delete_skips_for_task(
        &self,
        owner_id: &str,
        task_id: &str,
    ) -> Result<(), InfraError> {
        self.check_available(SKIP_COLLECTION)?;
        let removed: Vec<String> = {
            let mut skips = guard(&self.skips, "skip store")?;
            let matching: Vec<String> = skips
                .iter()
                .filter(|skip| skip.owner_id == owner_id && skip.task_id == task_id)
                .map(|skip| skip.id.clone())
                .collect();
            skips.retain(|skip| !(skip.owner_id == owner_id && skip.task_id == task_id));
            matching
        };
        let mut writes = guard(&self.writes, "write journal")?;
        for record_id in removed {
            writes.push(WriteOp::Delete {
                collection: SKIP_COLLECTION.to_string(),
                record_id,
            });
        }
        Ok(())
    }
}
