//! Data access for the A2A task engine (spec §4.7, §6). Business rules
//! (valid state transitions, idempotency windows, push delivery) live in
//! `plexus-a2a`; this module only reads and writes rows.

use sea_orm::{ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde_json::Value;
use time::OffsetDateTime;

use crate::entities;
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub context_id: String,
    pub owner_key: String,
    pub owner_attribution: Option<String>,
    pub agent_id: String,
    pub status_state: String,
    pub status_timestamp: OffsetDateTime,
    pub status_message: Option<Value>,
    pub artifacts: Value,
    pub metadata: Value,
    pub idempotency_key: Option<String>,
    pub request_message: Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub submitted_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub canceled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<entities::a2a_tasks::Model> for TaskRow {
    fn from(m: entities::a2a_tasks::Model) -> Self {
        Self {
            id: m.id,
            context_id: m.context_id,
            owner_key: m.owner_key,
            owner_attribution: m.owner_attribution,
            agent_id: m.agent_id,
            status_state: m.status_state,
            status_timestamp: m.status_timestamp,
            status_message: m.status_message,
            artifacts: m.artifacts,
            metadata: m.metadata,
            idempotency_key: m.idempotency_key,
            request_message: m.request_message,
            error_code: m.error_code,
            error_message: m.error_message,
            submitted_at: m.submitted_at,
            started_at: m.started_at,
            completed_at: m.completed_at,
            canceled_at: m.canceled_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: String,
    pub context_id: String,
    pub owner_key: String,
    pub owner_attribution: Option<String>,
    pub agent_id: String,
    pub request_message: Value,
    pub metadata: Value,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TaskStatusUpdate {
    pub state: String,
    pub timestamp: OffsetDateTime,
    pub message: Option<Value>,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub canceled_at: Option<OffsetDateTime>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EventRow {
    pub sequence: i64,
    pub event_type: String,
    pub payload: Value,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct PushConfigRow {
    pub config_id: String,
    pub owner_key: String,
    pub endpoint: String,
    pub authentication: String,
    pub metadata: Value,
    pub enabled: bool,
}

#[derive(Clone)]
pub struct A2aRepository {
    db: DatabaseConnection,
}

const MAX_SEQUENCE_RETRIES: u32 = 5;

impl A2aRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert_task(&self, task: NewTask) -> StorageResult<TaskRow> {
        use entities::a2a_tasks::ActiveModel;

        let now = OffsetDateTime::now_utc();
        let active = ActiveModel {
            id: ActiveValue::Set(task.id),
            context_id: ActiveValue::Set(task.context_id),
            owner_key: ActiveValue::Set(task.owner_key),
            owner_attribution: ActiveValue::Set(task.owner_attribution),
            agent_id: ActiveValue::Set(task.agent_id),
            status_state: ActiveValue::Set("submitted".to_string()),
            status_timestamp: ActiveValue::Set(now),
            status_message: ActiveValue::Set(None),
            artifacts: ActiveValue::Set(Value::Array(Vec::new())),
            metadata: ActiveValue::Set(task.metadata),
            idempotency_key: ActiveValue::Set(task.idempotency_key),
            request_message: ActiveValue::Set(task.request_message),
            error_code: ActiveValue::Set(None),
            error_message: ActiveValue::Set(None),
            submitted_at: ActiveValue::Set(now),
            started_at: ActiveValue::Set(None),
            completed_at: ActiveValue::Set(None),
            canceled_at: ActiveValue::Set(None),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };
        let model = active.insert(&self.db).await?;
        Ok(model.into())
    }

    pub async fn find_by_id(&self, task_id: &str) -> StorageResult<Option<TaskRow>> {
        let model = entities::A2aTasks::find_by_id(task_id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    pub async fn find_by_idempotency_key(
        &self,
        owner_key: &str,
        scoped_key: &str,
    ) -> StorageResult<Option<TaskRow>> {
        use entities::a2a_tasks::Column;
        let model = entities::A2aTasks::find()
            .filter(Column::OwnerKey.eq(owner_key))
            .filter(Column::IdempotencyKey.eq(scoped_key))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    pub async fn list_by_owner(&self, owner_key: Option<&str>) -> StorageResult<Vec<TaskRow>> {
        use entities::a2a_tasks::Column;
        let mut query = entities::A2aTasks::find().order_by_desc(Column::CreatedAt);
        if let Some(owner_key) = owner_key {
            query = query.filter(Column::OwnerKey.eq(owner_key));
        }
        let rows = query.all(&self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn update_status(
        &self,
        task_id: &str,
        update: TaskStatusUpdate,
    ) -> StorageResult<TaskRow> {
        use entities::a2a_tasks::ActiveModel;

        let model = entities::A2aTasks::find_by_id(task_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| StorageError::Db(DbErr::RecordNotFound(task_id.to_string())))?;
        let mut active: ActiveModel = model.into();
        active.status_state = ActiveValue::Set(update.state);
        active.status_timestamp = ActiveValue::Set(update.timestamp);
        active.status_message = ActiveValue::Set(update.message);
        if update.started_at.is_some() {
            active.started_at = ActiveValue::Set(update.started_at);
        }
        if update.completed_at.is_some() {
            active.completed_at = ActiveValue::Set(update.completed_at);
        }
        if update.canceled_at.is_some() {
            active.canceled_at = ActiveValue::Set(update.canceled_at);
        }
        active.error_code = ActiveValue::Set(update.error_code);
        active.error_message = ActiveValue::Set(update.error_message);
        active.updated_at = ActiveValue::Set(OffsetDateTime::now_utc());
        let model = active.update(&self.db).await?;
        Ok(model.into())
    }

    pub async fn clear_idempotency_key(&self, task_id: &str) -> StorageResult<()> {
        use entities::a2a_tasks::ActiveModel;

        let Some(model) = entities::A2aTasks::find_by_id(task_id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(());
        };
        let mut active: ActiveModel = model.into();
        active.idempotency_key = ActiveValue::Set(None);
        active.update(&self.db).await?;
        Ok(())
    }

    /// Appends an event at `max(sequence) + 1`, retrying on a unique
    /// constraint violation up to [`MAX_SEQUENCE_RETRIES`] times (spec §4.7
    /// "Event sequencing").
    pub async fn append_event(
        &self,
        task_id: &str,
        event_type: &str,
        payload: Value,
    ) -> StorageResult<i64> {
        use entities::a2a_task_events::{ActiveModel, Column};

        for _ in 0..MAX_SEQUENCE_RETRIES {
            let max_sequence: Option<i64> = entities::A2aTaskEvents::find()
                .filter(Column::TaskId.eq(task_id))
                .order_by_desc(Column::Sequence)
                .one(&self.db)
                .await?
                .map(|m| m.sequence);
            let next_sequence = max_sequence.unwrap_or(0) + 1;

            let active = ActiveModel {
                id: ActiveValue::NotSet,
                task_id: ActiveValue::Set(task_id.to_string()),
                sequence: ActiveValue::Set(next_sequence),
                event_type: ActiveValue::Set(event_type.to_string()),
                payload: ActiveValue::Set(payload.clone()),
                created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            };
            match entities::A2aTaskEvents::insert(active).exec(&self.db).await {
                Ok(_) => return Ok(next_sequence),
                Err(DbErr::Query(_) | DbErr::Exec(_)) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(StorageError::Db(DbErr::Custom(format!(
            "exhausted {MAX_SEQUENCE_RETRIES} sequence retries for task {task_id}"
        ))))
    }

    pub async fn list_events(
        &self,
        task_id: &str,
        after_sequence: i64,
        limit: u64,
    ) -> StorageResult<Vec<EventRow>> {
        use entities::a2a_task_events::Column;
        use sea_orm::QuerySelect;

        let rows = entities::A2aTaskEvents::find()
            .filter(Column::TaskId.eq(task_id))
            .filter(Column::Sequence.gt(after_sequence))
            .order_by_asc(Column::Sequence)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| EventRow {
                sequence: m.sequence,
                event_type: m.event_type,
                payload: m.payload,
                created_at: m.created_at,
            })
            .collect())
    }

    pub async fn upsert_push_config(
        &self,
        task_id: &str,
        owner_key: &str,
        config_id: &str,
        endpoint: &str,
        authentication: &str,
        metadata: Value,
        enabled: bool,
    ) -> StorageResult<()> {
        use entities::a2a_push_notification_configs::{ActiveModel, Column};

        let existing = entities::A2aPushNotificationConfigs::find()
            .filter(Column::TaskId.eq(task_id))
            .filter(Column::ConfigId.eq(config_id))
            .one(&self.db)
            .await?;
        let now = OffsetDateTime::now_utc();
        match existing {
            Some(model) => {
                let mut active: ActiveModel = model.into();
                active.endpoint = ActiveValue::Set(endpoint.to_string());
                active.authentication = ActiveValue::Set(authentication.to_string());
                active.metadata = ActiveValue::Set(metadata);
                active.enabled = ActiveValue::Set(enabled);
                active.updated_at = ActiveValue::Set(now);
                active.update(&self.db).await?;
            }
            None => {
                let active = ActiveModel {
                    id: ActiveValue::NotSet,
                    task_id: ActiveValue::Set(task_id.to_string()),
                    config_id: ActiveValue::Set(config_id.to_string()),
                    owner_key: ActiveValue::Set(owner_key.to_string()),
                    endpoint: ActiveValue::Set(endpoint.to_string()),
                    authentication: ActiveValue::Set(authentication.to_string()),
                    metadata: ActiveValue::Set(metadata),
                    enabled: ActiveValue::Set(enabled),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                entities::A2aPushNotificationConfigs::insert(active)
                    .exec(&self.db)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn list_push_configs(
        &self,
        task_id: &str,
        enabled_only: bool,
    ) -> StorageResult<Vec<PushConfigRow>> {
        use entities::a2a_push_notification_configs::Column;

        let mut query =
            entities::A2aPushNotificationConfigs::find().filter(Column::TaskId.eq(task_id));
        if enabled_only {
            query = query.filter(Column::Enabled.eq(true));
        }
        let rows = query.all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|m| PushConfigRow {
                config_id: m.config_id,
                owner_key: m.owner_key,
                endpoint: m.endpoint,
                authentication: m.authentication,
                metadata: m.metadata,
                enabled: m.enabled,
            })
            .collect())
    }

    pub async fn delete_push_config(&self, task_id: &str, config_id: &str) -> StorageResult<()> {
        use entities::a2a_push_notification_configs::Column;

        entities::A2aPushNotificationConfigs::delete_many()
            .filter(Column::TaskId.eq(task_id))
            .filter(Column::ConfigId.eq(config_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Clears idempotency keys on rows older than the retention window
    /// (spec §4.7 "a lazy sweeper runs at most every 10 minutes").
    pub async fn sweep_expired_idempotency_keys(
        &self,
        older_than: OffsetDateTime,
    ) -> StorageResult<u64> {
        use entities::a2a_tasks::{ActiveModel, Column};

        let rows = entities::A2aTasks::find()
            .filter(Column::IdempotencyKey.is_not_null())
            .filter(Column::CreatedAt.lt(older_than))
            .all(&self.db)
            .await?;
        let count = rows.len() as u64;
        for model in rows {
            let mut active: ActiveModel = model.into();
            active.idempotency_key = ActiveValue::Set(None);
            active.update(&self.db).await?;
        }
        Ok(count)
    }
}
