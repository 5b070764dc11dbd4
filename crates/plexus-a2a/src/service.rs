//! The A2A task engine (spec §4.7): task lifecycle, scoped idempotency,
//! ordered event log, and push-config management. Wired against
//! `plexus-storage::a2a_repo::A2aRepository` for durability and
//! `crate::bus::EventBus` for live subscriber fan-out.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::broadcast;

use plexus_common::new_request_id;
use plexus_storage::a2a_repo::{A2aRepository, NewTask, TaskStatusUpdate};

use crate::encryption::EncryptionKeySource;
use crate::error::A2aError;
use crate::idempotency::scoped_key;
use crate::push::{PushDeliveryService, PushJob};
use crate::state_machine::{is_valid_transition, TaskState};
use crate::types::{A2aPushConfig, A2aTask, A2aTaskEvent, PushAuthentication, Scope};
use crate::EventBus;

const DEFAULT_IDEMPOTENCY_RETENTION_HOURS: i64 = 24;
const SWEEP_MIN_INTERVAL_SECS: i64 = 10 * 60;
const MAX_EVENT_REPLAY_LIMIT: u64 = 1000;

pub struct A2aServiceConfig {
    pub idempotency_retention_hours: i64,
}

impl Default for A2aServiceConfig {
    fn default() -> Self {
        Self {
            idempotency_retention_hours: DEFAULT_IDEMPOTENCY_RETENTION_HOURS,
        }
    }
}

pub struct A2aService {
    repo: A2aRepository,
    bus: EventBus,
    push: Option<Arc<PushDeliveryService>>,
    encryption: EncryptionKeySource,
    config: A2aServiceConfig,
    last_swept_epoch_secs: AtomicI64,
}

impl A2aService {
    pub fn new(
        repo: A2aRepository,
        push: Option<Arc<PushDeliveryService>>,
        encryption: EncryptionKeySource,
        config: A2aServiceConfig,
    ) -> Self {
        Self {
            repo,
            bus: EventBus::new(),
            push,
            encryption,
            config,
            last_swept_epoch_secs: AtomicI64::new(0),
        }
    }

    /// `sendMessage` (spec §4.7 "Idempotency"): creates a task, or replays
    /// an existing one when `idempotency_key` scoped-matches a prior call
    /// with a byte-equal payload within the retention window.
    pub async fn submit_task(
        &self,
        scope: &Scope,
        agent_id: &str,
        context_id: Option<String>,
        request_message: Value,
        metadata: Value,
        idempotency_key: Option<&str>,
    ) -> Result<A2aTask, A2aError> {
        self.maybe_sweep().await;

        let scoped = idempotency_key.map(|raw| scoped_key(&scope.owner_key, raw));
        if let Some(scoped) = &scoped {
            if let Some(existing) = self.repo.find_by_idempotency_key(&scope.owner_key, scoped).await? {
                let retention_cutoff = OffsetDateTime::now_utc()
                    - TimeDuration::hours(self.config.idempotency_retention_hours);
                if existing.created_at >= retention_cutoff {
                    if existing.request_message == request_message {
                        return Ok(existing.into());
                    }
                    return Err(A2aError::IdempotencyConflict);
                }
                // Outside the retention window: clear the stale key and
                // fall through to create a fresh task (spec §4.7).
                self.repo.clear_idempotency_key(&existing.id).await?;
            }
        }

        let task_id = new_request_id();
        let row = self
            .repo
            .insert_task(NewTask {
                id: task_id.clone(),
                context_id: context_id.unwrap_or_else(new_request_id),
                owner_key: scope.owner_key.clone(),
                owner_attribution: scope.owner_attribution.clone(),
                agent_id: agent_id.to_string(),
                request_message,
                metadata,
                idempotency_key: scoped,
            })
            .await?;

        self.record_event(
            &task_id,
            "task-status-update",
            serde_json::json!({
                "state": TaskState::Submitted.as_str(),
                "previousState": Value::Null,
                "timestamp": row.status_timestamp.unix_timestamp(),
            }),
        )
        .await?;

        Ok(row.into())
    }

    pub async fn get_task(&self, scope: &Scope, task_id: &str) -> Result<A2aTask, A2aError> {
        let row = self
            .repo
            .find_by_id(task_id)
            .await?
            .ok_or(A2aError::TaskNotFound)?;
        // Owner mismatch reports `TaskNotFound`, not `Forbidden`, to avoid
        // existence leaks (spec §4.7 "Authorization scope").
        if !scope.owns(&row.owner_key) {
            return Err(A2aError::TaskNotFound);
        }
        Ok(row.into())
    }

    pub async fn list_tasks(&self, scope: &Scope) -> Result<Vec<A2aTask>, A2aError> {
        let rows = self.repo.list_by_owner(scope.owner_filter()).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Validates the edge, stamps the appropriate timestamp, and records a
    /// `task-status-update` event (spec §4.7 "Lifecycle").
    pub async fn transition_task(
        &self,
        scope: &Scope,
        task_id: &str,
        to: TaskState,
        message: Option<Value>,
        reason: Option<String>,
    ) -> Result<A2aTask, A2aError> {
        let current = self.get_task(scope, task_id).await?;
        if !is_valid_transition(current.status_state, to) {
            return Err(A2aError::InvalidTaskState {
                from: current.status_state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let update = TaskStatusUpdate {
            state: to.as_str().to_string(),
            timestamp: now,
            message: message.clone(),
            started_at: (to == TaskState::Working && current.started_at.is_none()).then_some(now),
            completed_at: to.is_terminal().then_some(now),
            canceled_at: (to == TaskState::Canceled).then_some(now),
            error_code: current.error_code.clone(),
            error_message: current.error_message.clone(),
        };
        let row = self.repo.update_status(task_id, update).await?;

        self.record_event(
            task_id,
            "task-status-update",
            serde_json::json!({
                "state": to.as_str(),
                "previousState": current.status_state.as_str(),
                "timestamp": now.unix_timestamp(),
                "message": message,
                "reason": reason,
            }),
        )
        .await?;

        Ok(row.into())
    }

    pub async fn cancel_task(&self, scope: &Scope, task_id: &str) -> Result<A2aTask, A2aError> {
        self.transition_task(scope, task_id, TaskState::Canceled, None, None).await
    }

    /// Replays events with `sequence > after_sequence`, then the caller
    /// switches to [`Self::subscribe`] for live delivery (spec §4.7 "Event
    /// subscription").
    pub async fn list_events(
        &self,
        task_id: &str,
        after_sequence: i64,
        limit: u64,
    ) -> Result<Vec<A2aTaskEvent>, A2aError> {
        let rows = self
            .repo
            .list_events(task_id, after_sequence, limit.min(MAX_EVENT_REPLAY_LIMIT))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| A2aTaskEvent::from_row(task_id, row))
            .collect())
    }

    pub fn subscribe(&self, task_id: &str) -> broadcast::Receiver<A2aTaskEvent> {
        self.bus.subscribe(task_id)
    }

    /// Appends an event (durable, sequenced) then publishes it to live
    /// subscribers and enqueues push deliveries. Insertion order matters:
    /// a subscriber that joins between the durable write and the publish
    /// will simply replay the event via `list_events` on reconnect.
    async fn record_event(&self, task_id: &str, event_type: &str, payload: Value) -> Result<i64, A2aError> {
        let sequence = self.repo.append_event(task_id, event_type, payload.clone()).await?;
        let event = A2aTaskEvent {
            task_id: task_id.to_string(),
            sequence,
            event_type: event_type.to_string(),
            payload: payload.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.bus.publish(event.clone());
        self.enqueue_push(&event).await;
        Ok(sequence)
    }

    async fn enqueue_push(&self, event: &A2aTaskEvent) {
        let Some(push) = &self.push else { return };
        let Ok(configs) = self.repo.list_push_configs(&event.task_id, true).await else {
            return;
        };
        for config in configs {
            let authentication = self.decrypt_authentication(&config.authentication).ok().flatten();
            push.enqueue(PushJob {
                config_id: config.config_id,
                task_id: event.task_id.clone(),
                event_type: event.event_type.clone(),
                sequence: event.sequence,
                created_at: event.created_at,
                payload: event.payload.clone(),
                metadata: config.metadata,
                endpoint: config.endpoint,
                authentication,
            });
        }
    }

    /// Clears expired idempotency keys at most once every ten minutes
    /// (spec §4.7 "A lazy sweeper runs at most every 10 minutes").
    async fn maybe_sweep(&self) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let last = self.last_swept_epoch_secs.load(Ordering::Relaxed);
        if now - last < SWEEP_MIN_INTERVAL_SECS {
            return;
        }
        if self
            .last_swept_epoch_secs
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let cutoff = OffsetDateTime::now_utc() - TimeDuration::hours(self.config.idempotency_retention_hours);
        match self.repo.sweep_expired_idempotency_keys(cutoff).await {
            Ok(count) if count > 0 => {
                tracing::info!(event = "a2a_idempotency_sweep", cleared = count);
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(event = "a2a_idempotency_sweep_failed", %error),
        }
    }

    pub async fn upsert_push_config(
        &self,
        scope: &Scope,
        task_id: &str,
        config_id: &str,
        endpoint: &str,
        authentication: Option<PushAuthentication>,
        metadata: Value,
        enabled: bool,
    ) -> Result<(), A2aError> {
        self.get_task(scope, task_id).await?;
        let stored = match &authentication {
            None => serde_json::to_string(&PushAuthentication::None).unwrap_or_default(),
            Some(auth) => {
                if !self.encryption.is_available() {
                    return Err(A2aError::NoEncryptionKey);
                }
                let plaintext = serde_json::to_string(auth).unwrap_or_default();
                self.encryption
                    .encrypt(&plaintext)
                    .map_err(|_| A2aError::NoEncryptionKey)?
            }
        };
        self.repo
            .upsert_push_config(task_id, &scope.owner_key, config_id, endpoint, &stored, metadata, enabled)
            .await?;
        Ok(())
    }

    pub async fn list_push_configs(
        &self,
        scope: &Scope,
        task_id: &str,
    ) -> Result<Vec<A2aPushConfig>, A2aError> {
        self.get_task(scope, task_id).await?;
        let rows = self.repo.list_push_configs(task_id, false).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let authentication = self.decrypt_authentication(&row.authentication).ok().flatten();
                A2aPushConfig::from_row(task_id, row, authentication)
            })
            .collect())
    }

    pub async fn delete_push_config(&self, scope: &Scope, task_id: &str, config_id: &str) -> Result<(), A2aError> {
        self.get_task(scope, task_id).await?;
        self.repo.delete_push_config(task_id, config_id).await?;
        Ok(())
    }

    fn decrypt_authentication(&self, stored: &str) -> Result<Option<PushAuthentication>, A2aError> {
        let plaintext = self
            .encryption
            .decrypt(stored)
            .map_err(|_| A2aError::NoEncryptionKey)?;
        let parsed: PushAuthentication = match serde_json::from_str(&plaintext) {
            Ok(auth) => auth,
            Err(_) => return Ok(None),
        };
        Ok(Some(parsed))
    }
}
