//! Domain types for the A2A task engine (spec §3 `A2ATask`, `A2ATaskEvent`,
//! `A2APushConfig`). `plexus-storage::a2a_repo` owns the row shapes; these
//! are the service-facing views built from them.

use serde_json::Value;
use time::OffsetDateTime;

use plexus_storage::a2a_repo::{EventRow, PushConfigRow, TaskRow};

use crate::state_machine::TaskState;

/// The identity under which an A2A resource is owned (spec GLOSSARY
/// "Scope"): either a key name (+ optional attribution) or admin, which can
/// read across owners.
#[derive(Debug, Clone)]
pub struct Scope {
    pub owner_key: String,
    pub owner_attribution: Option<String>,
    pub is_admin: bool,
}

impl Scope {
    pub fn user(owner_key: impl Into<String>, owner_attribution: Option<String>) -> Self {
        Self {
            owner_key: owner_key.into(),
            owner_attribution,
            is_admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            owner_key: String::new(),
            owner_attribution: None,
            is_admin: true,
        }
    }

    /// Every A2A query filters by `owner_key` unless the scope is admin
    /// (spec §4.7 "Authorization scope").
    pub fn owner_filter(&self) -> Option<&str> {
        if self.is_admin {
            None
        } else {
            Some(&self.owner_key)
        }
    }

    pub fn owns(&self, owner_key: &str) -> bool {
        self.is_admin || self.owner_key == owner_key
    }
}

#[derive(Debug, Clone)]
pub struct A2aTask {
    pub id: String,
    pub context_id: String,
    pub owner_key: String,
    pub owner_attribution: Option<String>,
    pub agent_id: String,
    pub status_state: TaskState,
    pub status_timestamp: OffsetDateTime,
    pub status_message: Option<Value>,
    pub artifacts: Value,
    pub metadata: Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub submitted_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub canceled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<TaskRow> for A2aTask {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            context_id: row.context_id,
            owner_key: row.owner_key,
            owner_attribution: row.owner_attribution,
            agent_id: row.agent_id,
            status_state: TaskState::parse(&row.status_state).unwrap_or(TaskState::Submitted),
            status_timestamp: row.status_timestamp,
            status_message: row.status_message,
            artifacts: row.artifacts,
            metadata: row.metadata,
            error_code: row.error_code,
            error_message: row.error_message,
            submitted_at: row.submitted_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            canceled_at: row.canceled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct A2aTaskEvent {
    pub task_id: String,
    pub sequence: i64,
    pub event_type: String,
    pub payload: Value,
    pub created_at: OffsetDateTime,
}

impl A2aTaskEvent {
    pub fn from_row(task_id: &str, row: EventRow) -> Self {
        Self {
            task_id: task_id.to_string(),
            sequence: row.sequence,
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

/// Authentication mode attached to a push config, as decrypted plaintext
/// JSON (spec §4.7 "Authentication modes").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PushAuthentication {
    None,
    Bearer { token: String },
    Headers { headers: std::collections::BTreeMap<String, String> },
    HmacSha256 { secret: String },
}

#[derive(Debug, Clone)]
pub struct A2aPushConfig {
    pub task_id: String,
    pub config_id: String,
    pub owner_key: String,
    pub endpoint: String,
    pub authentication: Option<PushAuthentication>,
    pub metadata: Value,
    pub enabled: bool,
}

impl A2aPushConfig {
    pub fn from_row(task_id: &str, row: PushConfigRow, authentication: Option<PushAuthentication>) -> Self {
        Self {
            task_id: task_id.to_string(),
            config_id: row.config_id,
            owner_key: row.owner_key,
            endpoint: row.endpoint,
            authentication,
            metadata: row.metadata,
            enabled: row.enabled,
        }
    }
}
