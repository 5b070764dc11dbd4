use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "a2a_tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: String,
    pub context_id: String,
    pub owner_key: String,
    pub owner_attribution: Option<String>,
    pub agent_id: String,
    pub status_state: String,
    pub status_timestamp: OffsetDateTime,
    pub status_message: Option<Json>,
    pub artifacts: Json,
    pub metadata: Json,
    #[sea_orm(unique_key = "a2a_task_idempotency")]
    pub idempotency_key: Option<String>,
    pub request_message: Json,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub submitted_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub canceled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub events: HasMany<super::a2a_task_events::Entity>,
    #[sea_orm(has_many)]
    pub push_configs: HasMany<super::a2a_push_notification_configs::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
