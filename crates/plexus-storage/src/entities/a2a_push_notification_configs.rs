use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "a2a_push_notification_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "a2a_push_config_key", belongs_to, from = "task_id", to = "id", on_delete = "Cascade")]
    pub task_id: String,
    #[sea_orm(unique_key = "a2a_push_config_key")]
    pub config_id: String,
    pub owner_key: String,
    pub endpoint: String,
    /// `enc:v1:<iv-b64>:<tag-b64>:<ct-b64>`, or a plain JSON blob for rows
    /// written before encryption was configured.
    pub authentication: String,
    pub metadata: Json,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub task: HasOne<super::a2a_tasks::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
