use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "a2a_task_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "a2a_task_event_sequence", belongs_to, from = "task_id", to = "id", on_delete = "Cascade")]
    pub task_id: String,
    #[sea_orm(unique_key = "a2a_task_event_sequence")]
    pub sequence: i64,
    pub event_type: String,
    pub payload: Json,
    pub created_at: OffsetDateTime,
    pub task: HasOne<super::a2a_tasks::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
