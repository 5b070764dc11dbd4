use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "provider_cooldowns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "provider_cooldown_key")]
    pub provider: String,
    #[sea_orm(unique_key = "provider_cooldown_key")]
    pub model: String,
    #[sea_orm(unique_key = "provider_cooldown_key")]
    pub account: String,
    pub expiry_epoch_ms: i64,
    pub updated_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
