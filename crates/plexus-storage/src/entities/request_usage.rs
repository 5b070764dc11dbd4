use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "request_usage")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub trace_id: String,
    pub at: OffsetDateTime,
    pub key_name: String,
    pub key_attribution: Option<String>,
    pub provider: String,
    pub model: String,
    pub canonical_model: String,
    pub api_type: String,
    pub streaming: bool,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cached_tokens: Option<i64>,
    pub reasoning_tokens: Option<i64>,
    pub cost_micros: Option<i64>,
    pub time_to_first_token_ms: Option<i64>,
    pub response_status: String,
    pub error_code: Option<String>,
    pub created_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
