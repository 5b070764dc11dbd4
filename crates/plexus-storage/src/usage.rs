//! Usage-record persistence (spec §6 `request_usage`) and the aggregate
//! query backing the admin `GET /admin/usage` endpoint (SPEC_FULL §4.9).

use sea_orm::{
    ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect,
};
use time::OffsetDateTime;

use crate::entities;
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct UsageRecord {
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
}

/// Builds the `response_status` string spec §7 names:
/// `"success"` | `"error"` | `"HTTP <code>"` | `"client_disconnect"`.
pub mod response_status {
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
    pub const CLIENT_DISCONNECT: &str = "client_disconnect";

    pub fn http(status: u16) -> String {
        format!("HTTP {status}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct UsageAggregateFilter {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
    pub key_name: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, FromQueryResult)]
pub struct UsageAggregate {
    pub matched_rows: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost_micros: i64,
}

#[derive(Clone)]
pub struct UsageRepository {
    db: DatabaseConnection,
}

impl UsageRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn record(&self, record: UsageRecord) -> StorageResult<()> {
        use entities::request_usage::ActiveModel;

        let now = OffsetDateTime::now_utc();
        let active = ActiveModel {
            id: ActiveValue::NotSet,
            trace_id: ActiveValue::Set(record.trace_id),
            at: ActiveValue::Set(record.at),
            key_name: ActiveValue::Set(record.key_name),
            key_attribution: ActiveValue::Set(record.key_attribution),
            provider: ActiveValue::Set(record.provider),
            model: ActiveValue::Set(record.model),
            canonical_model: ActiveValue::Set(record.canonical_model),
            api_type: ActiveValue::Set(record.api_type),
            streaming: ActiveValue::Set(record.streaming),
            input_tokens: ActiveValue::Set(record.input_tokens),
            output_tokens: ActiveValue::Set(record.output_tokens),
            cached_tokens: ActiveValue::Set(record.cached_tokens),
            reasoning_tokens: ActiveValue::Set(record.reasoning_tokens),
            cost_micros: ActiveValue::Set(record.cost_micros),
            time_to_first_token_ms: ActiveValue::Set(record.time_to_first_token_ms),
            response_status: ActiveValue::Set(record.response_status),
            error_code: ActiveValue::Set(record.error_code),
            created_at: ActiveValue::Set(now),
        };
        entities::RequestUsage::insert(active).exec(&self.db).await?;
        Ok(())
    }

    pub async fn aggregate(&self, filter: UsageAggregateFilter) -> StorageResult<UsageAggregate> {
        use entities::request_usage::Column;

        let mut query = entities::RequestUsage::find()
            .select_only()
            .column_as(Column::Id.count(), "matched_rows")
            .column_as(Column::InputTokens.sum(), "input_tokens")
            .column_as(Column::OutputTokens.sum(), "output_tokens")
            .column_as(Column::CostMicros.sum(), "total_cost_micros");

        if let Some(from) = filter.from {
            query = query.filter(Column::At.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(Column::At.lte(to));
        }
        if let Some(key_name) = filter.key_name.as_deref() {
            query = query.filter(Column::KeyName.eq(key_name));
        }
        if let Some(provider) = filter.provider.as_deref() {
            query = query.filter(Column::Provider.eq(provider));
        }

        let row = query
            .into_model::<UsageAggregate>()
            .one(&self.db)
            .await
            .map_err(StorageError::from)?;
        Ok(row.unwrap_or_default())
    }

    pub async fn recent(&self, limit: u64) -> StorageResult<Vec<UsageRecord>> {
        use entities::request_usage::Column;

        let rows = entities::RequestUsage::find()
            .order_by_desc(Column::At)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| UsageRecord {
                trace_id: m.trace_id,
                at: m.at,
                key_name: m.key_name,
                key_attribution: m.key_attribution,
                provider: m.provider,
                model: m.model,
                canonical_model: m.canonical_model,
                api_type: m.api_type,
                streaming: m.streaming,
                input_tokens: m.input_tokens,
                output_tokens: m.output_tokens,
                cached_tokens: m.cached_tokens,
                reasoning_tokens: m.reasoning_tokens,
                cost_micros: m.cost_micros,
                time_to_first_token_ms: m.time_to_first_token_ms,
                response_status: m.response_status,
                error_code: m.error_code,
            })
            .collect())
    }
}
