//! `CooldownStore` backed by the `provider_cooldowns` table (spec §4.3, §6).

use async_trait::async_trait;
use plexus_router_core::{CooldownKey, CooldownRow, CooldownStore};
use sea_orm::{ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use time::OffsetDateTime;

use crate::entities;

pub struct SeaOrmCooldownStore {
    db: DatabaseConnection,
}

impl SeaOrmCooldownStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CooldownStore for SeaOrmCooldownStore {
    async fn upsert(&self, key: &CooldownKey, expiry_epoch_ms: i64) {
        use entities::provider_cooldowns::{ActiveModel, Column};

        let existing = entities::ProviderCooldowns::find()
            .filter(Column::Provider.eq(key.provider.as_str()))
            .filter(Column::Model.eq(key.model.as_str()))
            .filter(Column::Account.eq(key.account.as_str()))
            .one(&self.db)
            .await;
        let Ok(existing) = existing else {
            tracing::warn!(event = "cooldown_store_upsert_read_failed");
            return;
        };

        let now = OffsetDateTime::now_utc();
        let result = match existing {
            Some(model) => {
                let mut active: ActiveModel = model.into();
                active.expiry_epoch_ms = ActiveValue::Set(expiry_epoch_ms);
                active.updated_at = ActiveValue::Set(now);
                entities::ProviderCooldowns::update(active)
                    .exec(&self.db)
                    .await
                    .map(|_| ())
            }
            None => {
                let active = ActiveModel {
                    id: ActiveValue::NotSet,
                    provider: ActiveValue::Set(key.provider.clone()),
                    model: ActiveValue::Set(key.model.clone()),
                    account: ActiveValue::Set(key.account.clone()),
                    expiry_epoch_ms: ActiveValue::Set(expiry_epoch_ms),
                    updated_at: ActiveValue::Set(now),
                };
                entities::ProviderCooldowns::insert(active)
                    .exec(&self.db)
                    .await
                    .map(|_| ())
            }
        };
        if let Err(error) = result {
            tracing::warn!(event = "cooldown_store_upsert_failed", %error);
        }
    }

    async fn delete(&self, key: &CooldownKey) {
        use entities::provider_cooldowns::Column;

        let result = entities::ProviderCooldowns::delete_many()
            .filter(Column::Provider.eq(key.provider.as_str()))
            .filter(Column::Model.eq(key.model.as_str()))
            .filter(Column::Account.eq(key.account.as_str()))
            .exec(&self.db)
            .await;
        if let Err(error) = result {
            tracing::warn!(event = "cooldown_store_delete_failed", %error);
        }
    }

    async fn load_all(&self, now_epoch_ms: i64) -> Vec<(CooldownKey, CooldownRow)> {
        use entities::provider_cooldowns::Column;

        let rows = entities::ProviderCooldowns::find()
            .filter(Column::ExpiryEpochMs.gt(now_epoch_ms))
            .all(&self.db)
            .await
            .unwrap_or_default();
        rows.into_iter()
            .map(|row| {
                let key = CooldownKey::new(
                    row.provider,
                    row.model,
                    if row.account.is_empty() {
                        None
                    } else {
                        Some(row.account.as_str())
                    },
                );
                (
                    key,
                    CooldownRow {
                        expiry_epoch_ms: row.expiry_epoch_ms,
                    },
                )
            })
            .collect()
    }
}
