use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Schema};

use crate::entities;

/// Connects and runs entity-first schema sync (SeaORM 2.0) — there is no
/// migrations directory; `sync` diffs the registered entities against the
/// live schema and applies additive changes. `connect_timeout_ms` bounds
/// how long the initial connect (and the A2A repository's queries) may
/// block, matching spec §6's `A2A_DB_TIMEOUT_MS`.
pub async fn connect_and_sync(dsn: &str, connect_timeout_ms: Option<u64>) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(dsn.to_string());
    if let Some(timeout_ms) = connect_timeout_ms {
        options.connect_timeout(Duration::from_millis(timeout_ms));
    }
    let db = Database::connect(options).await?;
    if db.get_database_backend() == DatabaseBackend::Sqlite {
        db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
        db.execute_unprepared("PRAGMA journal_mode = WAL").await?;
    }
    Schema::new(db.get_database_backend())
        .builder()
        .register(entities::RequestUsage)
        .register(entities::ProviderCooldowns)
        .register(entities::A2aTasks)
        .register(entities::A2aTaskEvents)
        .register(entities::A2aPushNotificationConfigs)
        .sync(&db)
        .await?;
    Ok(db)
}
