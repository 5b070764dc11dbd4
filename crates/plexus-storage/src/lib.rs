//! SQLite-backed persistence for everything the gateway's core needs to
//! survive a restart (spec §3, §5, §6): usage metering, provider cooldowns,
//! and the A2A task/event/push-config tables. Entities are SeaORM 2.0
//! models synced at startup (`db::connect_and_sync`) rather than driven
//! through a migrations directory.

pub mod a2a_repo;
pub mod cooldown_store;
pub mod db;
pub mod entities;
pub mod error;
pub mod usage;

pub use a2a_repo::A2aRepository;
pub use cooldown_store::SeaOrmCooldownStore;
pub use error::{StorageError, StorageResult};
pub use usage::{UsageAggregate, UsageAggregateFilter, UsageRecord, UsageRepository};
