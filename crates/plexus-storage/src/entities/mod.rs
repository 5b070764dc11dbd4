pub mod a2a_push_notification_configs;
pub mod a2a_task_events;
pub mod a2a_tasks;
pub mod provider_cooldowns;
pub mod request_usage;

pub use a2a_push_notification_configs::Entity as A2aPushNotificationConfigs;
pub use a2a_task_events::Entity as A2aTaskEvents;
pub use a2a_tasks::Entity as A2aTasks;
pub use provider_cooldowns::Entity as ProviderCooldowns;
pub use request_usage::Entity as RequestUsage;
