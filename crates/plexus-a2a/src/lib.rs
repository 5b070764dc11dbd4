//! The A2A (agent-to-agent) task-orchestration engine (spec §4.7): task
//! lifecycle state machine, ordered per-task event log with replay, scoped
//! idempotency, encrypted push-notification configs, and an SSRF-safe push
//! delivery worker.

pub mod bus;
pub mod encryption;
pub mod error;
pub mod idempotency;
pub mod push;
pub mod service;
pub mod state_machine;
pub mod types;

pub use bus::EventBus;
pub use error::A2aError;
pub use push::{validate_endpoint, EndpointError, PushDeliveryConfig, PushDeliveryService, PushJob};
pub use service::{A2aService, A2aServiceConfig};
pub use state_machine::{is_valid_transition, TaskState};
pub use types::{A2aPushConfig, A2aTask, A2aTaskEvent, PushAuthentication, Scope};

#[cfg(test)]
mod integration_tests {
    use serde_json::json;

    use plexus_storage::a2a_repo::A2aRepository;
    use plexus_storage::db::connect_and_sync;

    use super::*;

    async fn service() -> A2aService {
        let db = connect_and_sync("sqlite::memory:").await.unwrap();
        A2aService::new(
            A2aRepository::new(db),
            None,
            encryption::EncryptionKeySource::resolve(None, Some("test-admin-key")),
            A2aServiceConfig::default(),
        )
    }

    #[tokio::test]
    async fn submit_task_assigns_sequence_one_to_the_initial_event() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({"m": "hi"}), json!({}), None)
            .await
            .unwrap();
        let events = svc.list_events(&task.id, 0, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 1);
    }

    #[tokio::test]
    async fn idempotent_send_message_returns_the_same_task_id() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let body = json!({"m": "hi"});
        let first = svc
            .submit_task(&scope, "agent-1", None, body.clone(), json!({}), Some("k1"))
            .await
            .unwrap();
        let second = svc
            .submit_task(&scope, "agent-1", None, body, json!({}), Some("k1"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn idempotency_key_reuse_with_different_payload_conflicts() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        svc.submit_task(&scope, "agent-1", None, json!({"m": "a"}), json!({}), Some("k1"))
            .await
            .unwrap();
        let err = svc
            .submit_task(&scope, "agent-1", None, json!({"m": "b"}), json!({}), Some("k1"))
            .await
            .unwrap_err();
        assert!(matches!(err, A2aError::IdempotencyConflict));
    }

    #[tokio::test]
    async fn idempotency_key_is_scoped_per_owner() {
        let svc = service().await;
        let a = Scope::user("tenant-a", None);
        let b = Scope::user("tenant-b", None);
        let body = json!({"m": "hi"});
        let task_a = svc
            .submit_task(&a, "agent-1", None, body.clone(), json!({}), Some("same-key"))
            .await
            .unwrap();
        let task_b = svc
            .submit_task(&b, "agent-1", None, body, json!({}), Some("same-key"))
            .await
            .unwrap();
        assert_ne!(task_a.id, task_b.id);
    }

    #[tokio::test]
    async fn cross_tenant_read_reports_not_found_not_forbidden() {
        let svc = service().await;
        let owner = Scope::user("tenant-a", None);
        let other = Scope::user("tenant-b", None);
        let task = svc
            .submit_task(&owner, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        let err = svc.get_task(&other, &task.id).await.unwrap_err();
        assert!(matches!(err, A2aError::TaskNotFound));
    }

    #[tokio::test]
    async fn admin_scope_reads_any_owners_task() {
        let svc = service().await;
        let owner = Scope::user("tenant-a", None);
        let admin = Scope::admin();
        let task = svc
            .submit_task(&owner, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        let fetched = svc.get_task(&admin, &task.id).await.unwrap();
        assert_eq!(fetched.id, task.id);
    }

    #[tokio::test]
    async fn transition_to_working_then_completed_succeeds_and_stamps_timestamps() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        let working = svc
            .transition_task(&scope, &task.id, TaskState::Working, None, None)
            .await
            .unwrap();
        assert!(working.started_at.is_some());
        let completed = svc
            .transition_task(&scope, &task.id, TaskState::Completed, None, None)
            .await
            .unwrap();
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn transition_from_terminal_state_fails() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        svc.transition_task(&scope, &task.id, TaskState::Completed, None, None)
            .await
            .unwrap();
        let err = svc
            .transition_task(&scope, &task.id, TaskState::Working, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, A2aError::InvalidTaskState { .. }));
    }

    #[tokio::test]
    async fn event_sequence_is_dense_and_strictly_increasing() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        svc.transition_task(&scope, &task.id, TaskState::Working, None, None)
            .await
            .unwrap();
        svc.transition_task(&scope, &task.id, TaskState::Completed, None, None)
            .await
            .unwrap();
        let events = svc.list_events(&task.id, 0, 10).await.unwrap();
        let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn list_events_after_sequence_replays_only_the_remainder() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        svc.transition_task(&scope, &task.id, TaskState::Working, None, None)
            .await
            .unwrap();
        svc.transition_task(&scope, &task.id, TaskState::Completed, None, None)
            .await
            .unwrap();
        let replay = svc.list_events(&task.id, 1, 10).await.unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].sequence, 2);
    }

    #[tokio::test]
    async fn push_config_without_encryption_key_refuses() {
        let db = connect_and_sync("sqlite::memory:").await.unwrap();
        let svc = A2aService::new(
            A2aRepository::new(db),
            None,
            encryption::EncryptionKeySource::resolve(None, None),
            A2aServiceConfig::default(),
        );
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        let err = svc
            .upsert_push_config(
                &scope,
                &task.id,
                "cfg-1",
                "https://example.com/hook",
                Some(PushAuthentication::Bearer { token: "t".to_string() }),
                json!({}),
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, A2aError::NoEncryptionKey));
    }

    #[tokio::test]
    async fn push_config_round_trips_through_encryption() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        svc.upsert_push_config(
            &scope,
            &task.id,
            "cfg-1",
            "https://example.com/hook",
            Some(PushAuthentication::Bearer { token: "secret-token".to_string() }),
            json!({}),
            true,
        )
        .await
        .unwrap();

        let configs = svc.list_push_configs(&scope, &task.id).await.unwrap();
        assert_eq!(configs.len(), 1);
        match &configs[0].authentication {
            Some(PushAuthentication::Bearer { token }) => assert_eq!(token, "secret-token"),
            other => panic!("unexpected authentication: {other:?}"),
        }
    }

    #[tokio::test]
    async fn live_subscriber_receives_events_published_after_subscribing() {
        let svc = service().await;
        let scope = Scope::user("tenant-a", None);
        let task = svc
            .submit_task(&scope, "agent-1", None, json!({}), json!({}), None)
            .await
            .unwrap();
        let mut receiver = svc.subscribe(&task.id);
        svc.transition_task(&scope, &task.id, TaskState::Working, None, None)
            .await
            .unwrap();
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.sequence, 2);
    }
}
