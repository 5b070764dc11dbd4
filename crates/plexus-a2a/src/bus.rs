//! Process-local pub/sub for live task-event delivery (spec §4.7 "Event
//! subscription", §5 "A2A in-memory bus"). Replay (events already
//! persisted) is served straight from storage; this bus only carries
//! events as they are appended, bridged to replay by sequence comparison
//! at the subscriber (spec §5 "Ordering guarantees").

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::types::A2aTaskEvent;

const CHANNEL_CAPACITY: usize = 256;

pub struct EventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<A2aTaskEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribers are added per SSE subscription and dropped on client
    /// disconnect or terminal state (spec §5); an idle channel with no
    /// subscribers left is cleaned up lazily the next time `publish` finds
    /// zero receivers.
    pub fn subscribe(&self, task_id: &str) -> broadcast::Receiver<A2aTaskEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(task_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, event: A2aTaskEvent) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(&event.task_id) {
            if sender.receiver_count() == 0 {
                channels.remove(&event.task_id);
                return;
            }
            // A publish racing the last receiver's drop is harmless: the
            // event is already durable, and the next `subscribe` replays it.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;

    fn event(task_id: &str, sequence: i64) -> A2aTaskEvent {
        A2aTaskEvent {
            task_id: task_id.to_string(),
            sequence,
            event_type: "task-status-update".to_string(),
            payload: json!({}),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_published_after_subscribing() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe("t1");
        bus.publish(event("t1", 1));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.sequence, 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(event("t2", 1));
    }
}
