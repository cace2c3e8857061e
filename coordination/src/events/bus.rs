//! Event bus for council coordination
//!
//! Pub/sub messaging over a Tokio broadcast channel. Events are
//! fire-and-forget: durable history lives in the session store.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::CouncilEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<CouncilEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: CouncilEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<CouncilEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to a filtered view of the bus
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &CouncilEvent) -> bool {
        if let Some(ref sid) = self.session_id {
            if event.session_id() != Some(sid.as_str()) {
                return false;
            }
        }

        if let Some(ref aid) = self.agent_id {
            if event.agent_id() != Some(aid.as_str()) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<CouncilEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<CouncilEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<CouncilEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionStatus;
    use chrono::Utc;

    fn started(session_id: &str) -> CouncilEvent {
        CouncilEvent::SessionStarted {
            session_id: session_id.to_string(),
            request_type: "general".to_string(),
            participants: vec!["knowledge".to_string()],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(started("session_1_0"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "session_started");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(started("session_1_0"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(started("session_1_0"));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .session("session_1_0")
            .types(vec!["session_started", "session_ended"]);

        let ended_elsewhere = CouncilEvent::SessionEnded {
            session_id: "session_2_0".to_string(),
            status: SessionStatus::Completed,
            reason: None,
            duration_secs: 0.1,
            timestamp: Utc::now(),
        };
        let skipped = CouncilEvent::AgentSkipped {
            session_id: "session_1_0".to_string(),
            agent_id: "rag".to_string(),
            reason: "inactive".to_string(),
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&started("session_1_0")));
        assert!(!filter.matches(&ended_elsewhere));
        assert!(!filter.matches(&skipped));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().agent("task"));

        let publisher = Arc::clone(&bus);
        tokio::spawn(async move {
            publisher.publish(started("session_1_0"));
            publisher.publish(CouncilEvent::AgentConsulted {
                session_id: "session_1_0".to_string(),
                agent_id: "task".to_string(),
                success: true,
                confidence: 0.8,
                response_time: 0.01,
                timestamp: Utc::now(),
            });
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.agent_id(), Some("task"));
    }
}
