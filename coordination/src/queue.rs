//! Per-agent audit queues
//!
//! Bounded FIFO inboxes recording what each agent was sent and what it
//! answered. These are an audit trail, not a transport: at capacity the
//! oldest message is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoordinationError, CoordinationResult};

/// Shared reference to MessageQueues
pub type SharedMessageQueues = Arc<MessageQueues>;

/// Kind of audit message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ConsultationRequest,
    ConsultationResponse,
    KnowledgeTransfer,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConsultationRequest => write!(f, "consultation_request"),
            Self::ConsultationResponse => write!(f, "consultation_response"),
            Self::KnowledgeTransfer => write!(f, "knowledge_transfer"),
        }
    }
}

/// A single audit message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Session the message belongs to, if any
    pub session_id: Option<String>,
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
}

impl Message {
    pub fn new(
        session_id: Option<String>,
        message_type: MessageType,
        content: impl Into<String>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            message_type,
            content: content.into(),
            timestamp: Utc::now(),
            sender: sender.into(),
        }
    }
}

/// Bounded audit queues, one per agent
#[derive(Debug)]
pub struct MessageQueues {
    capacity: usize,
    queues: Mutex<HashMap<String, VecDeque<Message>>>,
}

impl MessageQueues {
    /// Create queues with the given per-agent capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Create a shared reference to these queues
    pub fn shared(self) -> SharedMessageQueues {
        Arc::new(self)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message, returning the evicted oldest entry if the queue
    /// was full
    pub fn enqueue(
        &self,
        agent_id: &str,
        message: Message,
    ) -> CoordinationResult<Option<Message>> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| CoordinationError::LockPoisoned)?;
        let queue = queues
            .entry(agent_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        let evicted = if queue.len() >= self.capacity {
            queue.pop_front()
        } else {
            None
        };
        if evicted.is_some() {
            debug!(agent_id, capacity = self.capacity, "Audit queue full, evicted oldest");
        }

        queue.push_back(message);
        Ok(evicted)
    }

    /// Ordered copy of an agent's queue, newest last
    pub fn snapshot(&self, agent_id: &str) -> CoordinationResult<Vec<Message>> {
        let queues = self
            .queues
            .lock()
            .map_err(|_| CoordinationError::LockPoisoned)?;
        Ok(queues
            .get(agent_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn len(&self, agent_id: &str) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(agent_id).map(VecDeque::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Drop every queued message
    pub fn clear(&self) -> CoordinationResult<()> {
        self.queues
            .lock()
            .map_err(|_| CoordinationError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

impl Default for MessageQueues {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: usize) -> Message {
        Message::new(
            Some("session_1_0".to_string()),
            MessageType::ConsultationRequest,
            format!("message {}", n),
            "coordinator",
        )
    }

    #[test]
    fn test_snapshot_order() {
        let queues = MessageQueues::new(10);
        for n in 0..3 {
            queues.enqueue("task", msg(n)).unwrap();
        }

        let snapshot = queues.snapshot("task").unwrap();
        let contents: Vec<&str> = snapshot.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 0", "message 1", "message 2"]);
        assert!(queues.snapshot("rag").unwrap().is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let capacity = 100;
        let queues = MessageQueues::new(capacity);

        for n in 0..capacity {
            assert!(queues.enqueue("knowledge", msg(n)).unwrap().is_none());
        }
        let evicted = queues.enqueue("knowledge", msg(capacity)).unwrap();

        assert_eq!(evicted.unwrap().content, "message 0");
        assert_eq!(queues.len("knowledge"), capacity);

        let snapshot = queues.snapshot("knowledge").unwrap();
        assert_eq!(snapshot.first().unwrap().content, "message 1");
        assert_eq!(snapshot.last().unwrap().content, format!("message {}", capacity));
    }

    #[test]
    fn test_queues_are_independent() {
        let queues = MessageQueues::new(1);
        queues.enqueue("task", msg(0)).unwrap();
        queues.enqueue("incident", msg(1)).unwrap();
        assert_eq!(queues.len("task"), 1);
        assert_eq!(queues.len("incident"), 1);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let queues = MessageQueues::new(0);
        assert_eq!(queues.capacity(), 1);
    }
}
