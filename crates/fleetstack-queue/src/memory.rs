//! In-memory queue

use crate::error::{QueueError, Result};
use crate::{Message, Queue};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    ready: VecDeque<Message>,
    in_flight: HashMap<u64, (Message, Instant)>,
}

impl State {
    /// Move expired in-flight messages back to the front of the queue
    fn requeue_expired(&mut self, now: Instant) {
        let mut expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable_by(|a, b| b.cmp(a));
        for id in expired {
            if let Some((message, _)) = self.in_flight.remove(&id) {
                debug!(id, action = %message.action, "message visibility expired");
                self.ready.push_front(message);
            }
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.in_flight.values().map(|(_, deadline)| *deadline).min()
    }
}

/// At-least-once in-memory mailbox
pub struct MemoryQueue {
    state: Mutex<State>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    /// Messages waiting for delivery
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages delivered but not yet deleted
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, action: &str, args: Vec<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let message = Message {
            id: state.next_id,
            action: action.to_string(),
            args,
            enqueued_at: Utc::now(),
            deliveries: 0,
        };
        debug!(id = message.id, action = %message.action, args = ?message.args, "message enqueued");
        state.ready.push_back(message);
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            let wake_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.requeue_expired(now);

                if let Some(mut message) = state.ready.pop_front() {
                    message.deliveries += 1;
                    state
                        .in_flight
                        .insert(message.id, (message.clone(), now + self.visibility_timeout));
                    return Ok(message);
                }

                if now >= deadline {
                    return Err(QueueError::Timeout(timeout));
                }
                state
                    .next_expiry()
                    .map_or(deadline, |expiry| expiry.min(deadline))
            };

            let _ = tokio::time::timeout_at(wake_at, self.notify.notified()).await;
        }
    }

    async fn delete(&self, message: &Message) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&message.id).is_some() {
            return Ok(());
        }
        let before = state.ready.len();
        state.ready.retain(|m| m.id != message.id);
        if state.ready.len() < before {
            Ok(())
        } else {
            Err(QueueError::NotFound(message.id))
        }
    }
}
