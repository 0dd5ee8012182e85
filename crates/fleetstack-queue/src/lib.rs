//! FleetStack queue
//!
//! Pull mailbox used to hand background work (configuration regeneration)
//! from the request path to workers. Delivery is at-least-once: a message
//! stays in flight after `dequeue` and comes back if it is not deleted
//! before its visibility timeout expires.

pub mod error;
pub mod memory;

pub use error::{QueueError, Result};
pub use memory::MemoryQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Action name used by the environment export step
pub const REGENERATE_CONFIGURATION: &str = "regenerate-configuration";

/// キューメッセージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// キュー内で一意なID
    pub id: u64,
    pub action: String,
    pub args: Vec<String>,
    pub enqueued_at: DateTime<Utc>,
    /// 配信回数 (初回は 1)
    pub deliveries: u32,
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, action: &str, args: Vec<String>) -> Result<()>;

    /// Wait up to `timeout` for a message; fails with `QueueError::Timeout`.
    async fn dequeue(&self, timeout: Duration) -> Result<Message>;

    /// Acknowledge a delivered message so it is never redelivered.
    async fn delete(&self, message: &Message) -> Result<()>;
}
