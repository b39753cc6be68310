//! Queue entry type shared by all queue backends.

use chrono::{DateTime, Utc};

/// One durable work item.
///
/// Created by the enqueuer, mutated only by the queue store on retry
/// (`error_count` incremented, visibility pushed out), destroyed on ack.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    /// Encoded `JobArgs` payload.
    pub payload: Vec<u8>,
    /// Number of failed processing attempts so far.
    pub error_count: i32,
    /// The entry is not handed to a consumer before this instant.
    pub visible_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(id: i64, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            error_count: 0,
            visible_at: Utc::now(),
        }
    }
}
