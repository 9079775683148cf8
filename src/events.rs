//! State transition events
//!
//! Every BUFFERING / UNDERRUN / PLAYING transition is reported on the
//! optional observer channel configured at construction. Delivery is
//! best-effort with a bounded wait; a slow observer can lose events but
//! can never stall the buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Maximum time a transition event may wait on a full observer channel
pub(crate) const EVENT_POST_TIMEOUT: Duration = Duration::from_millis(100);

/// Jitter buffer state transition events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JitterBufferEvent {
    /// Entered BUFFERING (start, reset)
    Buffering {
        buffer_id: Uuid,
        frames: usize,
        timestamp: DateTime<Utc>,
    },

    /// Entered UNDERRUN (frame count fell below the low-water mark)
    Underrun {
        buffer_id: Uuid,
        frames: usize,
        underrun_count: u64,
        timestamp: DateTime<Utc>,
    },

    /// Entered PLAYING (frame count reached the high-water mark)
    Playing {
        buffer_id: Uuid,
        frames: usize,
        timestamp: DateTime<Utc>,
    },
}

impl JitterBufferEvent {
    pub(crate) fn buffering(buffer_id: Uuid, frames: usize) -> Self {
        Self::Buffering {
            buffer_id,
            frames,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn underrun(buffer_id: Uuid, frames: usize, underrun_count: u64) -> Self {
        Self::Underrun {
            buffer_id,
            frames,
            underrun_count,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn playing(buffer_id: Uuid, frames: usize) -> Self {
        Self::Playing {
            buffer_id,
            frames,
            timestamp: Utc::now(),
        }
    }

    /// Stable wire identifier: BUFFERING=0, UNDERRUN=1, PLAYING=2
    pub fn event_id(&self) -> u8 {
        match self {
            JitterBufferEvent::Buffering { .. } => 0,
            JitterBufferEvent::Underrun { .. } => 1,
            JitterBufferEvent::Playing { .. } => 2,
        }
    }

    /// Event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            JitterBufferEvent::Buffering { .. } => "Buffering",
            JitterBufferEvent::Underrun { .. } => "Underrun",
            JitterBufferEvent::Playing { .. } => "Playing",
        }
    }

    /// Identifier of the buffer that emitted this event
    pub fn buffer_id(&self) -> Uuid {
        match self {
            JitterBufferEvent::Buffering { buffer_id, .. }
            | JitterBufferEvent::Underrun { buffer_id, .. }
            | JitterBufferEvent::Playing { buffer_id, .. } => *buffer_id,
        }
    }
}

/// Observer-channel wrapper shared by the write path, the control
/// surface, and the pump. Posting happens outside the buffer mutex.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<JitterBufferEvent>>,
}

impl EventSink {
    pub fn new(tx: Option<mpsc::Sender<JitterBufferEvent>>) -> Self {
        Self { tx }
    }

    /// Post a transition event, waiting at most [`EVENT_POST_TIMEOUT`].
    /// A failed post is logged and otherwise ignored.
    pub async fn post(&self, event: JitterBufferEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let event_type = event.event_type();
        if let Err(e) = tx.send_timeout(event, EVENT_POST_TIMEOUT).await {
            warn!("failed to post {} event: {}", event_type, e);
        }
    }
}
