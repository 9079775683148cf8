//! Error types for the jitter buffer
//!
//! Expected failures use `Result<T, E>` with meaningful enums; internal
//! recovery paths (overrun, stream desync, underrun) are logged and
//! counted instead of surfacing as errors.

use thiserror::Error;

/// Main error type for jitter buffer operations
#[derive(Debug, Error)]
pub enum JitterBufferError {
    /// Configuration rejected at construction
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Fixed-framing write whose length does not match the frame size
    #[error("Payload length {len} does not match fixed frame size {frame_size}")]
    FrameSizeMismatch { len: usize, frame_size: usize },

    /// Length-prefixed write whose payload exceeds the per-record limit
    #[error("Payload length {len} exceeds maximum record payload {max_payload}")]
    PayloadTooLarge { len: usize, max_payload: usize },

    /// Bounded wait on the shared-state mutex expired
    #[error("{op}: lock wait exceeded {timeout_ms} ms")]
    LockTimeout { op: &'static str, timeout_ms: u64 },

    /// Ring or scratch allocation failed
    #[error("Out of memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    /// The pump task is gone; no control signal can be delivered
    #[error("Pump control channel closed")]
    ControlChannelClosed,
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, JitterBufferError>;
