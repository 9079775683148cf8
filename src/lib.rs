//! # Adaptive Audio Jitter Buffer
//!
//! Bounded in-memory queue that decouples a bursty audio producer
//! (typically a network receiver) from a strictly periodic playback
//! consumer. Incoming frames are absorbed into a byte ring, a
//! hysteretic state machine (buffering / playing / underrun) trades
//! latency for continuity, and a periodic pump task delivers one frame
//! per tick to the output callback.
//!
//! **Architecture:** single-mutex shared core driven by a long-lived
//! tokio pump task; producers call [`JitterBuffer::write`], the pump
//! invokes the output callback at a fixed cadence, and state
//! transitions are reported on an optional event channel.
//!
//! ```no_run
//! use jitter_buffer::{JitterBuffer, JitterBufferConfig};
//!
//! # async fn demo() -> jitter_buffer::Result<()> {
//! let config = JitterBufferConfig::default();
//! let buffer = JitterBuffer::new(config, Box::new(|frame| {
//!     // hand `frame` to the audio pipeline
//!     let _ = frame;
//! }))?;
//!
//! buffer.start().await?;
//! buffer.write(&[0u8; 512]).await?;
//! buffer.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
mod handle;
mod pump;

pub use buffer::core::JitterBufferStats;
pub use buffer::state::PlaybackState;
pub use config::{AudioFormat, FramingMode, JitterBufferConfig};
pub use error::{JitterBufferError, Result};
pub use events::JitterBufferEvent;
pub use handle::{JitterBuffer, OutputFn};
