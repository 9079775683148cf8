//! Jitter buffer configuration
//!
//! All parameters are fixed at construction; the buffer never
//! reconfigures itself at runtime. `JitterBufferConfig::default()`
//! matches the factory defaults of the reference deployment
//! (512-byte fixed frames on a 20 ms cadence, 11 KiB ring).

use crate::error::{JitterBufferError, Result};
use crate::events::JitterBufferEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Length-prefix size for `FramingMode::WithHeader` records (big-endian u16)
pub const RECORD_HEADER_LEN: usize = 2;

/// How payloads are laid out on the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Every frame occupies exactly `frame_size` bytes; no per-record metadata
    Fixed { frame_size: usize },

    /// Each record is stored as `be16(len) || payload`, `len <= max_payload`
    WithHeader { max_payload: usize },
}

impl FramingMode {
    /// Size of the scratch buffer one output frame is staged through
    pub fn scratch_size(&self) -> usize {
        match *self {
            FramingMode::Fixed { frame_size } => frame_size,
            FramingMode::WithHeader { max_payload } => max_payload,
        }
    }
}

/// Payload format carried by the buffer
///
/// Informational: the buffer never inspects payload bytes. Opus is
/// special-cased only in validation, because a silence frame is only a
/// valid Opus packet at the codec's discrete frame durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Opus,
    Pcm,
}

/// Output cadences (ms) at which a zeroed buffer is a well-formed Opus frame
const OPUS_SILENCE_INTERVALS_MS: [u64; 4] = [20, 40, 60, 120];

/// Jitter buffer configuration
///
/// The output callback is passed separately to [`crate::JitterBuffer::new`]
/// so the config stays a plain cloneable value.
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Ring capacity in bytes. In `WithHeader` mode this is raised at
    /// construction to at least `high_water * (RECORD_HEADER_LEN + max_payload)`
    /// so the high-water mark is reachable even if every record carries
    /// a maximum payload.
    pub capacity: usize,

    /// Fixed frames or length-prefixed records
    pub framing: FramingMode,

    /// Output cadence; one frame is delivered per interval
    pub frame_interval: Duration,

    /// Frame count at which playback starts (or resumes after underrun)
    pub high_water: usize,

    /// Frame count below which playback falls into underrun
    pub low_water: usize,

    /// Deliver a zeroed frame on ticks with no data instead of skipping
    /// the callback
    pub output_silence_on_empty: bool,

    /// Payload format (informational, see [`AudioFormat`])
    pub format: AudioFormat,

    /// Optional observer channel for BUFFERING / UNDERRUN / PLAYING
    /// transitions. Posting waits at most 100 ms; a full channel drops
    /// the event with a warning.
    pub event_sink: Option<mpsc::Sender<JitterBufferEvent>>,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 11 * 1024,
            framing: FramingMode::Fixed { frame_size: 512 },
            frame_interval: Duration::from_millis(20),
            high_water: 20,
            low_water: 10,
            output_silence_on_empty: false,
            format: AudioFormat::Opus,
            event_sink: None,
        }
    }
}

impl JitterBufferConfig {
    /// Validate the configuration
    ///
    /// Rejects zero intervals and frame sizes, inverted water marks,
    /// rings smaller than one fixed frame, and Opus silence cadences
    /// the codec cannot represent.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.frame_interval.is_zero() {
            return Err(invalid("frame_interval must be greater than zero"));
        }
        match self.framing {
            FramingMode::Fixed { frame_size } => {
                if frame_size == 0 {
                    return Err(invalid("frame_size must be greater than zero"));
                }
                if self.capacity < frame_size {
                    return Err(invalid(format!(
                        "capacity {} cannot hold a single {}-byte frame",
                        self.capacity, frame_size
                    )));
                }
            }
            FramingMode::WithHeader { max_payload } => {
                if max_payload == 0 {
                    return Err(invalid("max_payload must be greater than zero"));
                }
                if max_payload > u16::MAX as usize {
                    return Err(invalid(format!(
                        "max_payload {} does not fit the 16-bit record header",
                        max_payload
                    )));
                }
            }
        }
        if self.low_water == 0 {
            return Err(invalid("low_water must be greater than zero"));
        }
        if self.low_water > self.high_water {
            return Err(invalid(format!(
                "low_water {} exceeds high_water {}",
                self.low_water, self.high_water
            )));
        }
        if self.format == AudioFormat::Opus && self.output_silence_on_empty {
            let interval_ms = self.frame_interval.as_millis() as u64;
            if !OPUS_SILENCE_INTERVALS_MS.contains(&interval_ms) {
                return Err(invalid(format!(
                    "Opus silence frames require a frame_interval of {:?} ms, got {}",
                    OPUS_SILENCE_INTERVALS_MS, interval_ms
                )));
            }
        }
        Ok(())
    }

    /// Capacity actually allocated for the ring
    ///
    /// `WithHeader` rings are sized for the worst case of `high_water`
    /// maximum-payload records, otherwise the high-water mark could be
    /// unreachable and playback would never start.
    pub(crate) fn effective_capacity(&self) -> usize {
        match self.framing {
            FramingMode::Fixed { .. } => self.capacity,
            FramingMode::WithHeader { max_payload } => {
                let min_size = self.high_water * (RECORD_HEADER_LEN + max_payload);
                if self.capacity < min_size {
                    warn!(
                        "with_header ring needs at least {} bytes (high_water * (2 + max_payload)), raising {} -> {}",
                        min_size, self.capacity, min_size
                    );
                    min_size
                } else {
                    self.capacity
                }
            }
        }
    }
}

fn invalid(reason: impl Into<String>) -> JitterBufferError {
    JitterBufferError::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_factory_config() {
        let config = JitterBufferConfig::default();
        assert_eq!(config.capacity, 11 * 1024);
        assert_eq!(config.framing, FramingMode::Fixed { frame_size: 512 });
        assert_eq!(config.frame_interval, Duration::from_millis(20));
        assert_eq!(config.high_water, 20);
        assert_eq!(config.low_water, 10);
        assert!(!config.output_silence_on_empty);
        assert_eq!(config.format, AudioFormat::Opus);
        assert!(config.event_sink.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = JitterBufferConfig {
            frame_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_frame_size() {
        let config = JitterBufferConfig {
            framing: FramingMode::Fixed { frame_size: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_water_marks() {
        let config = JitterBufferConfig {
            high_water: 5,
            low_water: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = JitterBufferConfig {
            low_water: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equal_water_marks_allowed() {
        let config = JitterBufferConfig {
            high_water: 10,
            low_water: 10,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_capacity_below_one_frame() {
        let config = JitterBufferConfig {
            capacity: 256,
            framing: FramingMode::Fixed { frame_size: 512 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_opus_silence_interval_constraint() {
        let config = JitterBufferConfig {
            output_silence_on_empty: true,
            frame_interval: Duration::from_millis(25),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        for ms in [20, 40, 60, 120] {
            let config = JitterBufferConfig {
                output_silence_on_empty: true,
                frame_interval: Duration::from_millis(ms),
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "interval {} ms should pass", ms);
        }

        // Non-Opus payloads can use any cadence
        let config = JitterBufferConfig {
            output_silence_on_empty: true,
            frame_interval: Duration::from_millis(25),
            format: AudioFormat::Pcm,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_header_capacity_raise() {
        let config = JitterBufferConfig {
            capacity: 100,
            framing: FramingMode::WithHeader { max_payload: 256 },
            high_water: 4,
            low_water: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_capacity(), 4 * (2 + 256));
    }

    #[test]
    fn test_with_header_capacity_kept_when_large_enough() {
        let config = JitterBufferConfig {
            capacity: 64 * 1024,
            framing: FramingMode::WithHeader { max_payload: 256 },
            high_water: 4,
            low_water: 1,
            ..Default::default()
        };
        assert_eq!(config.effective_capacity(), 64 * 1024);
    }
}
