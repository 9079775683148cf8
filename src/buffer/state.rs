//! Playback state

use serde::{Deserialize, Serialize};

/// Playback state of a jitter buffer
///
/// Fresh buffers are `Idle` until `start`. `Buffering` accumulates
/// frames up to the high-water mark, `Playing` drains one frame per
/// tick, and `Underrun` pauses output until the high-water mark is
/// reached again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Buffering,
    Playing,
    Underrun,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Underrun => write!(f, "underrun"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(PlaybackState::Idle.to_string(), "idle");
        assert_eq!(PlaybackState::Buffering.to_string(), "buffering");
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(PlaybackState::Underrun.to_string(), "underrun");
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&PlaybackState::Underrun).unwrap();
        assert_eq!(json, "\"underrun\"");
    }
}
