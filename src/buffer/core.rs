//! Shared buffer core
//!
//! The single-mutex aggregate the public handle and the pump both lock:
//! ring storage, framing mode, playback state, water marks, and the
//! diagnostic counters. Methods here are synchronous and assume the
//! caller holds the buffer mutex; events are returned as [`StateChange`]
//! values so the caller can post them after releasing the lock.
//!
//! ## Overflow policy
//!
//! A write that does not fit evicts the oldest data first. Fixed
//! framing discards exactly the shortfall in bytes (the ring stays
//! frame-aligned as long as the capacity is a multiple of the frame
//! size). Header framing must discard whole records, otherwise the
//! next header parse would read payload bytes as a length; only when no
//! whole record can be discarded does it fall back to a byte-granular
//! discard and flag the stream as desynchronized.

use super::framing;
use super::ring::RingStorage;
use super::state::PlaybackState;
use crate::config::{FramingMode, RECORD_HEADER_LEN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A state transition that needs an event posted once the mutex drops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub to: PlaybackState,
    /// Whole frames buffered at the moment of the transition
    pub frames: usize,
    /// Lifetime underrun count after the transition
    pub underrun_count: u64,
}

/// Mutex-protected jitter buffer state
#[derive(Debug)]
pub struct BufferCore {
    ring: RingStorage,
    framing: FramingMode,
    state: PlaybackState,
    high_water: usize,
    low_water: usize,
    underrun_count: u64,
    overrun_count: u64,
    /// Alignment lost since the last reset (header mode only)
    desynced: bool,
}

impl BufferCore {
    pub fn new(ring: RingStorage, framing: FramingMode, high_water: usize, low_water: usize) -> Self {
        Self {
            ring,
            framing,
            state: PlaybackState::Idle,
            high_water,
            low_water,
            underrun_count: 0,
            overrun_count: 0,
            desynced: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn overrun_count(&self) -> u64 {
        self.overrun_count
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count
    }

    /// Whole frames currently buffered
    pub fn frame_count(&self) -> usize {
        framing::frame_count(&self.ring, self.framing)
    }

    /// Store one payload, evicting from the head if it does not fit
    ///
    /// Length validation happens in the public handle; by the time this
    /// runs the payload is known to fit the framing mode.
    pub fn write_payload(&mut self, payload: &[u8]) {
        let wire_len = match self.framing {
            FramingMode::Fixed { .. } => payload.len(),
            FramingMode::WithHeader { .. } => RECORD_HEADER_LEN + payload.len(),
        };
        debug_assert!(wire_len <= self.ring.capacity());

        if wire_len > self.ring.free() {
            self.evict_for(wire_len);
        }

        match self.framing {
            FramingMode::Fixed { .. } => self.ring.write(payload),
            FramingMode::WithHeader { .. } => {
                self.ring.write(&framing::encode_header(payload.len()));
                self.ring.write(payload);
            }
        }
    }

    /// Overflow recovery: make room for `wire_len` bytes at the tail
    fn evict_for(&mut self, wire_len: usize) {
        match self.framing {
            FramingMode::Fixed { .. } => {
                let shortfall = wire_len - self.ring.free();
                self.ring.discard(shortfall);
                self.overrun_count += 1;
                warn!(
                    "overrun: discarded {} bytes from the head, count={}",
                    shortfall, self.overrun_count
                );
            }
            FramingMode::WithHeader { .. } => {
                let dropped = framing::discard_whole_records(&mut self.ring, wire_len);
                if self.ring.free() < wire_len {
                    // No whole record left to drop; sacrifice alignment
                    // rather than reject the write.
                    let shortfall = wire_len - self.ring.free();
                    self.ring.discard(shortfall);
                    self.desynced = true;
                    warn!(
                        "overrun: alignment lost, discarded {} residual bytes ({} whole records dropped)",
                        shortfall, dropped
                    );
                }
                self.overrun_count += 1;
                if dropped > 0 {
                    warn!(
                        "overrun: discarded {} record(s), count={}",
                        dropped, self.overrun_count
                    );
                }
            }
        }
    }

    /// Promote BUFFERING / UNDERRUN to PLAYING once the high-water mark
    /// is reached. Evaluated at the end of each write and again at the
    /// top of each pump tick, so a buffer filled while the pump was
    /// parked starts playing on its first tick.
    pub fn promote_if_ready(&mut self) -> Option<StateChange> {
        if !matches!(
            self.state,
            PlaybackState::Buffering | PlaybackState::Underrun
        ) {
            return None;
        }
        let frames = self.frame_count();
        if frames < self.high_water {
            return None;
        }
        self.state = PlaybackState::Playing;
        info!("start playing, frames={}", frames);
        Some(StateChange {
            to: PlaybackState::Playing,
            frames,
            underrun_count: self.underrun_count,
        })
    }

    /// Tick-path state evaluation: promote first, then demote PLAYING
    /// to UNDERRUN when the frame count has fallen below the low-water
    /// mark.
    pub fn tick_transition(&mut self) -> Option<StateChange> {
        if let Some(change) = self.promote_if_ready() {
            return Some(change);
        }
        if self.state != PlaybackState::Playing {
            return None;
        }
        let frames = self.frame_count();
        if frames >= self.low_water {
            return None;
        }
        self.state = PlaybackState::Underrun;
        self.underrun_count += 1;
        warn!("underrun: frames={}, count={}", frames, self.underrun_count);
        Some(StateChange {
            to: PlaybackState::Underrun,
            frames,
            underrun_count: self.underrun_count,
        })
    }

    /// Pull one frame from the head into `scratch`
    ///
    /// Returns the payload length delivered, or 0 when nothing can be
    /// consumed this tick. In header mode a record whose length exceeds
    /// the payload limit is discarded whole (realigning the stream to
    /// the next header) and the tick delivers nothing.
    pub fn read_frame(&mut self, scratch: &mut [u8]) -> usize {
        match self.framing {
            FramingMode::Fixed { frame_size } => {
                if self.ring.occupied() < frame_size {
                    return 0;
                }
                self.ring.read(&mut scratch[..frame_size])
            }
            FramingMode::WithHeader { max_payload } => {
                let Some(len) = framing::peek_record_len(&self.ring, 0) else {
                    return 0;
                };
                let len = len as usize;
                if len > max_payload {
                    if self.ring.occupied() < RECORD_HEADER_LEN + len {
                        return 0;
                    }
                    warn!(
                        "record payload {} exceeds max_payload {}, skipping record",
                        len, max_payload
                    );
                    let mut header = [0u8; RECORD_HEADER_LEN];
                    self.ring.read(&mut header);
                    let mut remaining = len;
                    while remaining > 0 {
                        let chunk = remaining.min(max_payload);
                        self.ring.read(&mut scratch[..chunk]);
                        remaining -= chunk;
                    }
                    return 0;
                }
                if self.ring.occupied() < RECORD_HEADER_LEN + len {
                    // Whole record not buffered yet; do not consume.
                    return 0;
                }
                let mut header = [0u8; RECORD_HEADER_LEN];
                self.ring.read(&mut header);
                self.ring.read(&mut scratch[..len])
            }
        }
    }

    /// Force BUFFERING (the `start` transition)
    pub fn begin_buffering(&mut self) -> StateChange {
        self.state = PlaybackState::Buffering;
        StateChange {
            to: PlaybackState::Buffering,
            frames: self.frame_count(),
            underrun_count: self.underrun_count,
        }
    }

    /// Drop all buffered data and re-enter BUFFERING
    ///
    /// Lifetime byte counters and the underrun/overrun counters are
    /// preserved; only occupancy, offsets, and the desync flag clear.
    pub fn reset(&mut self) -> StateChange {
        self.ring.clear();
        self.desynced = false;
        self.state = PlaybackState::Buffering;
        debug!("reset: buffered data dropped, re-entering buffering");
        StateChange {
            to: PlaybackState::Buffering,
            frames: 0,
            underrun_count: self.underrun_count,
        }
    }

    /// One coherent snapshot of the diagnostics
    pub fn stats(&self, buffer_id: Uuid) -> JitterBufferStats {
        JitterBufferStats {
            buffer_id,
            state: self.state,
            capacity: self.ring.capacity(),
            occupied_bytes: self.ring.occupied(),
            frames: self.frame_count(),
            total_bytes_written: self.ring.total_written(),
            total_bytes_read: self.ring.total_read(),
            underrun_count: self.underrun_count,
            overrun_count: self.overrun_count,
        }
    }
}

/// Diagnostics snapshot taken under the buffer mutex
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JitterBufferStats {
    pub buffer_id: Uuid,
    pub state: PlaybackState,
    pub capacity: usize,
    pub occupied_bytes: usize,
    pub frames: usize,
    pub total_bytes_written: u64,
    pub total_bytes_read: u64,
    pub underrun_count: u64,
    pub overrun_count: u64,
}
