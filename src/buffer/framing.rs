//! Framing layer
//!
//! Interprets the byte ring either as back-to-back fixed-size frames or
//! as a sequence of length-prefixed records (`be16(len) || payload`).
//! All functions parse in place off [`RingStorage`] head offsets and
//! assume the caller holds the buffer mutex.
//!
//! A parsed record length above half the ring capacity is treated as a
//! desynchronization marker: the walk stops rather than chasing a
//! garbage length around the ring.

use super::ring::RingStorage;
use crate::config::{FramingMode, RECORD_HEADER_LEN};

/// Encode a record header for a payload of `len` bytes
pub fn encode_header(len: usize) -> [u8; RECORD_HEADER_LEN] {
    debug_assert!(len <= u16::MAX as usize);
    (len as u16).to_be_bytes()
}

/// Parse the record header at `offset` bytes from the ring head
///
/// Returns `None` when fewer than two bytes are buffered past `offset`.
pub fn peek_record_len(ring: &RingStorage, offset: usize) -> Option<u16> {
    if ring.occupied() < offset + RECORD_HEADER_LEN {
        return None;
    }
    let hi = ring.peek_byte(offset);
    let lo = ring.peek_byte(offset + 1);
    Some(u16::from_be_bytes([hi, lo]))
}

/// Record lengths above this are treated as stream desynchronization
pub fn desync_limit(capacity: usize) -> usize {
    capacity / 2
}

/// Count whole frames currently buffered
///
/// Fixed mode is a division; header mode walks records from the head
/// and stops at the first incomplete or implausible one.
pub fn frame_count(ring: &RingStorage, framing: FramingMode) -> usize {
    match framing {
        FramingMode::Fixed { frame_size } => ring.occupied() / frame_size,
        FramingMode::WithHeader { .. } => {
            let limit = desync_limit(ring.capacity());
            let mut offset = 0;
            let mut count = 0;
            while let Some(len) = peek_record_len(ring, offset) {
                let len = len as usize;
                if len > limit {
                    break;
                }
                if ring.occupied() < offset + RECORD_HEADER_LEN + len {
                    break;
                }
                count += 1;
                offset += RECORD_HEADER_LEN + len;
            }
            count
        }
    }
}

/// Drop whole records from the head until `needed_free` bytes fit
///
/// Returns the number of records dropped. Stops early when the head
/// record is incomplete or its length is implausible; the caller falls
/// back to byte-granular discard in that case.
pub fn discard_whole_records(ring: &mut RingStorage, needed_free: usize) -> usize {
    let limit = desync_limit(ring.capacity());
    let mut dropped = 0;
    while ring.free() < needed_free {
        let Some(len) = peek_record_len(ring, 0) else {
            break;
        };
        let len = len as usize;
        if len > limit {
            break;
        }
        if ring.occupied() < RECORD_HEADER_LEN + len {
            break;
        }
        ring.discard(RECORD_HEADER_LEN + len);
        dropped += 1;
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(ring: &mut RingStorage, payload: &[u8]) {
        ring.write(&encode_header(payload.len()));
        ring.write(payload);
    }

    #[test]
    fn test_header_round_trip() {
        assert_eq!(encode_header(0), [0, 0]);
        assert_eq!(encode_header(512), [0x02, 0x00]);
        assert_eq!(encode_header(0xABCD), [0xAB, 0xCD]);
    }

    #[test]
    fn test_fixed_frame_count_is_occupancy_division() {
        let mut ring = RingStorage::new(2048).unwrap();
        let framing = FramingMode::Fixed { frame_size: 512 };
        assert_eq!(frame_count(&ring, framing), 0);

        ring.write(&[0u8; 512]);
        ring.write(&[0u8; 512]);
        assert_eq!(frame_count(&ring, framing), 2);

        // A partial frame does not count
        ring.write(&[0u8; 100]);
        assert_eq!(frame_count(&ring, framing), 2);
    }

    #[test]
    fn test_header_frame_count_walks_records() {
        let mut ring = RingStorage::new(1024).unwrap();
        let framing = FramingMode::WithHeader { max_payload: 256 };

        write_record(&mut ring, &[1u8; 100]);
        write_record(&mut ring, &[2u8; 3]);
        write_record(&mut ring, b"");
        assert_eq!(frame_count(&ring, framing), 3);
    }

    #[test]
    fn test_header_frame_count_stops_at_incomplete_record() {
        let mut ring = RingStorage::new(1024).unwrap();
        let framing = FramingMode::WithHeader { max_payload: 256 };

        write_record(&mut ring, &[1u8; 10]);
        // Header promising 50 bytes, only 20 present
        ring.write(&encode_header(50));
        ring.write(&[0u8; 20]);
        assert_eq!(frame_count(&ring, framing), 1);

        // Lone header byte is not even a length
        let mut ring = RingStorage::new(64).unwrap();
        ring.write(&[0u8]);
        assert_eq!(frame_count(&ring, framing), 0);
    }

    #[test]
    fn test_header_frame_count_stops_at_desync_length() {
        let mut ring = RingStorage::new(100).unwrap();
        let framing = FramingMode::WithHeader { max_payload: 256 };

        // Length 80 > capacity/2 = 50: implausible, walk stops even
        // though plenty of bytes follow
        ring.write(&encode_header(80));
        ring.write(&[0u8; 90]);
        assert_eq!(frame_count(&ring, framing), 0);
    }

    #[test]
    fn test_discard_whole_records_frees_exactly_enough() {
        let mut ring = RingStorage::new(64).unwrap();
        write_record(&mut ring, &[1u8; 10]); // 12 bytes
        write_record(&mut ring, &[2u8; 10]); // 12 bytes
        write_record(&mut ring, &[3u8; 10]); // 12 bytes
        assert_eq!(ring.free(), 28);

        // Needs 36 free: one record is enough
        assert_eq!(discard_whole_records(&mut ring, 36), 1);
        assert_eq!(ring.free(), 40);

        // Head is now record 2, intact
        assert_eq!(peek_record_len(&ring, 0), Some(10));
        assert_eq!(ring.peek_byte(RECORD_HEADER_LEN), 2);
    }

    #[test]
    fn test_discard_whole_records_stops_on_desync() {
        let mut ring = RingStorage::new(64).unwrap();
        ring.write(&encode_header(40)); // > 64/2, implausible
        ring.write(&[0u8; 40]);

        assert_eq!(discard_whole_records(&mut ring, 64), 0);
        assert_eq!(ring.occupied(), 42);
    }

    #[test]
    fn test_discard_whole_records_stops_on_incomplete_head() {
        let mut ring = RingStorage::new(64).unwrap();
        ring.write(&encode_header(20));
        ring.write(&[0u8; 5]); // record short by 15 bytes

        assert_eq!(discard_whole_records(&mut ring, 64), 0);
        assert_eq!(ring.occupied(), 7);
    }
}
