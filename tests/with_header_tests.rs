//! End-to-end tests for length-prefixed (with-header) framing

use jitter_buffer::{
    AudioFormat, FramingMode, JitterBuffer, JitterBufferConfig, JitterBufferEvent, OutputFn,
    PlaybackState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn capture_output() -> (OutputFn, Arc<Mutex<Vec<Vec<u8>>>>) {
    let frames: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    let callback: OutputFn = Box::new(move |frame: &[u8]| {
        sink.lock().unwrap().push(frame.to_vec());
    });
    (callback, frames)
}

fn header_config(
    max_payload: usize,
    high_water: usize,
    events: Option<mpsc::Sender<JitterBufferEvent>>,
) -> JitterBufferConfig {
    JitterBufferConfig {
        capacity: 0, // always raised to high_water * (2 + max_payload)
        framing: FramingMode::WithHeader { max_payload },
        frame_interval: Duration::from_millis(20),
        high_water,
        low_water: 1,
        output_silence_on_empty: false,
        format: AudioFormat::Pcm,
        event_sink: events,
    }
}

#[tokio::test(start_paused = true)]
async fn test_capacity_auto_raise_is_visible_in_stats() {
    let (callback, _delivered) = capture_output();
    let buffer = JitterBuffer::new(header_config(256, 4, None), callback).unwrap();
    assert_eq!(buffer.stats().await.capacity, 4 * (2 + 256));
    buffer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_overrun_discards_one_whole_record() {
    let (callback, delivered) = capture_output();
    let (event_tx, _event_rx) = mpsc::channel(64);
    let buffer =
        JitterBuffer::new(header_config(256, 4, Some(event_tx)), callback).unwrap();

    buffer.start().await.unwrap();
    // Ring holds four 250-byte records (1008 of 1032 bytes); the fifth
    // write evicts exactly the oldest record.
    for tag in 1u8..=5 {
        buffer.write(&vec![tag; 250]).await.unwrap();
    }

    let stats = buffer.stats().await;
    assert_eq!(stats.overrun_count, 1);
    assert_eq!(stats.frames, 4);

    tokio::time::sleep(Duration::from_millis(90)).await; // four ticks

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 4);
    for (i, record) in delivered.iter().enumerate() {
        let expected_tag = (i + 2) as u8; // record 1 was evicted
        assert_eq!(record.len(), 250);
        assert!(
            record.iter().all(|&b| b == expected_tag),
            "record {} corrupt after eviction",
            i
        );
    }
    drop(delivered);

    buffer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_variable_payloads_round_trip_in_order() {
    let (callback, delivered) = capture_output();
    let buffer = JitterBuffer::new(header_config(64, 3, None), callback).unwrap();

    buffer.start().await.unwrap();
    let payloads: Vec<Vec<u8>> = vec![
        vec![1u8; 5],
        vec![2u8; 64],
        vec![3u8; 1],
        vec![4u8; 33],
        vec![5u8; 17],
    ];
    for p in &payloads {
        buffer.write(p).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(110)).await; // five ticks

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), payloads.len());
    assert_eq!(*delivered, payloads, "records must come back whole, in order");
    drop(delivered);

    buffer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_empty_payload_records_are_legal() {
    let (callback, delivered) = capture_output();
    let buffer = JitterBuffer::new(header_config(64, 2, None), callback).unwrap();

    buffer.start().await.unwrap();
    buffer.write(b"").await.unwrap();
    buffer.write(&[7u8; 10]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    // The empty record is consumed but produces no callback.
    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0], vec![7u8; 10]);
    drop(delivered);

    let stats = buffer.stats().await;
    assert_eq!(stats.frames, 0);

    buffer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_underrun_then_recovery_with_records() {
    let (callback, _delivered) = capture_output();
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let buffer =
        JitterBuffer::new(header_config(128, 3, Some(event_tx)), callback).unwrap();

    buffer.start().await.unwrap();
    for tag in 1u8..=3 {
        buffer.write(&vec![tag; 100]).await.unwrap();
    }

    // Drain all three records, then hit the empty ring.
    tokio::time::sleep(Duration::from_millis(90)).await;
    assert_eq!(buffer.stats().await.state, PlaybackState::Underrun);

    for tag in 4u8..=6 {
        buffer.write(&vec![tag; 100]).await.unwrap();
    }
    assert_eq!(buffer.stats().await.state, PlaybackState::Playing);

    let ids: Vec<u8> = {
        let mut ids = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            ids.push(event.event_id());
        }
        ids
    };
    assert_eq!(ids, vec![0, 2, 1, 2]);

    buffer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silence_frame_uses_max_payload_length() {
    let (callback, delivered) = capture_output();
    let config = JitterBufferConfig {
        output_silence_on_empty: true,
        ..header_config(96, 2, None)
    };
    let buffer = JitterBuffer::new(config, callback).unwrap();

    buffer.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let delivered = delivered.lock().unwrap();
    assert!(!delivered.is_empty());
    for silence in delivered.iter() {
        assert_eq!(silence.len(), 96);
        assert!(silence.iter().all(|&b| b == 0));
    }
}
