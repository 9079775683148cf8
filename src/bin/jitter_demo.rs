//! Jitter buffer demo and self-check utility
//!
//! Feeds sequence-numbered frames into a jitter buffer at a jittered
//! producer cadence, verifies order and content in the output callback,
//! and prints a JSON stats summary.
//!
//! **Usage:**
//! ```bash
//! jitter-demo [--with-header] [--frames 200] [--jitter-ms 10] [--silence]
//! RUST_LOG=jitter_buffer=debug jitter-demo
//! ```
//!
//! Frames carry a 4-byte big-endian sequence number followed by a
//! 0x55 fill pattern; all-zero silence fills are excluded from
//! verification.

use anyhow::Result;
use clap::Parser;
use jitter_buffer::{
    AudioFormat, FramingMode, JitterBuffer, JitterBufferConfig, JitterBufferEvent, OutputFn,
};
use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SEQ_HEADER_LEN: usize = 4;
const PATTERN_BYTE: u8 = 0x55;

#[derive(Parser, Debug)]
#[command(name = "jitter-demo")]
#[command(about = "Feed a jitter buffer with verified sequence-numbered frames")]
#[command(version)]
struct Args {
    /// Use length-prefixed records instead of fixed frames
    #[arg(long)]
    with_header: bool,

    /// Number of frames to produce
    #[arg(long, default_value = "200")]
    frames: u32,

    /// Frame size (fixed mode) or maximum payload (header mode), bytes
    #[arg(long, default_value = "512")]
    frame_size: usize,

    /// Output cadence in milliseconds
    #[arg(long, default_value = "20")]
    interval_ms: u64,

    /// Mean producer cadence in milliseconds
    #[arg(long, default_value = "18")]
    write_interval_ms: u64,

    /// Uniform producer jitter, +/- milliseconds
    #[arg(long, default_value = "10")]
    jitter_ms: u64,

    /// Emit zeroed frames on empty ticks
    #[arg(long)]
    silence: bool,

    /// Frames buffered before playback starts
    #[arg(long, default_value = "20")]
    high_water: usize,

    /// Frames below which playback pauses
    #[arg(long, default_value = "10")]
    low_water: usize,
}

/// Callback-side verification counters (shared with the output closure)
#[derive(Debug, Default)]
struct Verifier {
    expected_seq: AtomicU32,
    ok_frames: AtomicU32,
    bad_frames: AtomicU32,
    bytes_received: AtomicU64,
    silence_frames: AtomicU32,
}

impl Verifier {
    fn check(&self, frame: &[u8]) {
        self.bytes_received
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        // Silence fill from the buffer itself: not part of the stream
        if frame.iter().all(|&b| b == 0) {
            self.silence_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if frame.len() < SEQ_HEADER_LEN {
            warn!("frame of {} bytes too short to verify", frame.len());
            self.bad_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let seq = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let expected = self.expected_seq.load(Ordering::Relaxed);
        if seq != expected {
            error!("sequence mismatch: expected {}, got {}", expected, seq);
            self.bad_frames.fetch_add(1, Ordering::Relaxed);
        } else if frame[SEQ_HEADER_LEN..].iter().any(|&b| b != PATTERN_BYTE) {
            error!("pattern error in frame {}", seq);
            self.bad_frames.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ok_frames.fetch_add(1, Ordering::Relaxed);
        }
        self.expected_seq.store(seq + 1, Ordering::Relaxed);
    }
}

fn build_frame(seq: u32, len: usize) -> Vec<u8> {
    let mut frame = vec![PATTERN_BYTE; len];
    frame[..SEQ_HEADER_LEN].copy_from_slice(&seq.to_be_bytes());
    frame
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let args = Args::parse();
    info!("jitter-demo starting: {:?}", args);

    let framing = if args.with_header {
        FramingMode::WithHeader {
            max_payload: args.frame_size,
        }
    } else {
        FramingMode::Fixed {
            frame_size: args.frame_size,
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel::<JitterBufferEvent>(64);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(
                "event: {} (id={}) buffer={}",
                event.event_type(),
                event.event_id(),
                event.buffer_id()
            );
        }
    });

    let verifier = Arc::new(Verifier::default());
    let callback_verifier = Arc::clone(&verifier);
    let on_output: OutputFn = Box::new(move |frame| callback_verifier.check(frame));

    let config = JitterBufferConfig {
        capacity: 11 * 1024,
        framing,
        frame_interval: Duration::from_millis(args.interval_ms),
        high_water: args.high_water,
        low_water: args.low_water,
        output_silence_on_empty: args.silence,
        format: AudioFormat::Pcm,
        event_sink: Some(event_tx),
    };
    let buffer = JitterBuffer::new(config, on_output)?;

    buffer.start().await?;

    // Producer: steady cadence with uniform jitter, the traffic shape
    // the buffer exists to absorb.
    for seq in 0..args.frames {
        let len = if args.with_header {
            // Vary record sizes across the permitted range
            let min = SEQ_HEADER_LEN.max(args.frame_size / 4);
            rand::thread_rng().gen_range(min..=args.frame_size)
        } else {
            args.frame_size
        };
        buffer.write(&build_frame(seq, len)).await?;

        let jitter = rand::thread_rng().gen_range(0..=2 * args.jitter_ms) as i64 - args.jitter_ms as i64;
        let delay = (args.write_interval_ms as i64 + jitter).max(0) as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    // Let the pump drain what is left, then park it.
    tokio::time::sleep(Duration::from_millis(
        args.interval_ms * (args.high_water as u64 + 2),
    ))
    .await;
    buffer.stop().await?;

    let stats = buffer.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(
        "verification: ok={} bad={} silence={} bytes_received={}",
        verifier.ok_frames.load(Ordering::Relaxed),
        verifier.bad_frames.load(Ordering::Relaxed),
        verifier.silence_frames.load(Ordering::Relaxed),
        verifier.bytes_received.load(Ordering::Relaxed),
    );

    buffer.shutdown().await?;
    Ok(())
}
