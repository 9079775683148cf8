//! Public jitter buffer handle
//!
//! Owns the shared core, the control channel to the pump task, and the
//! pump itself. All operations are bounded: lock waits and control
//! acknowledgements time out rather than blocking indefinitely.

use crate::buffer::core::{BufferCore, JitterBufferStats};
use crate::buffer::ring::RingStorage;
use crate::config::{FramingMode, JitterBufferConfig};
use crate::error::{JitterBufferError, Result};
use crate::events::EventSink;
use crate::pump::{event_for, OutputPump, PumpCommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Output callback: receives one frame per pump tick
///
/// Must not call back into the buffer, must not block for long, and
/// must copy the slice if it needs the bytes past the call.
pub type OutputFn = Box<dyn FnMut(&[u8]) + Send>;

/// Bounded lock wait for the hot write path
const WRITE_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Bounded lock wait for reset
const RESET_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Bounded wait for a pump acknowledgement on start/stop/shutdown
const CONTROL_ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Depth of the control channel; signals are few and tiny
const CONTROL_CHANNEL_DEPTH: usize = 8;

/// Adaptive jitter buffer
///
/// Decouples a bursty producer from a fixed-cadence consumer. Created
/// idle with the pump parked; [`JitterBuffer::start`] begins buffering
/// and ticking, [`JitterBuffer::stop`] parks the pump without dropping
/// data, and [`JitterBuffer::shutdown`] terminates the pump and
/// releases everything.
pub struct JitterBuffer {
    id: Uuid,
    framing: FramingMode,
    core: Arc<Mutex<BufferCore>>,
    control_tx: mpsc::Sender<PumpCommand>,
    pump: Option<JoinHandle<()>>,
    events: EventSink,
}

impl JitterBuffer {
    /// Create a jitter buffer and spawn its (parked) pump task
    ///
    /// Validates the configuration and allocates the ring and the frame
    /// scratch up front; any failure unwinds before the task exists.
    /// Must be called from within a tokio runtime.
    pub fn new(config: JitterBufferConfig, on_output: OutputFn) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        let capacity = config.effective_capacity();
        let ring = RingStorage::new(capacity)?;

        let scratch_size = config.framing.scratch_size();
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(scratch_size)
            .map_err(|_| JitterBufferError::OutOfMemory {
                requested: scratch_size,
            })?;
        scratch.resize(scratch_size, 0);

        let core = Arc::new(Mutex::new(BufferCore::new(
            ring,
            config.framing,
            config.high_water,
            config.low_water,
        )));

        let events = EventSink::new(config.event_sink.clone());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_DEPTH);

        let pump = OutputPump::spawn(
            id,
            Arc::clone(&core),
            control_rx,
            events.clone(),
            on_output,
            config.frame_interval,
            config.output_silence_on_empty,
            scratch,
        );

        info!(
            "jitter buffer created: id={}, capacity={} bytes, framing={:?}, interval={:?}, high_water={}, low_water={}",
            id, capacity, config.framing, config.frame_interval, config.high_water, config.low_water
        );

        Ok(Self {
            id,
            framing: config.framing,
            core,
            control_tx,
            pump: Some(pump),
            events,
        })
    }

    /// Stable identifier carried in observer events
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Enter BUFFERING and unblock the pump
    ///
    /// Always re-enters BUFFERING, even when called on a buffer that is
    /// already playing; playback resumes once the high-water mark is
    /// reached again. Redundant starts on a running pump are
    /// re-acknowledged and otherwise ignored.
    pub async fn start(&self) -> Result<()> {
        let change = {
            let mut core = self.core.lock().await;
            core.begin_buffering()
        };
        self.events.post(event_for(self.id, &change)).await;

        self.send_control("start", |ack| PumpCommand::Start { ack })
            .await?;
        info!("jitter buffer start, id={}", self.id);
        Ok(())
    }

    /// Park the pump; buffered data and counters are preserved
    pub async fn stop(&self) -> Result<()> {
        self.send_control("stop", |ack| PumpCommand::Stop { ack })
            .await?;
        debug!("jitter buffer stop, id={}", self.id);
        Ok(())
    }

    /// Drop all buffered data and re-enter BUFFERING
    ///
    /// The pump's parked/running status is untouched; diagnostic
    /// counters carry over.
    pub async fn reset(&self) -> Result<()> {
        let mut core = timeout(RESET_LOCK_TIMEOUT, self.core.lock())
            .await
            .map_err(|_| JitterBufferError::LockTimeout {
                op: "reset",
                timeout_ms: RESET_LOCK_TIMEOUT.as_millis() as u64,
            })?;
        let change = core.reset();
        drop(core);

        self.events.post(event_for(self.id, &change)).await;
        Ok(())
    }

    /// Store one frame
    ///
    /// Fixed framing requires exactly the configured frame size; header
    /// framing accepts any payload up to the record limit. A full ring
    /// discards oldest data and counts an overrun instead of failing.
    pub async fn write(&self, payload: &[u8]) -> Result<()> {
        match self.framing {
            FramingMode::Fixed { frame_size } => {
                if payload.len() != frame_size {
                    return Err(JitterBufferError::FrameSizeMismatch {
                        len: payload.len(),
                        frame_size,
                    });
                }
            }
            FramingMode::WithHeader { max_payload } => {
                if payload.len() > max_payload {
                    return Err(JitterBufferError::PayloadTooLarge {
                        len: payload.len(),
                        max_payload,
                    });
                }
            }
        }

        let change = {
            let mut core = timeout(WRITE_LOCK_TIMEOUT, self.core.lock())
                .await
                .map_err(|_| JitterBufferError::LockTimeout {
                    op: "write",
                    timeout_ms: WRITE_LOCK_TIMEOUT.as_millis() as u64,
                })?;
            core.write_payload(payload);
            core.promote_if_ready()
        };

        if let Some(change) = change {
            self.events.post(event_for(self.id, &change)).await;
        }
        Ok(())
    }

    /// Snapshot the diagnostics under the mutex
    pub async fn stats(&self) -> JitterBufferStats {
        self.core.lock().await.stats(self.id)
    }

    /// Terminate the pump and release the buffer
    ///
    /// Signals Exit, waits (bounded) for the acknowledgement, then
    /// joins the task. The handle is consumed; no further operations
    /// are possible.
    pub async fn shutdown(mut self) -> Result<()> {
        self.send_control("shutdown", |ack| PumpCommand::Exit { ack })
            .await?;
        if let Some(pump) = self.pump.take() {
            if pump.await.is_err() {
                warn!("pump task panicked during shutdown, id={}", self.id);
            }
        }
        info!("jitter buffer destroyed, id={}", self.id);
        Ok(())
    }

    /// Deliver a control signal and wait (bounded) for the pump's
    /// acknowledgement. A missed acknowledgement is logged, not fatal:
    /// the signal is queued and takes effect when the pump observes it.
    async fn send_control(
        &self,
        op: &'static str,
        make: impl FnOnce(oneshot::Sender<()>) -> PumpCommand,
    ) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control_tx
            .send(make(ack_tx))
            .await
            .map_err(|_| JitterBufferError::ControlChannelClosed)?;

        match timeout(CONTROL_ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("{}: pump dropped the acknowledgement, id={}", op, self.id),
            Err(_) => warn!(
                "{}: no acknowledgement within {} ms, id={}",
                op,
                CONTROL_ACK_TIMEOUT.as_millis(),
                self.id
            ),
        }
        Ok(())
    }
}

impl Drop for JitterBuffer {
    fn drop(&mut self) {
        // Dropping `control_tx` closes the channel; the pump treats a
        // closed channel as Exit and terminates on its own.
        if self.pump.is_some() {
            debug!("jitter buffer dropped without shutdown, id={}", self.id);
        }
    }
}
