//! Output pump
//!
//! A single long-lived tokio task per buffer. Parked, it blocks on the
//! control channel; running, it wakes on an absolute deadline every
//! frame interval, evaluates the state machine, pulls at most one frame
//! while holding the mutex, and invokes the output callback with the
//! mutex released so a slow consumer can never stall writers.
//!
//! Control signals carry their own acknowledgement channel; the caller
//! waits on it with a bounded timeout, so control calls are synchronous
//! when the pump is healthy and fire-and-forget when it is wedged.

use crate::buffer::core::BufferCore;
use crate::buffer::state::PlaybackState;
use crate::events::{EventSink, JitterBufferEvent};
use crate::handle::OutputFn;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Control signals delivered to the pump task
///
/// Each signal carries a one-shot acknowledgement fired after the pump
/// has observed it and transitioned.
#[derive(Debug)]
pub(crate) enum PumpCommand {
    Start { ack: oneshot::Sender<()> },
    Stop { ack: oneshot::Sender<()> },
    Exit { ack: oneshot::Sender<()> },
}

/// Outcome of the running loop: park again or terminate
enum RunExit {
    Parked,
    Exit,
}

pub(crate) struct OutputPump {
    buffer_id: Uuid,
    core: Arc<Mutex<BufferCore>>,
    control_rx: mpsc::Receiver<PumpCommand>,
    events: EventSink,
    on_output: OutputFn,
    frame_interval: Duration,
    output_silence_on_empty: bool,
    /// Frame staging area, sized `F` (fixed) or `F_max` (header mode)
    scratch: Vec<u8>,
}

impl OutputPump {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        buffer_id: Uuid,
        core: Arc<Mutex<BufferCore>>,
        control_rx: mpsc::Receiver<PumpCommand>,
        events: EventSink,
        on_output: OutputFn,
        frame_interval: Duration,
        output_silence_on_empty: bool,
        scratch: Vec<u8>,
    ) -> JoinHandle<()> {
        let pump = Self {
            buffer_id,
            core,
            control_rx,
            events,
            on_output,
            frame_interval,
            output_silence_on_empty,
            scratch,
        };
        tokio::spawn(pump.run())
    }

    async fn run(mut self) {
        loop {
            // Parked: only a control signal can wake us. A closed
            // channel means the handle is gone; treat it as Exit.
            match self.control_rx.recv().await {
                None => break,
                Some(PumpCommand::Exit { ack }) => {
                    let _ = ack.send(());
                    break;
                }
                Some(PumpCommand::Stop { ack }) => {
                    // Already parked; acknowledge and keep waiting.
                    let _ = ack.send(());
                }
                Some(PumpCommand::Start { ack }) => {
                    let _ = ack.send(());
                    debug!("pump running, buffer_id={}", self.buffer_id);
                    match self.run_ticking().await {
                        RunExit::Parked => {
                            debug!("pump parked, buffer_id={}", self.buffer_id);
                        }
                        RunExit::Exit => break,
                    }
                }
            }
        }
        info!("pump task exit, buffer_id={}", self.buffer_id);
    }

    /// Running loop: tick on an absolute deadline so cumulative drift
    /// stays bounded; control signals are handled between ticks.
    async fn run_ticking(&mut self) -> RunExit {
        // Wake reference captured at Start; each tick advances it by
        // one interval regardless of when the tick actually ran.
        let mut next_deadline = Instant::now() + self.frame_interval;
        loop {
            tokio::select! {
                cmd = self.control_rx.recv() => match cmd {
                    None => return RunExit::Exit,
                    Some(PumpCommand::Exit { ack }) => {
                        let _ = ack.send(());
                        return RunExit::Exit;
                    }
                    Some(PumpCommand::Stop { ack }) => {
                        let _ = ack.send(());
                        return RunExit::Parked;
                    }
                    Some(PumpCommand::Start { ack }) => {
                        // Already running; re-acknowledge.
                        let _ = ack.send(());
                    }
                },
                _ = sleep_until(next_deadline) => {
                    next_deadline += self.frame_interval;
                    self.tick().await;
                }
            }
        }
    }

    /// One pump tick: state evaluation and at most one frame out
    async fn tick(&mut self) {
        let (change, produced) = {
            let mut core = self.core.lock().await;
            let change = core.tick_transition();
            let produced = if core.state() == PlaybackState::Playing {
                core.read_frame(&mut self.scratch)
            } else {
                0
            };
            (change, produced)
        };

        // Mutex released: post the transition, then hand off the frame.
        if let Some(change) = change {
            self.events.post(event_for(self.buffer_id, &change)).await;
        }

        if produced > 0 {
            trace!("tick: delivering {} bytes", produced);
            (self.on_output)(&self.scratch[..produced]);
        } else if self.output_silence_on_empty {
            self.scratch.fill(0);
            (self.on_output)(&self.scratch[..]);
        }
    }
}

/// Build the observer event for a core state change
pub(crate) fn event_for(
    buffer_id: Uuid,
    change: &crate::buffer::core::StateChange,
) -> JitterBufferEvent {
    match change.to {
        PlaybackState::Buffering | PlaybackState::Idle => {
            JitterBufferEvent::buffering(buffer_id, change.frames)
        }
        PlaybackState::Underrun => {
            JitterBufferEvent::underrun(buffer_id, change.frames, change.underrun_count)
        }
        PlaybackState::Playing => JitterBufferEvent::playing(buffer_id, change.frames),
    }
}
