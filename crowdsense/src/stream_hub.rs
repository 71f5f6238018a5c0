// THEORY:
// The `StreamHub` runs many cameras side by side. Every stream gets its own
// `FrameProcessor`, owned by exactly one tokio task, so no tracker, group or gate
// state is ever shared or locked. Callers talk to a stream through a cloneable
// `StreamHandle` that sends it frames over a channel and awaits the report.
//
// Key architectural principles:
// 1.  **Actor per Stream**: a stream's task is the only code that touches its
//     processor. Frames from one camera are processed strictly in submission order;
//     frames from different cameras never block each other.
// 2.  **Fan-out, not Fan-in**: every alert is tagged with its camera and published
//     on a broadcast channel. Any number of consumers (a log writer, a UI, the
//     alarm worker) subscribe without the engine knowing about them.
// 3.  **Latest-value Render**: the newest `RenderState` of each stream sits on a
//     `watch` channel. A slow drawer skips stale frames instead of queueing them.
// 4.  **Side Channels Stay Outside**: the audible alarm runs on its own task fed by
//     the broadcast channel; a slow or failing sink cannot stall frame processing.

use crate::config::PipelineConfig;
use crate::error::HubError;
use crate::pipeline::{AlertEvent, FrameInput, FrameProcessor, FrameReport, RenderState, Severity};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Frames that may wait in a stream's inbox before `submit` starts to wait.
const STREAM_QUEUE_DEPTH: usize = 64;

/// An alert event tagged with the camera that raised it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamAlert {
    pub camera: String,
    #[serde(flatten)]
    pub event: AlertEvent,
}

enum StreamCommand {
    Frame {
        input: FrameInput,
        reply: oneshot::Sender<FrameReport>,
    },
    Stop,
}

/// A cloneable handle onto one running stream.
#[derive(Clone)]
pub struct StreamHandle {
    camera: String,
    commands: mpsc::Sender<StreamCommand>,
    render: watch::Receiver<RenderState>,
}

impl StreamHandle {
    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Processes one frame on the stream's task and returns its report.
    pub async fn submit(&self, input: FrameInput) -> Result<FrameReport, HubError> {
        let (reply, report) = oneshot::channel();
        self.commands
            .send(StreamCommand::Frame { input, reply })
            .await
            .map_err(|_| self.closed())?;
        report.await.map_err(|_| self.closed())
    }

    /// Asks the stream to stop after the frames already queued. Idempotent.
    pub async fn stop(&self) {
        let _ = self.commands.send(StreamCommand::Stop).await;
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// The most recent render state published by the stream.
    pub fn render(&self) -> RenderState {
        self.render.borrow().clone()
    }

    /// A receiver that wakes whenever the stream publishes a new render state.
    pub fn watch_render(&self) -> watch::Receiver<RenderState> {
        self.render.clone()
    }

    fn closed(&self) -> HubError {
        HubError::StreamClosed(self.camera.clone())
    }
}

struct StreamEntry {
    handle: StreamHandle,
    task: JoinHandle<()>,
}

/// Owns the running streams and the alert broadcast channel.
pub struct StreamHub {
    alerts_tx: broadcast::Sender<StreamAlert>,
    streams: HashMap<String, StreamEntry>,
}

impl StreamHub {
    pub fn new(capacity: usize) -> Self {
        let (alerts_tx, _) = broadcast::channel::<StreamAlert>(capacity.max(1));
        Self {
            alerts_tx,
            streams: HashMap::new(),
        }
    }

    /// A new receiver for the alerts of every stream, from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamAlert> {
        self.alerts_tx.subscribe()
    }

    /// Builds a processor for `camera` and spawns the task that owns it. Must be
    /// called from inside a tokio runtime.
    pub fn open(
        &mut self,
        camera: impl Into<String>,
        config: PipelineConfig,
        frame_rate: f64,
    ) -> Result<StreamHandle, HubError> {
        let camera = camera.into();
        if self.streams.contains_key(&camera) {
            return Err(HubError::DuplicateStream(camera));
        }

        let processor = FrameProcessor::new(config, frame_rate)?;
        let (commands, inbox) = mpsc::channel(STREAM_QUEUE_DEPTH);
        let (render_tx, render) = watch::channel(RenderState::default());
        let task = tokio::spawn(run_stream(
            camera.clone(),
            processor,
            inbox,
            render_tx,
            self.alerts_tx.clone(),
        ));

        let handle = StreamHandle {
            camera: camera.clone(),
            commands,
            render,
        };
        info!(camera = %camera, frame_rate, "stream opened");
        self.streams.insert(
            camera,
            StreamEntry {
                handle: handle.clone(),
                task,
            },
        );
        Ok(handle)
    }

    pub fn handle(&self, camera: &str) -> Option<StreamHandle> {
        self.streams.get(camera).map(|entry| entry.handle.clone())
    }

    pub fn cameras(&self) -> Vec<&str> {
        let mut cameras: Vec<&str> = self.streams.keys().map(String::as_str).collect();
        cameras.sort_unstable();
        cameras
    }

    /// Stops one stream and waits for its task to end.
    pub async fn close(&mut self, camera: &str) -> Result<(), HubError> {
        let entry = self
            .streams
            .remove(camera)
            .ok_or_else(|| HubError::UnknownStream(camera.to_string()))?;
        stop_entry(entry).await;
        Ok(())
    }

    /// Stops every stream concurrently and waits for all of them.
    pub async fn shutdown_all(&mut self) {
        let entries: Vec<StreamEntry> = self.streams.drain().map(|(_, entry)| entry).collect();
        join_all(entries.into_iter().map(stop_entry)).await;
    }
}

async fn stop_entry(entry: StreamEntry) {
    entry.handle.stop().await;
    if let Err(e) = entry.task.await {
        warn!(camera = %entry.handle.camera, error = %e, "stream task ended abnormally");
    }
}

async fn run_stream(
    camera: String,
    mut processor: FrameProcessor,
    mut inbox: mpsc::Receiver<StreamCommand>,
    render_tx: watch::Sender<RenderState>,
    alerts_tx: broadcast::Sender<StreamAlert>,
) {
    while let Some(command) = inbox.recv().await {
        match command {
            StreamCommand::Frame { input, reply } => {
                let report = processor.process_frame(input);
                for event in &report.alerts {
                    // No subscribers is fine; the report still carries the alert.
                    let _ = alerts_tx.send(StreamAlert {
                        camera: camera.clone(),
                        event: event.clone(),
                    });
                }
                render_tx.send_replace(report.render.clone());
                if reply.send(report).is_err() {
                    debug!(camera = %camera, "submitter went away before the report");
                }
            }
            StreamCommand::Stop => break,
        }
    }
    info!(camera = %camera, "stream stopped");
}

/// Something that can make a noise. Called from the alarm worker's task only.
pub trait AlarmSink: Send + 'static {
    fn ring(&mut self, alert: &StreamAlert);
}

/// Writes the ASCII bell to stdout.
pub struct TerminalBell;

impl AlarmSink for TerminalBell {
    fn ring(&mut self, _alert: &StreamAlert) {
        let mut out = std::io::stdout();
        if let Err(e) = out.write_all(b"\x07").and_then(|_| out.flush()) {
            debug!(error = %e, "terminal bell failed");
        }
    }
}

/// Rings `sink` for high-severity alerts, at most once per `min_interval`. Ends when
/// the alert channel closes.
pub fn spawn_alarm_worker<S: AlarmSink>(
    mut alerts: broadcast::Receiver<StreamAlert>,
    mut sink: S,
    min_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_ring: Option<Instant> = None;
        loop {
            match alerts.recv().await {
                Ok(alert) => {
                    if alert.event.severity != Severity::High {
                        continue;
                    }
                    if last_ring.is_some_and(|t| t.elapsed() < min_interval) {
                        debug!(camera = %alert.camera, kind = %alert.event.kind, "alarm rate-limited");
                        continue;
                    }
                    last_ring = Some(Instant::now());
                    sink.ring(&alert);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "alarm worker fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
