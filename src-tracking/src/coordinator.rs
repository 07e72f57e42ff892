// ============================================================================
// Tracking Coordinator - Single-Writer Tracking Thread
// ============================================================================
//
// Owns the TrackSet and the ReacquisitionScheduler. Detections, commands and
// re-acquisition outcomes all arrive through queues and are applied by this
// thread only. After every change a fresh snapshot is published for the
// audio side.

use crate::config::TrackingConfig;
use crate::detector::{Detection, Detector};
use crate::frame::{Frame, FrameSource};
use crate::local_tracker::TrackerFactory;
use crate::modes::{ModeProfile, NavigationMode};
use crate::reacquisition::{ReacquisitionOutcome, ReacquisitionScheduler, RequestKind};
use crate::snapshot::{SnapshotCell, SnapshotReader};
use crate::track::{TrackId, TrackSnapshot};
use crate::track_set::{StopTarget, TrackSet};
use crossbeam::channel::{Receiver, Sender, select, unbounded};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors from the tracking coordinator
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to spawn tracking thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to build re-acquisition runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Tracking thread is not running")]
    ChannelClosed,
}

/// Messages for the tracking thread
#[derive(Debug)]
pub enum TrackingCommand {
    /// External detections taken on `frame`
    Detections { detections: Vec<Detection>, frame: Frame },
    /// Follow one label in Navigation mode
    StartTracking(String),
    StopTracking(StopTarget),
    /// Switch mode; `target` replaces the Navigation target when given
    SetMode {
        mode: NavigationMode,
        target: Option<String>,
    },
    Shutdown,
}

/// Everything the tracking thread needs
pub struct TrackingSetup {
    pub config: TrackingConfig,
    pub mode: NavigationMode,
    pub target: String,
    pub detector: Arc<dyn Detector>,
    pub factory: Box<dyn TrackerFactory>,
    pub source: Box<dyn FrameSource>,
    /// Period of `advance`, normally one audio quantum
    pub tick: Duration,
}

/// Handle to the tracking thread
pub struct TrackingCoordinator {
    command_tx: Sender<TrackingCommand>,
    snapshots: Arc<SnapshotCell>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl TrackingCoordinator {
    /// Create and start the tracking thread
    pub fn new(setup: TrackingSetup) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("reacquisition")
            .enable_time()
            .build()
            .map_err(EngineError::Runtime)?;

        let (command_tx, command_rx) = unbounded();
        let snapshots = Arc::new(SnapshotCell::new());

        let handle = runtime.handle().clone();
        let cell = Arc::clone(&snapshots);
        let thread_handle = std::thread::Builder::new()
            .name("tracking".to_string())
            .spawn(move || {
                log::info!("Tracking thread started");
                let mut state = TrackingState::new(setup, handle, cell);
                state.run(command_rx);
                log::info!("Tracking thread stopped");
            })
            .map_err(EngineError::Spawn)?;

        Ok(Self {
            command_tx,
            snapshots,
            thread_handle: Some(thread_handle),
            runtime: Some(runtime),
        })
    }

    /// Send a command to the tracking thread
    pub fn send_command(&self, command: TrackingCommand) -> Result<(), EngineError> {
        self.command_tx.send(command).map_err(|_| EngineError::ChannelClosed)
    }

    pub fn apply_detections(&self, detections: Vec<Detection>, frame: Frame) -> Result<(), EngineError> {
        self.send_command(TrackingCommand::Detections { detections, frame })
    }

    pub fn start_tracking(&self, label: &str) -> Result<(), EngineError> {
        self.send_command(TrackingCommand::StartTracking(label.to_string()))
    }

    pub fn stop_tracking(&self, target: StopTarget) -> Result<(), EngineError> {
        self.send_command(TrackingCommand::StopTracking(target))
    }

    pub fn set_mode(&self, mode: NavigationMode, target: Option<String>) -> Result<(), EngineError> {
        self.send_command(TrackingCommand::SetMode { mode, target })
    }

    /// Read handle for the audio side
    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader::new(Arc::clone(&self.snapshots))
    }

    pub fn snapshot(&self) -> Arc<TrackSnapshot> {
        self.snapshots.load()
    }

    /// Stop the tracking thread and abort pending detector requests
    pub fn shutdown(&mut self) {
        self.send_command(TrackingCommand::Shutdown).ok();
        if let Some(handle) = self.thread_handle.take() {
            handle.join().ok();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for TrackingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the tracking thread
struct TrackingState {
    tracks: TrackSet,
    scheduler: ReacquisitionScheduler,
    outcome_rx: Receiver<ReacquisitionOutcome>,
    source: Box<dyn FrameSource>,
    snapshots: Arc<SnapshotCell>,
    config: TrackingConfig,
    target: String,
    frame: Option<Frame>,
    source_exhausted: bool,
    tick: Duration,
    last_tick: Instant,
}

impl TrackingState {
    fn new(setup: TrackingSetup, runtime: tokio::runtime::Handle, snapshots: Arc<SnapshotCell>) -> Self {
        let (outcome_tx, outcome_rx) = unbounded();
        let profile = ModeProfile::for_mode(setup.mode, &setup.target);
        let scheduler = ReacquisitionScheduler::new(runtime, setup.detector, &setup.config, outcome_tx);
        Self {
            tracks: TrackSet::new(setup.config.clone(), profile, setup.factory),
            scheduler,
            outcome_rx,
            source: setup.source,
            snapshots,
            config: setup.config,
            target: setup.target,
            frame: None,
            source_exhausted: false,
            tick: setup.tick.max(Duration::from_millis(1)),
            last_tick: Instant::now(),
        }
    }

    fn run(&mut self, command_rx: Receiver<TrackingCommand>) {
        let outcome_rx = self.outcome_rx.clone();
        let mut next_tick = Instant::now() + self.tick;

        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            select! {
                recv(command_rx) -> command => match command {
                    Ok(TrackingCommand::Shutdown) | Err(_) => break,
                    Ok(command) => self.handle_command(command, Instant::now()),
                },
                recv(outcome_rx) -> outcome => {
                    if let Ok(outcome) = outcome {
                        self.merge_outcome(outcome, Instant::now());
                    }
                },
                default(wait) => {},
            }

            let now = Instant::now();
            if now >= next_tick {
                self.tick(now);
                next_tick = now + self.tick;
            }
        }

        self.scheduler.cancel_all();
    }

    fn handle_command(&mut self, command: TrackingCommand, now: Instant) {
        match command {
            TrackingCommand::Detections { detections, frame } => {
                let report = self.tracks.apply_detections(&detections, &frame, now);
                self.scheduler.cancel(&report.evicted);
            }
            TrackingCommand::StartTracking(label) => {
                log::info!("Start tracking '{}'", label);
                self.target = label;
                self.change_profile(ModeProfile::for_mode(NavigationMode::Navigation, &self.target));
                self.force_scan(now);
            }
            TrackingCommand::StopTracking(target) => {
                let removed = self.tracks.stop_tracking(&target);
                self.scheduler.cancel(&removed);
            }
            TrackingCommand::SetMode { mode, target } => {
                if let Some(target) = target {
                    self.target = target;
                }
                self.change_profile(ModeProfile::for_mode(mode, &self.target));
            }
            TrackingCommand::Shutdown => {}
        }
        self.publish(now);
    }

    fn change_profile(&mut self, profile: ModeProfile) {
        let removed = self.tracks.set_profile(profile);
        self.scheduler.cancel(&removed);
    }

    fn merge_outcome(&mut self, outcome: ReacquisitionOutcome, now: Instant) {
        self.scheduler.complete(outcome.kind);

        let report = self.tracks.apply_detections(outcome.detections(), &outcome.frame, now);
        self.scheduler.cancel(&report.evicted);

        if let RequestKind::Reacquire(id) = outcome.kind
            && !report.updated.contains(&id)
        {
            log::debug!("Re-acquisition for track {} found no match", id);
        }
        self.publish(now);
    }

    /// One quantum: new frame, advance, dispatch requests, publish
    fn tick(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        if !self.source_exhausted {
            match self.source.next_frame() {
                Some(frame) => self.frame = Some(frame),
                None => {
                    log::info!("Frame source exhausted, holding last frame");
                    self.source_exhausted = true;
                }
            }
        }
        let Some(frame) = self.frame.clone() else {
            return;
        };

        let report = self.tracks.advance(dt, &frame, now);
        self.scheduler.cancel(&report.expired);
        self.dispatch(now, &frame);
        self.publish(now);
    }

    /// The first request for a LOST track goes out on the tick it is lost;
    /// `reacquire_cooldown` spaces every later request for that track
    fn dispatch(&mut self, now: Instant, frame: &Frame) {
        let candidates: Vec<TrackId> = self.tracks.unconfirmed_ids();
        for id in self.scheduler.poll(now, &candidates, frame) {
            self.tracks.mark_reacquiring(id);
        }
        if let Some(interval) = self.config.scan_interval() {
            self.scheduler.scan(now, interval, frame);
        }
    }

    fn force_scan(&mut self, now: Instant) {
        if let Some(frame) = self.frame.clone() {
            self.scheduler.scan(now, Duration::ZERO, &frame);
        }
    }

    fn publish(&self, now: Instant) {
        self.snapshots.publish(self.tracks.snapshot(now));
    }
}

