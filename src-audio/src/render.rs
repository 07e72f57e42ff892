// ============================================================================
// Render Thread - Snapshot to PCM
// ============================================================================
//
// Renders one quantum per period. Every track in a quantum is rendered
// against the same snapshot; the tracking side is never locked.

use crate::config::AudioConfig;
use crate::cue::CueSynthesizer;
use crate::mixer::{MixBuffer, Mixer};
use crate::output::{AudioSink, OutputError};
use crate::signatures::AudioSignatureTable;
use crossbeam::channel::{Sender, TryRecvError, unbounded};
use navguide_tracking::{SnapshotReader, TrackSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// CueSynthesizer followed by the Mixer
pub struct RenderPipeline {
    synthesizer: CueSynthesizer,
    mixer: Mixer,
}

impl RenderPipeline {
    pub fn new(config: &AudioConfig, table: AudioSignatureTable) -> Self {
        Self {
            mixer: Mixer::new(
                config.quantum_frames,
                config.sample_rate,
                config.ceiling,
                config.limiter_release_ms,
            ),
            synthesizer: CueSynthesizer::new(config.clone(), table),
        }
    }

    /// Render one quantum against `snapshot`
    pub fn render(&mut self, snapshot: &TrackSnapshot) -> MixBuffer {
        let cues = self.synthesizer.render(snapshot);
        self.mixer.mix(&cues)
    }

    pub fn voice_count(&self) -> usize {
        self.synthesizer.voice_count()
    }

    pub fn limited_quanta(&self) -> u64 {
        self.mixer.limited_quanta()
    }
}

/// Latest figures from the render thread
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderStatus {
    pub quanta: u64,
    pub voices: usize,
    /// Peak of the last quantum after limiting
    pub peak: f32,
    /// Snapshot generation rendered last
    pub generation: u64,
    pub limited_quanta: u64,
}

/// Render thread commands
#[derive(Debug)]
pub enum RenderCommand {
    Shutdown,
}

/// Render thread handle
pub struct RenderThread {
    command_tx: Sender<RenderCommand>,
    status: Arc<Mutex<RenderStatus>>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl RenderThread {
    /// Create and start the render thread
    pub fn new(
        config: AudioConfig,
        table: AudioSignatureTable,
        snapshots: SnapshotReader,
        sink: Box<dyn AudioSink>,
    ) -> Result<Self, OutputError> {
        let (command_tx, command_rx) = unbounded();
        let status = Arc::new(Mutex::new(RenderStatus::default()));
        let shared = Arc::clone(&status);

        let thread_handle = std::thread::Builder::new()
            .name("render".to_string())
            .spawn(move || {
                log::info!(
                    "Render thread started ({} frames per quantum at {} Hz)",
                    config.quantum_frames,
                    config.sample_rate
                );
                let mut pipeline = RenderPipeline::new(&config, table);
                let mut sink = sink;
                let quantum = config.quantum();
                let mut next_deadline = Instant::now() + quantum;

                loop {
                    match command_rx.try_recv() {
                        Ok(RenderCommand::Shutdown) | Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    let snapshot = snapshots.load();
                    let buffer = pipeline.render(&snapshot);
                    if let Err(e) = sink.write(&buffer) {
                        log::error!("Output failed, stopping render thread: {}", e);
                        break;
                    }
                    {
                        let mut status = shared.lock();
                        status.quanta += 1;
                        status.voices = pipeline.voice_count();
                        status.peak = buffer.peak();
                        status.generation = snapshot.generation;
                        status.limited_quanta = pipeline.limited_quanta();
                    }

                    if !sink.is_paced() {
                        let now = Instant::now();
                        if next_deadline > now {
                            std::thread::sleep(next_deadline - now);
                        }
                        next_deadline += quantum;
                    }
                }

                if let Err(e) = sink.finish() {
                    log::error!("Failed to close output: {}", e);
                }
                log::info!("Render thread stopped");
            })
            .map_err(OutputError::Spawn)?;

        Ok(Self {
            command_tx,
            status,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn status(&self) -> RenderStatus {
        *self.status.lock()
    }

    /// Shutdown the render thread
    pub fn shutdown(&mut self) {
        self.command_tx.send(RenderCommand::Shutdown).ok();
        if let Some(handle) = self.thread_handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
