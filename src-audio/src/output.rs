// ============================================================================
// Output Sinks - cpal Device and WAV Recorder
// ============================================================================
//
// The render thread hands finished quanta to an AudioSink. The device sink
// feeds a bounded crossbeam queue drained by the cpal callback; the callback
// never locks and fills missing data with silence. Played buffers travel back
// on a second queue so the callback neither allocates nor frees.

use crate::config::AudioConfig;
use crate::mixer::MixBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam::channel::{Receiver, Sender, bounded};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Errors from output devices and files
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to enumerate devices: {0}")]
    Devices(String),

    #[error("Failed to build output stream: {0}")]
    BuildStream(String),

    #[error("Failed to start output stream: {0}")]
    PlayStream(String),

    #[error("Failed to spawn playback thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Output closed")]
    Closed,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Destination for mixed quanta
pub trait AudioSink: Send {
    fn write(&mut self, buffer: &MixBuffer) -> Result<(), OutputError>;

    /// Whether `write` blocks at the playback rate
    fn is_paced(&self) -> bool {
        false
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Names of the host's output devices
pub fn list_output_devices() -> Result<Vec<String>, OutputError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| OutputError::Devices(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn select_device(output_device: Option<&str>) -> Result<Device, OutputError> {
    let host = cpal::default_host();
    if let Some(wanted) = output_device {
        log::info!("Looking for output device '{}'", wanted);
        let found = host
            .output_devices()
            .map_err(|e| OutputError::Devices(e.to_string()))?
            .find(|d| d.name().map(|name| name.contains(wanted)).unwrap_or(false));
        match found {
            Some(device) => return Ok(device),
            None => log::warn!("Output device '{}' not found, using default", wanted),
        }
    }
    host.default_output_device().ok_or(OutputError::NoDevice)
}

// ----------------------------------------------------------------------------
// Device sink
// ----------------------------------------------------------------------------

/// Counters shared with the cpal callback
#[derive(Debug, Default)]
pub struct PlaybackStats {
    underruns: AtomicU64,
    frames_played: AtomicU64,
}

impl PlaybackStats {
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }
}

/// Audio device output; the cpal stream lives on its own "playback" thread
pub struct DeviceSink {
    queue_tx: Sender<Vec<f32>>,
    recycle_rx: Receiver<Vec<f32>>,
    shutdown_tx: Sender<()>,
    stats: Arc<PlaybackStats>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl DeviceSink {
    /// Open the configured device and start the stream
    pub fn open(config: &AudioConfig) -> Result<Self, OutputError> {
        let (queue_tx, queue_rx) = bounded::<Vec<f32>>(config.queue_quanta);
        // Room for every buffer in circulation: queued, playing and being written
        let (recycle_tx, recycle_rx) = bounded::<Vec<f32>>(config.queue_quanta + 2);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), OutputError>>(1);
        let stats = Arc::new(PlaybackStats::default());

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let output_device = config.output_device.clone();
        let thread_stats = Arc::clone(&stats);

        let thread_handle = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let stream = select_device(output_device.as_deref()).and_then(|device| {
                    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                    log::info!(
                        "Using output device '{}' ({} Hz, {} channels)",
                        name,
                        stream_config.sample_rate.0,
                        stream_config.channels
                    );
                    let stream = build_output_stream(
                        &device,
                        &stream_config,
                        queue_rx,
                        recycle_tx,
                        Arc::clone(&thread_stats),
                    )?;
                    stream.play().map_err(|e| OutputError::PlayStream(e.to_string()))?;
                    Ok(stream)
                });

                match stream {
                    Ok(stream) => {
                        ready_tx.send(Ok(())).ok();
                        run_playback_thread(&thread_stats, &shutdown_rx);
                        drop(stream);
                        log::info!("Playback thread stopped");
                    }
                    Err(e) => {
                        ready_tx.send(Err(e)).ok();
                    }
                }
            })
            .map_err(OutputError::Spawn)?;

        let mut sink = Self {
            queue_tx,
            recycle_rx,
            shutdown_tx,
            stats,
            thread_handle: Some(thread_handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(sink),
            Ok(Err(e)) => {
                sink.shutdown();
                Err(e)
            }
            Err(_) => {
                sink.shutdown();
                Err(OutputError::Closed)
            }
        }
    }

    pub fn stats(&self) -> Arc<PlaybackStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown(&mut self) {
        self.shutdown_tx.try_send(()).ok();
        if let Some(handle) = self.thread_handle.take() {
            handle.join().ok();
        }
    }
}

impl AudioSink for DeviceSink {
    fn write(&mut self, buffer: &MixBuffer) -> Result<(), OutputError> {
        let mut samples = self.recycle_rx.try_recv().unwrap_or_default();
        samples.clear();
        samples.extend_from_slice(&buffer.samples);
        // Blocks while the queue is full: the device clock paces rendering
        self.queue_tx.send(samples).map_err(|_| OutputError::Closed)
    }

    fn is_paced(&self) -> bool {
        true
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Keeps the stream alive and reports underruns, one message per burst
fn run_playback_thread(stats: &PlaybackStats, shutdown_rx: &Receiver<()>) {
    let mut reported = 0u64;
    loop {
        match shutdown_rx.recv_timeout(Duration::from_millis(500)) {
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => {
                let underruns = stats.underruns();
                if underruns > reported {
                    log::warn!(
                        "Audio underrun: {} callback(s) filled with silence ({} total)",
                        underruns - reported,
                        underruns
                    );
                    reported = underruns;
                }
            }
            _ => break,
        }
    }
}

/// Build the cpal output stream pulling quanta from `queue_rx`
fn build_output_stream(
    device: &Device,
    config: &StreamConfig,
    queue_rx: Receiver<Vec<f32>>,
    recycle_tx: Sender<Vec<f32>>,
    stats: Arc<PlaybackStats>,
) -> Result<Stream, OutputError> {
    let channels = config.channels.max(1) as u64;
    let mut pending: Vec<f32> = Vec::new();
    let mut position = 0usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let underrun = fill_from_queue(data, &queue_rx, &recycle_tx, &mut pending, &mut position);
                if underrun {
                    stats.underruns.fetch_add(1, Ordering::Relaxed);
                }
                stats.frames_played.fetch_add(data.len() as u64 / channels, Ordering::Relaxed);
            },
            |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| OutputError::BuildStream(e.to_string()))
}

/// Copy queued samples into `data`; returns true when the queue ran dry and
/// the remainder was filled with silence. Exhausted buffers are handed to
/// `recycle_tx` instead of being dropped here.
pub fn fill_from_queue(
    data: &mut [f32],
    queue_rx: &Receiver<Vec<f32>>,
    recycle_tx: &Sender<Vec<f32>>,
    pending: &mut Vec<f32>,
    position: &mut usize,
) -> bool {
    let mut filled = 0;
    while filled < data.len() {
        if *position >= pending.len() {
            match queue_rx.try_recv() {
                Ok(next) => {
                    let played = std::mem::replace(pending, next);
                    // Only fails once the sink is gone
                    recycle_tx.try_send(played).ok();
                    *position = 0;
                    continue;
                }
                Err(_) => {
                    data[filled..].fill(0.0);
                    return true;
                }
            }
        }
        let count = (pending.len() - *position).min(data.len() - filled);
        data[filled..filled + count].copy_from_slice(&pending[*position..*position + count]);
        *position += count;
        filled += count;
    }
    false
}

// ----------------------------------------------------------------------------
// WAV sink
// ----------------------------------------------------------------------------

/// Records quanta to a 32-bit float WAV file
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    frames_written: u64,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self, OutputError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec)?;
        log::info!("Recording to {}", path.display());
        Ok(Self {
            writer: Some(writer),
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, buffer: &MixBuffer) -> Result<(), OutputError> {
        let writer = self.writer.as_mut().ok_or(OutputError::Closed)?;
        for &sample in &buffer.samples {
            writer.write_sample(sample)?;
        }
        self.frames_written += buffer.frames() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("Failed to finalize WAV file: {}", e);
        }
    }
}

// ----------------------------------------------------------------------------
// Fan-out
// ----------------------------------------------------------------------------

/// Writes every quantum to several sinks
pub struct TeeSink {
    sinks: Vec<Box<dyn AudioSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Box<dyn AudioSink>>) -> Self {
        Self { sinks }
    }
}

impl AudioSink for TeeSink {
    fn write(&mut self, buffer: &MixBuffer) -> Result<(), OutputError> {
        for sink in &mut self.sinks {
            sink.write(buffer)?;
        }
        Ok(())
    }

    fn is_paced(&self) -> bool {
        self.sinks.iter().any(|s| s.is_paced())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        Ok(())
    }
}
