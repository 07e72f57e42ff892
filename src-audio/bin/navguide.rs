use clap::{Parser, Subcommand, ValueEnum};
use navguide_audio::{
    AudioSignatureTable, AudioSink, DeviceSink, RenderThread, Settings, TeeSink, WavSink, init_logging,
    list_output_devices, render_scene,
};
use navguide_tracking::sim::{Scene, SceneDetector, SceneFrameSource, SceneTrackerFactory};
use navguide_tracking::{NavigationMode, TrackingCoordinator, TrackingSetup};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "navguide")]
#[command(about = "Spatial audio guidance driven by multi-object tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML file with `tracking:` and `audio:` sections
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available output devices
    Devices,

    /// Play the demo scene live on an output device
    Run {
        /// Output device name (substring match, default device otherwise)
        #[arg(short, long)]
        device: Option<String>,

        /// Also record the output to a WAV file
        #[arg(long, value_name = "FILE")]
        record: Option<PathBuf>,

        /// Scene length in seconds
        #[arg(short = 't', long, default_value = "20")]
        duration: f64,

        #[arg(short, long, value_enum, default_value_t = Mode::Exploration)]
        mode: Mode,

        /// Label to follow in navigation mode
        #[arg(long, default_value = "door")]
        target: String,

        /// Simulated detector latency in milliseconds
        #[arg(long, default_value = "150")]
        latency_ms: u64,
    },

    /// Render the demo scene offline into a WAV file
    Render {
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[arg(short = 't', long, default_value = "20")]
        duration: f64,

        #[arg(short, long, value_enum, default_value_t = Mode::Exploration)]
        mode: Mode,

        #[arg(long, default_value = "door")]
        target: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Navigation,
    Obstacle,
    Social,
    Exploration,
}

impl From<Mode> for NavigationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Navigation => NavigationMode::Navigation,
            Mode::Obstacle => NavigationMode::Obstacle,
            Mode::Social => NavigationMode::Social,
            Mode::Exploration => NavigationMode::Exploration,
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Devices => list_devices(),
        Commands::Run {
            device,
            record,
            duration,
            mode,
            target,
            latency_ms,
        } => {
            let mut settings = settings;
            if device.is_some() {
                settings.audio.output_device = device;
            }
            run_live(
                settings,
                duration,
                mode.into(),
                &target,
                Duration::from_millis(latency_ms),
                record.as_deref(),
            )
        }
        Commands::Render {
            output,
            duration,
            mode,
            target,
        } => render_offline(&settings, duration, mode.into(), &target, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, String> {
    match path {
        Some(path) => Settings::from_yaml_file(path).map_err(|e| format!("{}: {}", path.display(), e)),
        None => Ok(Settings::default()),
    }
}

fn list_devices() -> Result<(), String> {
    let devices = list_output_devices().map_err(|e| e.to_string())?;
    if devices.is_empty() {
        println!("No output devices found");
    }
    for (index, name) in devices.iter().enumerate() {
        println!("  [{}] {}", index, name);
    }
    Ok(())
}

fn run_live(
    settings: Settings,
    duration: f64,
    mode: NavigationMode,
    target: &str,
    latency: Duration,
    record: Option<&Path>,
) -> Result<(), String> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| format!("Failed to set Ctrl+C handler: {}", e))?;

    let scene = Arc::new(Scene::demo(duration));
    let audio = settings.audio.clone();

    let mut coordinator = TrackingCoordinator::new(TrackingSetup {
        config: settings.tracking.clone(),
        mode,
        target: target.to_string(),
        detector: Arc::new(SceneDetector::new(Arc::clone(&scene), latency)),
        factory: Box::new(SceneTrackerFactory::new(Arc::clone(&scene))),
        source: Box::new(SceneFrameSource::new(Arc::clone(&scene))),
        tick: audio.quantum(),
    })
    .map_err(|e| e.to_string())?;

    let device = DeviceSink::open(&audio).map_err(|e| e.to_string())?;
    let playback = device.stats();
    let sink: Box<dyn AudioSink> = match record {
        Some(path) => {
            let wav = WavSink::create(path, audio.sample_rate, audio.channels).map_err(|e| e.to_string())?;
            let sinks: Vec<Box<dyn AudioSink>> = vec![Box::new(device), Box::new(wav)];
            Box::new(TeeSink::new(sinks))
        }
        None => Box::new(device),
    };

    let mut render = RenderThread::new(
        audio,
        AudioSignatureTable::default(),
        coordinator.snapshot_reader(),
        sink,
    )
    .map_err(|e| e.to_string())?;

    println!("Playing {:.0}s demo scene in {} mode (Ctrl+C to stop)", duration, mode);
    let started = Instant::now();
    let mut last_report = started;
    while running.load(Ordering::SeqCst) && started.elapsed().as_secs_f64() < duration {
        std::thread::sleep(Duration::from_millis(100));
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let snapshot = coordinator.snapshot();
            let status = render.status();
            let tracks: Vec<String> = snapshot
                .iter()
                .map(|t| format!("{}#{} {:?} {:.1}m {:?}", t.label, t.id, t.state, t.distance, t.zone))
                .collect();
            println!(
                "[{:5.1}s] voices={} peak={:.2} underruns={} | {}",
                started.elapsed().as_secs_f64(),
                status.voices,
                status.peak,
                playback.underruns(),
                tracks.join(", ")
            );
        }
    }

    render.shutdown();
    coordinator.shutdown();
    println!("Stopped after {} quanta", render.status().quanta);
    Ok(())
}

fn render_offline(
    settings: &Settings,
    duration: f64,
    mode: NavigationMode,
    target: &str,
    output: &Path,
) -> Result<(), String> {
    let scene = Arc::new(Scene::demo(duration));
    let mut sink = WavSink::create(output, settings.audio.sample_rate, settings.audio.channels)
        .map_err(|e| e.to_string())?;
    let report = render_scene(scene, settings, mode, target, &mut sink).map_err(|e| e.to_string())?;
    println!(
        "Wrote {} ({} quanta, peak {:.3}, {} detector calls, {} tracks lost, {} expired)",
        output.display(),
        report.quanta,
        report.peak,
        report.detector_calls,
        report.lost_events,
        report.expired_events
    );
    Ok(())
}
