// ============================================================================
// Offline Rendering
// ============================================================================
//
// Plays a scripted scene through the TrackSet and the render pipeline in
// simulated time, quantum by quantum, with no device and no threads. The
// detector is answered synchronously from the script: on every scan and,
// subject to the re-acquisition cooldown, while a track is lost.

use crate::config::Settings;
use crate::output::{AudioSink, OutputError};
use crate::render::RenderPipeline;
use crate::signatures::AudioSignatureTable;
use navguide_tracking::sim::{Scene, SceneTrackerFactory};
use navguide_tracking::{Frame, ModeProfile, NavigationMode, TrackSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary of an offline render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfflineReport {
    pub quanta: u64,
    pub peak: f32,
    pub detector_calls: u64,
    pub max_tracks: usize,
    pub lost_events: usize,
    pub expired_events: usize,
    pub silent_quanta: u64,
}

/// Render `scene` in `mode` into `sink`
pub fn render_scene(
    scene: Arc<Scene>,
    settings: &Settings,
    mode: NavigationMode,
    target: &str,
    sink: &mut dyn AudioSink,
) -> Result<OfflineReport, OutputError> {
    let audio = &settings.audio;
    let tracking = &settings.tracking;
    let quantum = audio.quantum();
    let quanta = (scene.duration / quantum.as_secs_f64()).ceil() as u64;

    let mut tracks = TrackSet::new(
        tracking.clone(),
        ModeProfile::for_mode(mode, target),
        Box::new(SceneTrackerFactory::new(Arc::clone(&scene))),
    );
    let mut pipeline = RenderPipeline::new(audio, AudioSignatureTable::default());
    let mut report = OfflineReport::default();

    let start = Instant::now();
    let mut last_scan: Option<Duration> = None;
    let mut last_reacquire: Option<Duration> = None;

    log::info!("Rendering {:.1}s scene offline ({} quanta)", scene.duration, quanta);
    for index in 0..quanta {
        let elapsed = quantum * index as u32;
        let now = start + elapsed;
        let t = elapsed.as_secs_f64();
        let frame = Frame::blank((t * scene.fps) as u64, 640, 480, now);

        let scan_due = match (tracking.scan_interval(), last_scan) {
            (_, None) => true,
            (Some(interval), Some(last)) => elapsed.saturating_sub(last) >= interval,
            (None, Some(_)) => false,
        };
        let reacquire_due = tracks.tracks().any(|t| t.state.is_unconfirmed())
            && last_reacquire.is_none_or(|last| elapsed.saturating_sub(last) >= tracking.reacquire_cooldown());

        if reacquire_due {
            for id in tracks.unconfirmed_ids() {
                tracks.mark_reacquiring(id);
            }
        }
        if scan_due || reacquire_due {
            let detections = scene.detections_at(t);
            let applied = tracks.apply_detections(&detections, &frame, now);
            log::debug!(
                "t={:.2}s detector: {} created, {} updated, {} evicted",
                t,
                applied.created.len(),
                applied.updated.len(),
                applied.evicted.len()
            );
            report.detector_calls += 1;
            if scan_due {
                last_scan = Some(elapsed);
            }
            if reacquire_due {
                last_reacquire = Some(elapsed);
            }
        }

        let advanced = tracks.advance(quantum, &frame, now);
        report.lost_events += advanced.lost.len();
        report.expired_events += advanced.expired.len();

        let snapshot = tracks.snapshot(now);
        report.max_tracks = report.max_tracks.max(snapshot.len());

        let buffer = pipeline.render(&snapshot);
        report.peak = report.peak.max(buffer.peak());
        if buffer.is_silent() {
            report.silent_quanta += 1;
        }
        sink.write(&buffer)?;
        report.quanta += 1;
    }
    sink.finish()?;

    log::info!(
        "Offline render done: {} quanta, peak {:.3}, {} detector calls, limiter active in {} quanta",
        report.quanta,
        report.peak,
        report.detector_calls,
        pipeline.limited_quanta()
    );
    Ok(report)
}
