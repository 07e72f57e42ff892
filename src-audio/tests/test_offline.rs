use navguide_audio::{AudioSink, MixBuffer, OutputError, Settings, WavSink, render_scene};
use navguide_tracking::NavigationMode;
use navguide_tracking::sim::Scene;
use std::sync::Arc;
use tempfile::tempdir;

/// Keeps every quantum in memory
#[derive(Default)]
struct CollectSink {
    quanta: Vec<MixBuffer>,
    finished: bool,
}

impl AudioSink for CollectSink {
    fn write(&mut self, buffer: &MixBuffer) -> Result<(), OutputError> {
        self.quanta.push(buffer.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.finished = true;
        Ok(())
    }
}

#[test]
fn test_render_demo_to_wav() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("demo.wav");
    let settings = Settings::default();
    let audio = &settings.audio;

    let mut sink = WavSink::create(&path, audio.sample_rate, audio.channels).unwrap();
    let report = render_scene(
        Arc::new(Scene::demo(3.0)),
        &settings,
        NavigationMode::Exploration,
        "door",
        &mut sink,
    )
    .unwrap();
    drop(sink);

    let quantum_s = audio.quantum_frames as f64 / audio.sample_rate as f64;
    assert_eq!(report.quanta, (3.0 / quantum_s).ceil() as u64);
    assert!(report.detector_calls >= 2);
    assert!(report.max_tracks >= 3);
    assert!(report.peak > 0.0 && report.peak <= 1.0);

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, audio.sample_rate);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    assert_eq!(reader.duration() as u64, report.quanta * audio.quantum_frames as u64);
}

#[test]
fn test_occluded_object_is_lost_and_recovered() {
    let settings = Settings::default();
    let mut sink = CollectSink::default();
    // Chair is hidden between 3.0 s and 4.5 s
    let report = render_scene(
        Arc::new(Scene::demo(10.0)),
        &settings,
        NavigationMode::Exploration,
        "door",
        &mut sink,
    )
    .unwrap();

    assert!(sink.finished);
    assert!(report.lost_events >= 1);
    assert_eq!(report.expired_events, 0);
    assert!(sink.quanta.iter().all(|q| q.peak() <= 1.0));
}

#[test]
fn test_social_mode_only_hears_people() {
    let settings = Settings::default();
    let mut sink = CollectSink::default();
    let report = render_scene(
        Arc::new(Scene::demo(2.0)),
        &settings,
        NavigationMode::Social,
        "door",
        &mut sink,
    )
    .unwrap();

    assert_eq!(report.max_tracks, 1);
    assert!(report.silent_quanta < report.quanta);
}

#[test]
fn test_empty_scene_is_silent() {
    let settings = Settings::default();
    let mut sink = CollectSink::default();
    let report = render_scene(
        Arc::new(Scene::new(Vec::new(), 30.0, 1.0)),
        &settings,
        NavigationMode::Exploration,
        "door",
        &mut sink,
    )
    .unwrap();

    assert_eq!(report.silent_quanta, report.quanta);
    assert!(sink.quanta.iter().all(|q| q.is_silent()));
}
