// ============================================================================
// Re-acquisition Scheduler
// ============================================================================
//
// Dispatches detector requests for lost tracks (and periodic full-frame
// scans) onto a tokio runtime. Requests never run on the tracking or audio
// threads; results come back through a crossbeam completion channel and are
// merged by the tracking thread through the normal detection path.

use crate::config::TrackingConfig;
use crate::detector::{Detection, Detector, DetectorError};
use crate::frame::Frame;
use crate::track::TrackId;
use crossbeam::channel::Sender;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// What a detector request was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Reacquire(TrackId),
    Scan,
}

/// Completed detector request, delivered to the tracking thread
#[derive(Debug, Clone)]
pub struct ReacquisitionOutcome {
    pub kind: RequestKind,
    /// Frame the request was issued on
    pub frame: Frame,
    pub result: Result<Vec<Detection>, DetectorError>,
    pub attempts: u32,
}

impl ReacquisitionOutcome {
    /// Detections to merge; failures surface as an empty result
    pub fn detections(&self) -> &[Detection] {
        match &self.result {
            Ok(detections) => detections,
            Err(_) => &[],
        }
    }
}

/// Bounded retry with doubling backoff and a per-attempt timeout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
            timeout: config.request_timeout(),
        }
    }
}

/// Rate-limits and dispatches asynchronous detector requests
pub struct ReacquisitionScheduler {
    runtime: Handle,
    detector: Arc<dyn Detector>,
    policy: RetryPolicy,
    cooldown: Duration,
    completions: Sender<ReacquisitionOutcome>,
    last_request: HashMap<RequestKind, Instant>,
    in_flight: HashMap<RequestKind, JoinHandle<()>>,
    dispatched: u64,
}

impl ReacquisitionScheduler {
    pub fn new(
        runtime: Handle,
        detector: Arc<dyn Detector>,
        config: &TrackingConfig,
        completions: Sender<ReacquisitionOutcome>,
    ) -> Self {
        Self {
            runtime,
            detector,
            policy: RetryPolicy::from_config(config),
            cooldown: config.reacquire_cooldown(),
            completions,
            last_request: HashMap::new(),
            in_flight: HashMap::new(),
            dispatched: 0,
        }
    }

    /// Total number of requests dispatched so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, kind: RequestKind) -> bool {
        self.in_flight.contains_key(&kind)
    }

    /// Dispatch requests for `candidates` that are neither in flight nor
    /// cooling down; returns the tracks a request was issued for
    pub fn poll(&mut self, now: Instant, candidates: &[TrackId], frame: &Frame) -> Vec<TrackId> {
        self.reap_finished();

        let mut issued = Vec::new();
        for &id in candidates {
            let kind = RequestKind::Reacquire(id);
            if self.try_dispatch(kind, self.cooldown, now, frame) {
                issued.push(id);
            }
        }
        issued
    }

    /// Dispatch a full-frame scan if `interval` has elapsed since the last one
    pub fn scan(&mut self, now: Instant, interval: Duration, frame: &Frame) -> bool {
        self.reap_finished();
        self.try_dispatch(RequestKind::Scan, interval, now, frame)
    }

    /// Forget a request once its outcome has been merged
    pub fn complete(&mut self, kind: RequestKind) {
        self.in_flight.remove(&kind);
    }

    /// Abort in-flight requests for tracks no longer of interest
    pub fn cancel(&mut self, ids: &[TrackId]) {
        for &id in ids {
            let kind = RequestKind::Reacquire(id);
            self.last_request.remove(&kind);
            if let Some(handle) = self.in_flight.remove(&kind) {
                handle.abort();
                log::debug!("Cancelled re-acquisition for track {}", id);
            }
        }
    }

    /// Abort everything, including a pending scan
    pub fn cancel_all(&mut self) {
        for (kind, handle) in self.in_flight.drain() {
            handle.abort();
            log::debug!("Cancelled {:?}", kind);
        }
        self.last_request.clear();
    }

    fn reap_finished(&mut self) {
        self.in_flight.retain(|_, handle| !handle.is_finished());
    }

    fn try_dispatch(&mut self, kind: RequestKind, cooldown: Duration, now: Instant, frame: &Frame) -> bool {
        if self.in_flight.contains_key(&kind) {
            return false;
        }
        if let Some(&last) = self.last_request.get(&kind)
            && now.saturating_duration_since(last) < cooldown
        {
            return false;
        }

        let detector = Arc::clone(&self.detector);
        let completions = self.completions.clone();
        let policy = self.policy;
        let frame = frame.clone();

        let handle = self.runtime.spawn(async move {
            let (result, attempts) = request_with_retry(detector.as_ref(), &frame, policy).await;
            if let Err(e) = &result {
                log::warn!("{:?} failed after {} attempt(s): {}", kind, attempts, e);
            }
            let outcome = ReacquisitionOutcome {
                kind,
                frame,
                result,
                attempts,
            };
            if completions.send(outcome).is_err() {
                log::debug!("Tracking thread gone, dropping {:?} outcome", kind);
            }
        });

        match kind {
            RequestKind::Reacquire(id) => log::info!("Re-acquisition dispatched for track {}", id),
            RequestKind::Scan => log::debug!("Periodic scan dispatched"),
        }
        self.last_request.insert(kind, now);
        self.in_flight.insert(kind, handle);
        self.dispatched += 1;
        true
    }
}

impl Drop for ReacquisitionScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
    }
}

/// Run one detector request, retrying errors with doubling backoff
pub async fn request_with_retry(
    detector: &dyn Detector,
    frame: &Frame,
    policy: RetryPolicy,
) -> (Result<Vec<Detection>, DetectorError>, u32) {
    let mut backoff = policy.backoff;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, detector.detect(frame.clone())).await {
            Ok(result) => result,
            Err(_) => Err(DetectorError::Timeout),
        };
        match result {
            Ok(detections) => return (Ok(detections), attempt),
            Err(e) if attempt < policy.max_attempts => {
                log::warn!(
                    "Detector attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    e,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
