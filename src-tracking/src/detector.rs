// ============================================================================
// Detector Interface
// ============================================================================
//
// The detector is an external, slow, rate-limited service. It is only ever
// called asynchronously; its futures run on the re-acquisition runtime.

use crate::frame::Frame;
use crate::geometry::BBox;
use futures::future::BoxFuture;
use serde::Deserialize;

/// Errors reported by a detector backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("Detector request timed out")]
    Timeout,

    #[error("Detector network error: {0}")]
    Network(String),

    #[error("Malformed detector response: {0}")]
    MalformedResponse(String),

    #[error("Detector unavailable: {0}")]
    Unavailable(String),
}

/// One labelled object reported by the detector
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    /// Context suffix split from the label ("Phone [on desk]" -> "on desk")
    pub context: Option<String>,
    pub bbox: BBox,
    pub confidence: f32,
}

impl Detection {
    /// Create a detection, splitting any bracketed context off the label
    pub fn new(label: &str, bbox: BBox, confidence: f32) -> Self {
        let (label, context) = split_context(label);
        Self {
            label,
            context,
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Asynchronous object detector
pub trait Detector: Send + Sync {
    /// Detect objects in `frame`
    fn detect(&self, frame: Frame) -> BoxFuture<'static, Result<Vec<Detection>, DetectorError>>;
}

/// Split "Label [context]" into its parts
pub fn split_context(raw: &str) -> (String, Option<String>) {
    if let (Some(open), Some(close)) = (raw.find('['), raw.rfind(']')) {
        if open < close {
            let label = raw[..open].trim().to_string();
            let context = raw[open + 1..close].trim();
            let context = (!context.is_empty()).then(|| context.to_string());
            return (label, context);
        }
    }
    (raw.trim().to_string(), None)
}

/// Boxes narrower or shorter than this fraction of the frame are discarded
const MIN_BOX_SIDE: f32 = 0.005;

/// Wire representation: `box_2d` is [ymin, xmin, ymax, xmax] in 0..1000
#[derive(Debug, Deserialize)]
struct RawDetection {
    box_2d: Vec<f64>,
    label: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// Parse a detector JSON response into detections
///
/// Entries with a malformed box or a degenerate size are skipped; a response
/// that is not a JSON array of detections is an error.
pub fn parse_detections(json: &str) -> Result<Vec<Detection>, DetectorError> {
    let cleaned = strip_code_fence(json);
    let raw: Vec<RawDetection> = serde_json::from_str(cleaned)
        .map_err(|e| DetectorError::MalformedResponse(e.to_string()))?;

    let mut detections = Vec::with_capacity(raw.len());
    for entry in raw {
        let [y_min, x_min, y_max, x_max] = match entry.box_2d.as_slice() {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => {
                log::debug!("Skipping detection '{}' with malformed box", entry.label);
                continue;
            }
        };
        let to_unit = |v: f64| (v / 1000.0) as f32;
        let bbox = BBox::from_corners(to_unit(x_min), to_unit(y_min), to_unit(x_max), to_unit(y_max));
        if bbox.width < MIN_BOX_SIDE || bbox.height < MIN_BOX_SIDE {
            log::debug!("Skipping degenerate detection '{}'", entry.label);
            continue;
        }
        detections.push(Detection::new(&entry.label, bbox, entry.confidence));
    }
    Ok(detections)
}

/// Responses from language-model detectors are often wrapped in ```json fences
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
