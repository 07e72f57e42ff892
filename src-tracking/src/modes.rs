// ============================================================================
// Operating Modes
// ============================================================================
//
// Static mode tables: which labels are of interest, how many objects may be
// tracked at once and which tracks the audio focuses on.

use crate::track::normalize_label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Operating mode selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    /// Follow one specific target
    Navigation,
    /// Avoid obstacles in the path
    Obstacle,
    /// Detect people
    Social,
    /// Everything around the user
    #[default]
    Exploration,
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigationMode::Navigation => "navigation",
            NavigationMode::Obstacle => "obstacle",
            NavigationMode::Social => "social",
            NavigationMode::Exploration => "exploration",
        };
        f.write_str(name)
    }
}

/// Which labels are relevant in the current mode
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelFilter {
    /// Broadcast mode: every label is relevant
    #[default]
    All,
    /// Only these normalized labels are relevant
    Only(BTreeSet<String>),
}

impl LabelFilter {
    pub fn only<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        LabelFilter::Only(labels.into_iter().map(|l| normalize_label(l.as_ref())).collect())
    }

    /// Whether a detector label passes the filter
    pub fn accepts(&self, label: &str) -> bool {
        match self {
            LabelFilter::All => true,
            LabelFilter::Only(labels) => labels.contains(&normalize_label(label)),
        }
    }
}

/// Which tracks the audio mix emphasizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFocus {
    /// Emphasize the most threatening tracks
    All,
    /// Emphasize the nearest track
    Closest,
    /// Emphasize tracks matching the target label
    Target(String),
    /// Emphasize people
    People,
}

/// Per-mode behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeProfile {
    pub mode: NavigationMode,
    pub max_objects: usize,
    pub label_filter: LabelFilter,
    pub audio_focus: AudioFocus,
    pub description: String,
}

impl ModeProfile {
    /// Profile for a mode; `target` is the Navigation target label
    pub fn for_mode(mode: NavigationMode, target: &str) -> Self {
        match mode {
            NavigationMode::Navigation => Self {
                mode,
                max_objects: 1,
                label_filter: LabelFilter::only([target]),
                audio_focus: AudioFocus::Target(normalize_label(target)),
                description: "Track a specific object".to_string(),
            },
            NavigationMode::Obstacle => Self {
                mode,
                max_objects: 5,
                label_filter: LabelFilter::All,
                audio_focus: AudioFocus::Closest,
                description: "Avoid obstacles in your path".to_string(),
            },
            NavigationMode::Social => Self {
                mode,
                max_objects: 5,
                label_filter: LabelFilter::only(["person"]),
                audio_focus: AudioFocus::People,
                description: "Detect people around you".to_string(),
            },
            NavigationMode::Exploration => Self {
                mode,
                max_objects: 5,
                label_filter: LabelFilter::All,
                audio_focus: AudioFocus::All,
                description: "Explore your environment".to_string(),
            },
        }
    }
}

impl Default for ModeProfile {
    fn default() -> Self {
        Self::for_mode(NavigationMode::default(), "")
    }
}
