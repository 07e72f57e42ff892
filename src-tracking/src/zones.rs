// ============================================================================
// Proximity Zone Evaluator
// ============================================================================
//
// distance -> {SAFE, CAUTION, WARNING} with hysteresis. A boundary adjacent to
// the zone currently held is pushed outward by the hysteresis margin, so the
// zone only changes once the boundary has been crossed by that margin. One
// evaluation moves at most one level, so SAFE -> WARNING passes CAUTION.

use crate::config::ZoneThresholds;
use crate::track::Zone;

#[derive(Debug, Clone)]
pub struct ProximityZoneEvaluator {
    thresholds: ZoneThresholds,
}

impl ProximityZoneEvaluator {
    pub fn new(thresholds: ZoneThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ZoneThresholds {
        &self.thresholds
    }

    /// Zone the distance belongs to, given the hysteresis state `current`
    ///
    /// Without a current zone the raw boundaries are used.
    pub fn target_zone(&self, distance: f32, current: Option<Zone>) -> Zone {
        let margin = self.thresholds.hysteresis_m;
        let boundaries = [
            (self.thresholds.caution_m, Zone::Caution),
            (self.thresholds.warning_m, Zone::Warning),
        ];

        let mut level = 0;
        for (boundary, inner) in boundaries {
            let effective = match current {
                None => boundary,
                Some(zone) if zone >= inner => boundary + margin,
                Some(_) => boundary - margin,
            };
            if distance < effective {
                level = inner.level();
            }
        }
        Zone::from_level(level)
    }

    /// Next zone for a track currently in `current`
    pub fn evaluate(&self, distance: f32, current: Option<Zone>) -> Zone {
        let target = self.target_zone(distance, current);
        match current {
            None => target,
            Some(zone) => {
                let (from, to) = (zone.level(), target.level());
                if to > from {
                    Zone::from_level(from + 1)
                } else if to < from {
                    Zone::from_level(from - 1)
                } else {
                    zone
                }
            }
        }
    }
}

impl Default for ProximityZoneEvaluator {
    fn default() -> Self {
        Self::new(ZoneThresholds::default())
    }
}
