//! Pair-count matcher for development without libfprint
//!
//! Counts probe minutiae that have a candidate minutia within a distance and
//! angle tolerance. The score is the share of paired probe points, 0..=100.
//! Good enough to drive the engine against simulated readers; it is not
//! rotation or translation invariant.

use super::{ensure_same_family, Matcher, PreparedProbe, RawScorer};
use crate::error::MatcherError;
use crate::template::{Minutia, MinutiaeSet};

const DEFAULT_DISTANCE_PX: i32 = 20;
const DEFAULT_ANGLE_DEG: i32 = 30;

/// Tolerance-based point pairing matcher
#[derive(Debug, Clone)]
pub struct PairCountMatcher {
    distance_px: i32,
    angle_deg: i32,
    raw_scores: bool,
}

impl Default for PairCountMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PairCountMatcher {
    pub fn new() -> Self {
        Self {
            distance_px: DEFAULT_DISTANCE_PX,
            angle_deg: DEFAULT_ANGLE_DEG,
            raw_scores: true,
        }
    }

    pub fn with_tolerance(mut self, distance_px: i32, angle_deg: i32) -> Self {
        self.distance_px = distance_px;
        self.angle_deg = angle_deg;
        self
    }

    /// Hide raw-score access, as on platforms where only the boolean API is
    /// reachable
    pub fn boolean_only(mut self) -> Self {
        self.raw_scores = false;
        self
    }

    fn pairs(&self, a: &Minutia, b: &Minutia) -> bool {
        let dx = (a.x - b.x) as i64;
        let dy = (a.y - b.y) as i64;
        let max = self.distance_px as i64;
        if dx * dx + dy * dy >= max * max {
            return false;
        }

        let diff = (a.theta - b.theta).rem_euclid(360);
        diff.min(360 - diff) < self.angle_deg
    }

    fn score(&self, probe: &MinutiaeSet, candidate: &MinutiaeSet) -> Result<i32, MatcherError> {
        ensure_same_family(probe, candidate)?;
        if probe.is_empty() || candidate.is_empty() {
            return Err(MatcherError::NoUsableFeatures);
        }

        let paired = probe
            .points()
            .iter()
            .filter(|p| candidate.points().iter().any(|c| self.pairs(p, c)))
            .count();

        Ok((paired * 100 / probe.len()) as i32)
    }
}

impl RawScorer for PairCountMatcher {
    fn prepare_probe(&self, probe: &MinutiaeSet) -> Result<PreparedProbe, MatcherError> {
        if probe.is_empty() {
            return Err(MatcherError::NoUsableFeatures);
        }
        Ok(PreparedProbe::new(probe.clone(), probe.len() as i32))
    }

    fn compare(
        &self,
        probe: &PreparedProbe,
        candidate: &MinutiaeSet,
    ) -> Result<i32, MatcherError> {
        self.score(&probe.set, candidate)
    }
}

impl Matcher for PairCountMatcher {
    fn name(&self) -> &str {
        "pair-count"
    }

    fn verify(
        &self,
        probe: &MinutiaeSet,
        candidate: &[MinutiaeSet],
        threshold: u32,
    ) -> Result<bool, MatcherError> {
        let mut usable = false;
        for sample in candidate {
            match self.score(probe, sample) {
                Ok(score) if score >= threshold as i32 => return Ok(true),
                Ok(_) => usable = true,
                Err(MatcherError::NoUsableFeatures) => {}
                Err(e) => return Err(e),
            }
        }

        if usable {
            Ok(false)
        } else {
            Err(MatcherError::NoUsableFeatures)
        }
    }

    fn raw_scorer(&self) -> Option<&dyn RawScorer> {
        if self.raw_scores {
            Some(self as &dyn RawScorer)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::AlgorithmFamily;

    fn set(points: &[(i32, i32, i32)]) -> MinutiaeSet {
        MinutiaeSet::new(
            AlgorithmFamily::Simulated,
            points.iter().map(|&(x, y, t)| Minutia::new(x, y, t)).collect(),
        )
    }

    #[test]
    fn test_score_counts_paired_probe_points() {
        let m = PairCountMatcher::new();
        let probe = set(&[(10, 10, 0), (100, 100, 90), (200, 200, 180), (300, 50, 270)]);
        // Two near, one too far, one rotated too much
        let cand = set(&[(12, 11, 5), (105, 98, 80), (260, 200, 180), (300, 50, 200)]);
        assert_eq!(m.score(&probe, &cand), Ok(50));
        assert_eq!(m.score(&probe, &probe), Ok(100));
    }

    #[test]
    fn test_angle_wraps_around() {
        let m = PairCountMatcher::new();
        let probe = set(&[(0, 0, 355)]);
        let cand = set(&[(0, 0, 10)]);
        assert_eq!(m.score(&probe, &cand), Ok(100));
    }

    #[test]
    fn test_empty_samples_have_no_features() {
        let m = PairCountMatcher::new();
        assert_eq!(
            m.score(&set(&[]), &set(&[(1, 1, 1)])),
            Err(MatcherError::NoUsableFeatures)
        );
        assert_eq!(
            m.verify(&set(&[(1, 1, 1)]), &[set(&[])], 60),
            Err(MatcherError::NoUsableFeatures)
        );
    }

    #[test]
    fn test_verify_uses_best_sample() {
        let m = PairCountMatcher::new();
        let probe = set(&[(10, 10, 0), (50, 50, 0)]);
        let far = set(&[(300, 300, 0)]);
        assert_eq!(m.verify(&probe, &[far.clone(), probe.clone()], 60), Ok(true));
        assert_eq!(m.verify(&probe, &[far], 60), Ok(false));
    }

    #[test]
    fn test_boolean_only_hides_raw_scorer() {
        assert!(PairCountMatcher::new().raw_scorer().is_some());
        assert!(PairCountMatcher::new().boolean_only().raw_scorer().is_none());
    }

    #[test]
    fn test_mixed_families_rejected() {
        let m = PairCountMatcher::new();
        let nbis = MinutiaeSet::new(AlgorithmFamily::NbisXyt, vec![Minutia::new(1, 1, 1)]);
        assert!(matches!(
            m.verify(&set(&[(1, 1, 1)]), &[nbis], 60),
            Err(MatcherError::IncompatibleFamily { .. })
        ));
    }
}
