//! Matching algorithms
//!
//! This module provides fingerprint matching using either:
//! - Pair-count matcher (default): tolerance-based point pairing for development
//! - NBIS matcher (nbis feature): libfprint's bozorth3 scoring primitives
//!
//! A matcher always answers the boolean question. Raw numeric scores are an
//! optional capability exposed through `raw_scorer()`; callers that need a
//! score go through `ScoreExtractor`, which reports when it had to fall back.

use crate::error::MatcherError;
use crate::template::MinutiaeSet;

// Always compile the pair-count matcher for fallback support
pub mod stub;

cfg_if::cfg_if! {
    if #[cfg(feature = "nbis")] {
        pub mod nbis;
    }
}

/// Probe state produced by `RawScorer::prepare_probe`
///
/// Holds the probe sample alongside whatever the scorer derived from it, so
/// one preparation can be reused against every candidate sample.
#[derive(Debug, Clone)]
pub struct PreparedProbe {
    pub(crate) set: MinutiaeSet,
    pub(crate) prepared_len: i32,
    #[cfg_attr(not(feature = "nbis"), allow(dead_code))]
    pub(crate) generation: u64,
}

impl PreparedProbe {
    /// Wrap `set` with the length the scorer derived while preparing it
    pub fn new(set: MinutiaeSet, prepared_len: i32) -> Self {
        Self {
            set,
            prepared_len,
            generation: 0,
        }
    }

    pub fn sample(&self) -> &MinutiaeSet {
        &self.set
    }

    pub fn prepared_len(&self) -> i32 {
        self.prepared_len
    }
}

/// Raw pairwise scoring primitive
///
/// Scores are unbounded integers in the algorithm's own units. Both samples
/// must come from the same algorithm family.
pub trait RawScorer: Send + Sync {
    fn prepare_probe(&self, probe: &MinutiaeSet) -> Result<PreparedProbe, MatcherError>;

    fn compare(&self, probe: &PreparedProbe, candidate: &MinutiaeSet)
        -> Result<i32, MatcherError>;
}

/// Boolean matching capability embedded in the reader stack
pub trait Matcher: Send + Sync {
    fn name(&self) -> &str;

    /// Does `probe` match any sample of one enrolled template
    fn verify(
        &self,
        probe: &MinutiaeSet,
        candidate: &[MinutiaeSet],
        threshold: u32,
    ) -> Result<bool, MatcherError>;

    /// Search `gallery` (one entry per template) and return the first
    /// matching slot
    ///
    /// The default runs sequential 1:1 decisions for matchers without a
    /// native 1:N search. Entries without usable features are skipped.
    fn identify(
        &self,
        probe: &MinutiaeSet,
        gallery: &[&[MinutiaeSet]],
        threshold: u32,
    ) -> Result<Option<usize>, MatcherError> {
        if probe.is_empty() {
            return Err(MatcherError::NoUsableFeatures);
        }

        for (slot, candidate) in gallery.iter().enumerate() {
            match self.verify(probe, candidate, threshold) {
                Ok(true) => return Ok(Some(slot)),
                Ok(false) | Err(MatcherError::NoUsableFeatures) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Raw-score access, when the algorithm exposes it
    fn raw_scorer(&self) -> Option<&dyn RawScorer> {
        None
    }
}

/// Matcher used when the caller does not bring one
pub fn default_matcher() -> Box<dyn Matcher> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "nbis")] {
            Box::new(nbis::NbisMatcher::new())
        } else {
            Box::new(stub::PairCountMatcher::new())
        }
    }
}

/// Reject comparisons across algorithm families
pub(crate) fn ensure_same_family(
    probe: &MinutiaeSet,
    candidate: &MinutiaeSet,
) -> Result<(), MatcherError> {
    if probe.family() != candidate.family() {
        return Err(MatcherError::IncompatibleFamily {
            probe: probe.family().to_string(),
            candidate: candidate.family().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{AlgorithmFamily, Minutia};

    /// Matches when the first point of both samples is identical
    struct FirstPoint;

    impl Matcher for FirstPoint {
        fn name(&self) -> &str {
            "first-point"
        }

        fn verify(
            &self,
            probe: &MinutiaeSet,
            candidate: &[MinutiaeSet],
            _threshold: u32,
        ) -> Result<bool, MatcherError> {
            let head = probe.points().first().ok_or(MatcherError::NoUsableFeatures)?;
            if candidate.iter().all(|s| s.is_empty()) {
                return Err(MatcherError::NoUsableFeatures);
            }
            Ok(candidate.iter().any(|s| s.points().first() == Some(head)))
        }
    }

    fn one(x: i32) -> MinutiaeSet {
        MinutiaeSet::new(AlgorithmFamily::Simulated, vec![Minutia::new(x, x, 0)])
    }

    #[test]
    fn test_default_identify_returns_first_matching_slot() {
        let a = vec![one(1)];
        let b = vec![one(2)];
        let c = vec![one(2)];
        let gallery: Vec<&[MinutiaeSet]> = vec![a.as_slice(), b.as_slice(), c.as_slice()];

        assert_eq!(FirstPoint.identify(&one(2), &gallery, 60), Ok(Some(1)));
        assert_eq!(FirstPoint.identify(&one(9), &gallery, 60), Ok(None));
    }

    #[test]
    fn test_default_identify_skips_featureless_entries() {
        let empty = vec![MinutiaeSet::new(AlgorithmFamily::Simulated, vec![])];
        let b = vec![one(2)];
        let gallery: Vec<&[MinutiaeSet]> = vec![empty.as_slice(), b.as_slice()];
        assert_eq!(FirstPoint.identify(&one(2), &gallery, 60), Ok(Some(1)));
    }

    #[test]
    #[cfg(not(feature = "nbis"))]
    fn test_default_matcher_is_pair_count() {
        let matcher = default_matcher();
        assert_eq!(matcher.name(), "pair-count");
        assert!(matcher.raw_scorer().is_some());
    }

    #[test]
    fn test_family_guard() {
        let nbis = MinutiaeSet::new(AlgorithmFamily::NbisXyt, vec![Minutia::new(0, 0, 0)]);
        assert!(ensure_same_family(&one(0), &one(1)).is_ok());
        assert_eq!(
            ensure_same_family(&one(0), &nbis),
            Err(MatcherError::IncompatibleFamily {
                probe: "simulated".to_string(),
                candidate: "nbis-xyt".to_string(),
            })
        );
    }
}
