//! Numeric confidence scores on top of boolean matchers
//!
//! `ScoreExtractor` is the boundary between a matcher's raw scoring primitive
//! and the 0..=100 score reported to callers. When the matcher exposes no raw
//! scorer the extractor runs in degraded mode: it mirrors the matcher's own
//! boolean decision with fixed placeholder scores and tags every result
//! `ScoreSource::Placeholder`.

use crate::error::MatcherError;
use crate::matcher::{ensure_same_family, Matcher, RawScorer};
use crate::template::MinutiaeSet;
use serde::{Deserialize, Serialize};

/// Where an outcome score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Computed by the matcher's raw scoring primitive
    Measured,
    /// Fixed value standing in for the matcher's boolean decision
    Placeholder,
}

/// Scores reported in degraded mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderScores {
    pub matched: u8,
    pub unmatched: u8,
}

impl Default for PlaceholderScores {
    fn default() -> Self {
        Self {
            matched: 95,
            unmatched: 30,
        }
    }
}

/// A 0..=100 score and its provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub value: u8,
    pub source: ScoreSource,
}

/// Result of a verification or identification
///
/// A negative match is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub matched: bool,
    pub score: u8,
    pub matched_index: Option<usize>,
    pub candidate_id: Option<String>,
    pub score_source: ScoreSource,
}

impl MatchOutcome {
    pub(crate) fn no_match(score: u8, source: ScoreSource) -> Self {
        Self {
            matched: false,
            score,
            matched_index: None,
            candidate_id: None,
            score_source: source,
        }
    }
}

/// Clamp an unbounded raw score onto the outcome scale
pub fn clamp_score(raw: i32) -> u8 {
    raw.clamp(0, 100) as u8
}

/// Derives outcome scores from a matcher's raw scorer, or placeholders
pub struct ScoreExtractor<'a> {
    scorer: Option<&'a dyn RawScorer>,
    placeholders: PlaceholderScores,
}

impl<'a> ScoreExtractor<'a> {
    pub fn new(scorer: Option<&'a dyn RawScorer>, placeholders: PlaceholderScores) -> Self {
        Self {
            scorer,
            placeholders,
        }
    }

    pub fn for_matcher(matcher: &'a dyn Matcher, placeholders: PlaceholderScores) -> Self {
        let scorer = matcher.raw_scorer();
        if scorer.is_none() {
            log::warn!(
                "Matcher '{}' exposes no raw scores, reporting placeholder scores",
                matcher.name()
            );
        }
        Self::new(scorer, placeholders)
    }

    /// Whether scores are measured rather than placeholders
    pub fn is_measured(&self) -> bool {
        self.scorer.is_some()
    }

    pub fn source(&self) -> ScoreSource {
        if self.is_measured() {
            ScoreSource::Measured
        } else {
            ScoreSource::Placeholder
        }
    }

    fn scorer(&self) -> Result<&'a dyn RawScorer, MatcherError> {
        self.scorer
            .ok_or_else(|| MatcherError::Internal("raw score access unavailable".to_string()))
    }

    /// Raw score of one probe sample against one candidate sample
    pub fn compare(
        &self,
        probe: &MinutiaeSet,
        candidate: &MinutiaeSet,
    ) -> Result<i32, MatcherError> {
        ensure_same_family(probe, candidate)?;
        let scorer = self.scorer()?;
        let prepared = scorer.prepare_probe(probe)?;
        scorer.compare(&prepared, candidate)
    }

    /// Highest raw score of `probe` over every sample of one template
    ///
    /// The probe is prepared once for all samples. Samples without usable
    /// features are skipped; if none is usable the result is
    /// `NoUsableFeatures`.
    pub fn best_score(
        &self,
        probe: &MinutiaeSet,
        candidate: &[MinutiaeSet],
    ) -> Result<i32, MatcherError> {
        let scorer = self.scorer()?;
        for sample in candidate {
            ensure_same_family(probe, sample)?;
        }

        let prepared = scorer.prepare_probe(probe)?;
        log::trace!("Probe prepared: {} minutiae", prepared.prepared_len);

        let mut best: Option<i32> = None;
        for (i, sample) in candidate.iter().enumerate() {
            match scorer.compare(&prepared, sample) {
                Ok(raw) => {
                    log::trace!("Sample {}: raw score {}", i, raw);
                    best = Some(best.map_or(raw, |b| b.max(raw)));
                }
                Err(MatcherError::NoUsableFeatures) => {
                    log::debug!("Sample {} has no usable features, skipping", i);
                }
                Err(e) => return Err(e),
            }
        }

        best.ok_or(MatcherError::NoUsableFeatures)
    }

    /// Outcome score for a template the matcher has already decided on
    pub fn outcome_score(
        &self,
        probe: &MinutiaeSet,
        candidate: &[MinutiaeSet],
        decision: bool,
    ) -> Result<Score, MatcherError> {
        if !self.is_measured() {
            return Ok(self.placeholder(decision));
        }

        let raw = match self.best_score(probe, candidate) {
            Ok(raw) => raw,
            Err(MatcherError::NoUsableFeatures) => 0,
            Err(e) => return Err(e),
        };
        Ok(Score {
            value: clamp_score(raw),
            source: ScoreSource::Measured,
        })
    }

    pub fn placeholder(&self, decision: bool) -> Score {
        Score {
            value: if decision {
                self.placeholders.matched
            } else {
                self.placeholders.unmatched
            },
            source: ScoreSource::Placeholder,
        }
    }
}
