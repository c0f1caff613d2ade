//! 1:1 verification against stored templates

use crate::config::MatchingConfig;
use crate::device::{CaptureDevice, DeviceFeature, DeviceHandle};
use crate::error::{EngineError, EngineResult, MatcherError};
use crate::matcher::Matcher;
use crate::score::{MatchOutcome, ScoreExtractor};
use crate::template::{MinutiaeSet, Template, TemplateCodec};

const VERIFY_FEATURES: [DeviceFeature; 2] = [DeviceFeature::Capture, DeviceFeature::Verify];

/// Verifies a live finger against one or several enrolled templates
pub struct VerificationEngine<'m> {
    matcher: &'m dyn Matcher,
    config: MatchingConfig,
}

impl<'m> VerificationEngine<'m> {
    pub fn new(matcher: &'m dyn Matcher, config: MatchingConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { matcher, config })
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    /// Decode `template_bytes`, capture one probe and compare
    pub fn verify<D: CaptureDevice>(
        &self,
        device: &DeviceHandle<D>,
        template_bytes: &[u8],
    ) -> EngineResult<MatchOutcome> {
        let template = TemplateCodec::decode(template_bytes)?;
        self.verify_template(device, &template)
    }

    /// Capture one probe and compare it with an already decoded template
    pub fn verify_template<D: CaptureDevice>(
        &self,
        device: &DeviceHandle<D>,
        template: &Template,
    ) -> EngineResult<MatchOutcome> {
        let sets = template.minutiae_sets()?;
        log::info!(
            "Verifying against owner={}, finger={} ({} samples)",
            template.owner_id(),
            template.finger(),
            sets.len()
        );

        let probe = device.capture_probe(&VERIFY_FEATURES)?;
        let extractor = self.extractor();
        let outcome = self.match_probe(&extractor, &probe, &sets)?;

        log::info!(
            "Verification result: matched={}, score={} ({:?})",
            outcome.matched,
            outcome.score,
            outcome.score_source
        );
        Ok(outcome)
    }

    /// One capture checked against several templates (e.g. all fingers of
    /// one subject). Stops at the first match; otherwise reports the best
    /// score seen.
    pub fn verify_any<D: CaptureDevice, T: AsRef<[u8]>>(
        &self,
        device: &DeviceHandle<D>,
        templates: &[T],
    ) -> EngineResult<MatchOutcome> {
        if templates.is_empty() {
            return Err(EngineError::NoData);
        }

        let mut decoded: Vec<(usize, Vec<MinutiaeSet>)> = Vec::with_capacity(templates.len());
        let mut last_error = None;
        for (index, bytes) in templates.iter().enumerate() {
            match TemplateCodec::decode(bytes.as_ref()).and_then(|t| t.minutiae_sets()) {
                Ok(sets) => decoded.push((index, sets)),
                Err(e) => {
                    log::warn!("Skipping template {}: {}", index, e);
                    last_error = Some(e);
                }
            }
        }

        if decoded.is_empty() {
            return Err(last_error.map_or(EngineError::NoData, EngineError::from));
        }

        let probe = device.capture_probe(&VERIFY_FEATURES)?;
        let extractor = self.extractor();

        let mut best: Option<MatchOutcome> = None;
        for (index, sets) in &decoded {
            let mut outcome = self.match_probe(&extractor, &probe, sets)?;
            if outcome.matched {
                outcome.matched_index = Some(*index);
                log::info!("Template {} matched with score {}", index, outcome.score);
                return Ok(outcome);
            }
            if best.as_ref().map_or(true, |b| outcome.score > b.score) {
                best = Some(outcome);
            }
        }

        let best = best.ok_or(EngineError::NoData)?;
        log::info!("No template matched, best score {}", best.score);
        Ok(best)
    }

    fn extractor(&self) -> ScoreExtractor<'m> {
        ScoreExtractor::for_matcher(self.matcher, self.config.placeholders())
    }

    /// Decide and score one probe against one template's samples
    pub(crate) fn match_probe(
        &self,
        extractor: &ScoreExtractor<'_>,
        probe: &MinutiaeSet,
        sets: &[MinutiaeSet],
    ) -> EngineResult<MatchOutcome> {
        let threshold = self.config.threshold;

        let decision = match self.matcher.verify(probe, sets, threshold) {
            Ok(decision) => decision,
            Err(MatcherError::NoUsableFeatures) => {
                log::warn!("No usable features in probe or template, treating as no match");
                return Ok(MatchOutcome::no_match(0, extractor.source()));
            }
            Err(e) => return Err(e.into()),
        };

        let score = extractor.outcome_score(probe, sets, decision)?;
        Ok(MatchOutcome {
            matched: score.value as u32 >= threshold || decision,
            score: score.value,
            matched_index: None,
            candidate_id: None,
            score_source: score.source,
        })
    }
}
