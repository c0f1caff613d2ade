//! 1:N identification over a caller-supplied gallery
//!
//! The gallery is transient: it is decoded per call and never persisted.
//! Undecodable entries are skipped, and matcher slots are mapped back to the
//! caller's entry order through an index table built while decoding, so
//! duplicate template bytes can never be confused with one another.

use crate::config::MatchingConfig;
use crate::device::{CaptureDevice, DeviceFeature, DeviceHandle};
use crate::error::{EngineError, EngineResult, MatcherError};
use crate::matcher::Matcher;
use crate::score::{MatchOutcome, ScoreExtractor};
use crate::template::{MinutiaeSet, TemplateCodec};
use crate::validation::validate_candidate_id;

const IDENTIFY_FEATURES: [DeviceFeature; 2] = [DeviceFeature::Capture, DeviceFeature::Identify];

/// One candidate of a gallery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub candidate_id: String,
    pub template_bytes: Vec<u8>,
}

/// Ordered candidates for one identification call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate_id: &str, template_bytes: Vec<u8>) -> EngineResult<()> {
        validate_candidate_id(candidate_id)?;
        self.entries.push(GalleryEntry {
            candidate_id: candidate_id.to_string(),
            template_bytes,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Optional hooks polled during identification
#[derive(Default)]
pub struct IdentifyHooks<'h> {
    /// Called as `(current, total)` while the gallery is prepared
    pub progress: Option<&'h mut dyn FnMut(usize, usize)>,
    /// Polled before each gallery entry and before capture
    pub cancel: Option<&'h dyn Fn() -> bool>,
}

impl IdentifyHooks<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.map_or(false, |c| c())
    }
}

/// Identifies a live finger among gallery candidates
pub struct IdentificationEngine<'m> {
    matcher: &'m dyn Matcher,
    config: MatchingConfig,
}

impl<'m> IdentificationEngine<'m> {
    pub fn new(matcher: &'m dyn Matcher, config: MatchingConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { matcher, config })
    }

    pub fn identify<D: CaptureDevice>(
        &self,
        device: &DeviceHandle<D>,
        gallery: &Gallery,
    ) -> EngineResult<MatchOutcome> {
        self.identify_with(device, gallery, IdentifyHooks::default())
    }

    pub fn identify_with<D: CaptureDevice>(
        &self,
        device: &DeviceHandle<D>,
        gallery: &Gallery,
        mut hooks: IdentifyHooks<'_>,
    ) -> EngineResult<MatchOutcome> {
        let total = gallery.len();
        log::info!("Preparing gallery of {} candidates", total);

        // prepared[slot] holds the samples of entries()[slots[slot]]
        let mut prepared: Vec<Vec<MinutiaeSet>> = Vec::with_capacity(total);
        let mut slots: Vec<usize> = Vec::with_capacity(total);

        for (index, entry) in gallery.entries().iter().enumerate() {
            if hooks.cancelled() {
                log::info!("Identification cancelled during gallery preparation");
                return Err(EngineError::Cancelled);
            }

            match TemplateCodec::decode(&entry.template_bytes).and_then(|t| t.minutiae_sets()) {
                Ok(sets) => {
                    prepared.push(sets);
                    slots.push(index);
                }
                Err(e) => log::warn!("Skipping candidate '{}': {}", entry.candidate_id, e),
            }

            if let Some(progress) = hooks.progress.as_mut() {
                progress(index + 1, total);
            }
        }

        if prepared.is_empty() {
            return Err(EngineError::EmptyGallery);
        }
        log::debug!("{} of {} candidates decodable", prepared.len(), total);

        if hooks.cancelled() {
            log::info!("Identification cancelled before capture");
            return Err(EngineError::Cancelled);
        }

        let probe = device.capture_probe(&IDENTIFY_FEATURES)?;

        let extractor = ScoreExtractor::for_matcher(self.matcher, self.config.placeholders());
        let gallery_refs: Vec<&[MinutiaeSet]> = prepared.iter().map(Vec::as_slice).collect();

        let found = match self
            .matcher
            .identify(&probe, &gallery_refs, self.config.threshold)
        {
            Ok(found) => found,
            Err(MatcherError::NoUsableFeatures) => {
                log::warn!("No usable features in probe, treating as no match");
                return Ok(MatchOutcome::no_match(0, extractor.source()));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(slot) = found else {
            log::info!("Identification: no match among {} candidates", prepared.len());
            let score = if extractor.is_measured() {
                0
            } else {
                extractor.placeholder(false).value
            };
            return Ok(MatchOutcome::no_match(score, extractor.source()));
        };

        let index = *slots
            .get(slot)
            .ok_or_else(|| MatcherError::Internal(format!("matcher returned slot {}", slot)))?;
        let entry = &gallery.entries()[index];
        let score = extractor.outcome_score(&probe, &prepared[slot], true)?;

        log::info!(
            "Identification: matched candidate '{}' (index {}), score={}",
            entry.candidate_id,
            index,
            score.value
        );
        Ok(MatchOutcome {
            matched: true,
            score: score.value,
            matched_index: Some(index),
            candidate_id: Some(entry.candidate_id.clone()),
            score_source: score.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{synthetic_sample, SimController, SimulatedReader, SimulatorConfig};
    use crate::matcher::stub::PairCountMatcher;
    use crate::score::ScoreSource;
    use crate::template::minutiae::pack_sets;
    use crate::template::{Finger, Template};
    use chrono::Utc;
    use std::cell::Cell;

    fn enrolled_bytes(owner: &str, seed: u64) -> Vec<u8> {
        let cfg = SimulatorConfig::default();
        let sets: Vec<MinutiaeSet> = (1..=3).map(|scan| synthetic_sample(&cfg, seed, scan)).collect();
        let template = Template::new(
            owner,
            Finger::RightIndex,
            pack_sets(&sets).unwrap(),
            3,
            Utc::now(),
        )
        .unwrap();
        TemplateCodec::encode(&template)
    }

    fn reader() -> (DeviceHandle<SimulatedReader>, SimController) {
        let reader = SimulatedReader::new("sim");
        let ctl = reader.controller();
        (DeviceHandle::open(reader).unwrap(), ctl)
    }

    fn gallery(seeds: &[u64]) -> Gallery {
        let mut g = Gallery::new();
        for &seed in seeds {
            let id = format!("user{}", seed);
            g.push(&id, enrolled_bytes(&id, seed)).unwrap();
        }
        g
    }

    #[test]
    fn test_single_true_match() {
        let matcher = PairCountMatcher::new();
        let engine = IdentificationEngine::new(&matcher, MatchingConfig::default()).unwrap();
        let (device, ctl) = reader();
        ctl.place_finger(30);

        let outcome = engine.identify(&device, &gallery(&[10, 20, 30, 40])).unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.matched_index, Some(2));
        assert_eq!(outcome.candidate_id.as_deref(), Some("user30"));
        assert!(outcome.score >= 60);
    }

    #[test]
    fn test_no_match() {
        let matcher = PairCountMatcher::new();
        let engine = IdentificationEngine::new(&matcher, MatchingConfig::default()).unwrap();
        let (device, ctl) = reader();
        ctl.place_finger(99);

        let outcome = engine.identify(&device, &gallery(&[10, 20])).unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.matched_index, None);
    }

    #[test]
    fn test_empty_or_undecodable_gallery() {
        let matcher = PairCountMatcher::new();
        let engine = IdentificationEngine::new(&matcher, MatchingConfig::default()).unwrap();
        let (device, ctl) = reader();

        assert_eq!(
            engine.identify(&device, &Gallery::new()).unwrap_err(),
            EngineError::EmptyGallery
        );

        let mut bad = Gallery::new();
        bad.push("a", b"junk".to_vec()).unwrap();
        bad.push("b", Vec::new()).unwrap();
        assert_eq!(
            engine.identify(&device, &bad).unwrap_err(),
            EngineError::EmptyGallery
        );
        assert_eq!(ctl.captures(), 0);
    }

    #[test]
    fn test_slots_map_to_source_order_with_duplicates() {
        let matcher = PairCountMatcher::new();
        let engine = IdentificationEngine::new(&matcher, MatchingConfig::default()).unwrap();
        let (device, ctl) = reader();
        ctl.place_finger(5);

        let bytes = enrolled_bytes("user5", 5);
        let mut g = Gallery::new();
        g.push("broken", b"junk".to_vec()).unwrap();
        g.push("other", enrolled_bytes("other", 6)).unwrap();
        g.push("first-copy", bytes.clone()).unwrap();
        g.push("second-copy", bytes).unwrap();

        let outcome = engine.identify(&device, &g).unwrap();
        assert_eq!(outcome.matched_index, Some(2));
        assert_eq!(outcome.candidate_id.as_deref(), Some("first-copy"));
    }

    #[test]
    fn test_progress_and_cancel() {
        let matcher = PairCountMatcher::new();
        let engine = IdentificationEngine::new(&matcher, MatchingConfig::default()).unwrap();
        let (device, ctl) = reader();
        let g = gallery(&[1, 2, 3]);

        let mut seen = Vec::new();
        let mut progress = |i: usize, n: usize| seen.push((i, n));
        let polls = Cell::new(0);
        let cancel = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };

        let err = engine
            .identify_with(
                &device,
                &g,
                IdentifyHooks {
                    progress: Some(&mut progress),
                    cancel: Some(&cancel),
                },
            )
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
        assert_eq!(seen, vec![(1, 3), (2, 3)]);
        assert_eq!(ctl.captures(), 0);
    }

    #[test]
    fn test_cancel_before_capture() {
        let matcher = PairCountMatcher::new();
        let engine = IdentificationEngine::new(&matcher, MatchingConfig::default()).unwrap();
        let (device, ctl) = reader();
        let g = gallery(&[1]);

        let polls = Cell::new(0);
        let cancel = || {
            polls.set(polls.get() + 1);
            polls.get() == 2
        };
        let hooks = IdentifyHooks {
            progress: None,
            cancel: Some(&cancel),
        };
        assert_eq!(
            engine.identify_with(&device, &g, hooks).unwrap_err(),
            EngineError::Cancelled
        );
        assert_eq!(ctl.captures(), 0);
    }

    #[test]
    fn test_degraded_identify_reports_placeholder() {
        let matcher = PairCountMatcher::new().boolean_only();
        let engine = IdentificationEngine::new(&matcher, MatchingConfig::default()).unwrap();
        let (device, ctl) = reader();
        ctl.place_finger(20);

        let outcome = engine.identify(&device, &gallery(&[10, 20])).unwrap();
        assert_eq!(outcome.matched_index, Some(1));
        assert_eq!(outcome.score, 95);
        assert_eq!(outcome.score_source, ScoreSource::Placeholder);

        // A degraded miss reports the same placeholder as verification
        ctl.place_finger(77);
        let miss = engine.identify(&device, &gallery(&[10, 20])).unwrap();
        assert_eq!(
            (miss.matched, miss.matched_index, miss.score, miss.score_source),
            (false, None, 30, ScoreSource::Placeholder)
        );
    }

    #[test]
    fn test_gallery_rejects_bad_candidate_id() {
        let mut g = Gallery::new();
        assert!(matches!(
            g.push("", vec![1]),
            Err(EngineError::Validation(_))
        ));
        assert!(g.is_empty());
    }
}
