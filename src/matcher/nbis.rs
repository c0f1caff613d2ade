//! NBIS bozorth3 matcher backed by libfprint
//!
//! bozorth3 keeps the prepared probe in process-global state, so every call
//! into it runs under `BOZORTH_STATE`. The guarded value is a generation
//! counter: each `prepare_probe` bumps it, and `compare` re-loads its probe
//! when another preparation happened in between.

use super::{ensure_same_family, Matcher, PreparedProbe, RawScorer};
use crate::error::MatcherError;
use crate::ffi::{bozorth_probe_init, bozorth_to_gallery, XytStruct};
use crate::template::{AlgorithmFamily, MinutiaeSet};
use std::sync::{Mutex, MutexGuard};

static BOZORTH_STATE: Mutex<u64> = Mutex::new(0);

fn lock_state() -> MutexGuard<'static, u64> {
    BOZORTH_STATE.lock().unwrap_or_else(|p| p.into_inner())
}

/// Matcher calling bozorth3 through libfprint's exported primitives
#[derive(Debug, Default, Clone)]
pub struct NbisMatcher;

impl NbisMatcher {
    pub fn new() -> Self {
        log::info!("Using NBIS bozorth3 matcher (libfprint)");
        Self
    }

    fn check_family(set: &MinutiaeSet) -> Result<(), MatcherError> {
        if set.family() != AlgorithmFamily::NbisXyt {
            return Err(MatcherError::IncompatibleFamily {
                probe: AlgorithmFamily::NbisXyt.to_string(),
                candidate: set.family().to_string(),
            });
        }
        Ok(())
    }

    /// Load `set` as the bozorth3 probe; caller holds the state lock
    fn load_probe(xyt: &mut XytStruct) -> Result<i32, MatcherError> {
        let len = unsafe { bozorth_probe_init(xyt) };
        if len <= 0 {
            return Err(MatcherError::NoUsableFeatures);
        }
        Ok(len)
    }
}

impl RawScorer for NbisMatcher {
    fn prepare_probe(&self, probe: &MinutiaeSet) -> Result<PreparedProbe, MatcherError> {
        Self::check_family(probe)?;
        if probe.is_empty() {
            return Err(MatcherError::NoUsableFeatures);
        }

        let mut state = lock_state();
        let mut xyt = XytStruct::from_set(probe);
        let prepared_len = Self::load_probe(&mut xyt)?;
        *state += 1;

        log::trace!("bozorth3 probe loaded: len={}", prepared_len);
        Ok(PreparedProbe {
            set: probe.clone(),
            prepared_len,
            generation: *state,
        })
    }

    fn compare(
        &self,
        probe: &PreparedProbe,
        candidate: &MinutiaeSet,
    ) -> Result<i32, MatcherError> {
        ensure_same_family(&probe.set, candidate)?;
        if candidate.is_empty() {
            return Err(MatcherError::NoUsableFeatures);
        }

        let mut state = lock_state();
        let mut pxyt = XytStruct::from_set(&probe.set);
        let probe_len = if *state == probe.generation {
            probe.prepared_len
        } else {
            log::trace!("bozorth3 probe replaced since preparation, reloading");
            let len = Self::load_probe(&mut pxyt)?;
            *state += 1;
            len
        };

        let mut gxyt = XytStruct::from_set(candidate);
        let score = unsafe { bozorth_to_gallery(probe_len, &mut *pxyt, &mut *gxyt) };
        if score < 0 {
            return Err(MatcherError::Internal(format!(
                "bozorth_to_gallery returned {}",
                score
            )));
        }
        Ok(score)
    }
}

impl Matcher for NbisMatcher {
    fn name(&self) -> &str {
        "nbis-bozorth3"
    }

    fn verify(
        &self,
        probe: &MinutiaeSet,
        candidate: &[MinutiaeSet],
        threshold: u32,
    ) -> Result<bool, MatcherError> {
        let prepared = self.prepare_probe(probe)?;
        let mut usable = false;
        for sample in candidate {
            match self.compare(&prepared, sample) {
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

    /// 1:N search with a single probe preparation
    fn identify(
        &self,
        probe: &MinutiaeSet,
        gallery: &[&[MinutiaeSet]],
        threshold: u32,
    ) -> Result<Option<usize>, MatcherError> {
        let prepared = self.prepare_probe(probe)?;
        for (slot, candidate) in gallery.iter().enumerate() {
            for sample in candidate.iter() {
                match self.compare(&prepared, sample) {
                    Ok(score) if score >= threshold as i32 => return Ok(Some(slot)),
                    Ok(_) | Err(MatcherError::NoUsableFeatures) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(None)
    }

    fn raw_scorer(&self) -> Option<&dyn RawScorer> {
        Some(self as &dyn RawScorer)
    }
}
