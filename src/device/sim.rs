//! Simulated fingerprint reader for development without hardware
//!
//! Produces deterministic synthetic minutiae: each finger seed owns a fixed
//! set of base points, and every scan perturbs them by a small hash-derived
//! jitter, so repeated scans of one finger resemble each other while other
//! seeds look unrelated. A shared `SimController` plays the operator: it
//! chooses which finger rests on the sensor and can script probes or faults.

use super::{CaptureDevice, DeviceFeature, EnrollCapture};
use crate::error::DeviceError;
use crate::template::{AlgorithmFamily, Minutia, MinutiaeSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Synthetic sample geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Sensor width in pixels
    pub width: u32,
    /// Sensor height in pixels
    pub height: u32,
    /// Minutiae per sample
    pub points: u32,
    /// Maximum per-scan displacement (pixels and degrees)
    pub jitter_px: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            width: 384,
            height: 290,
            points: 40,
            jitter_px: 3,
        }
    }
}

/// Deterministic sample of `finger_seed` as seen on scan number `scan`
pub fn synthetic_sample(config: &SimulatorConfig, finger_seed: u64, scan: u64) -> MinutiaeSet {
    let width = config.width.max(1);
    let height = config.height.max(1);
    let span = 2 * config.jitter_px + 1;

    let points = (0..config.points)
        .map(|i| {
            let base = Sha256::new()
                .chain_update(b"base")
                .chain_update(finger_seed.to_le_bytes())
                .chain_update(i.to_le_bytes())
                .finalize();
            let jitter = Sha256::new()
                .chain_update(b"scan")
                .chain_update(finger_seed.to_le_bytes())
                .chain_update(scan.to_le_bytes())
                .chain_update(i.to_le_bytes())
                .finalize();

            let word = |h: &[u8], at: usize| u16::from_le_bytes([h[at], h[at + 1]]) as u32;
            let shift = |h: &[u8], at: usize| (h[at] as u32 % span) as i32 - config.jitter_px as i32;

            let x = (word(base.as_slice(), 0) % width) as i32 + shift(jitter.as_slice(), 0);
            let y = (word(base.as_slice(), 2) % height) as i32 + shift(jitter.as_slice(), 1);
            let theta = (word(base.as_slice(), 4) % 360) as i32 + shift(jitter.as_slice(), 2);

            Minutia::new(
                x.clamp(0, width as i32 - 1),
                y.clamp(0, height as i32 - 1),
                theta.rem_euclid(360),
            )
        })
        .collect();

    MinutiaeSet::new(AlgorithmFamily::Simulated, points)
}

#[derive(Debug, Default)]
struct SimScript {
    finger_seed: u64,
    queued_probes: VecDeque<MinutiaeSet>,
    queued_faults: VecDeque<DeviceError>,
    captures: u64,
}

/// Operator-side control of a simulated reader
#[derive(Debug, Clone, Default)]
pub struct SimController {
    script: Arc<Mutex<SimScript>>,
}

impl SimController {
    fn lock(&self) -> MutexGuard<'_, SimScript> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Put the finger identified by `seed` on the sensor
    pub fn place_finger(&self, seed: u64) {
        self.lock().finger_seed = seed;
    }

    /// Return `sample` from the next probe capture instead of a synthetic scan
    pub fn queue_probe(&self, sample: MinutiaeSet) {
        self.lock().queued_probes.push_back(sample);
    }

    /// Fail the next capture (enroll stage or probe) with `fault`
    pub fn fail_next(&self, fault: DeviceError) {
        self.lock().queued_faults.push_back(fault);
    }

    /// Number of captures performed so far
    pub fn captures(&self) -> u64 {
        self.lock().captures
    }
}

/// Synthetic reader implementing `CaptureDevice`
pub struct SimulatedReader {
    name: String,
    config: SimulatorConfig,
    features: HashSet<DeviceFeature>,
    controller: SimController,
    open_failure: Option<DeviceError>,
    open: bool,
    enroll_stage: u32,
    probes: u64,
}

impl SimulatedReader {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, SimulatorConfig::default())
    }

    pub fn with_config(name: &str, config: SimulatorConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            features: [
                DeviceFeature::Capture,
                DeviceFeature::Enroll,
                DeviceFeature::Verify,
                DeviceFeature::Identify,
            ]
            .into_iter()
            .collect(),
            controller: SimController::default(),
            open_failure: None,
            open: false,
            enroll_stage: 0,
            probes: 0,
        }
    }

    pub fn without_feature(mut self, feature: DeviceFeature) -> Self {
        self.features.remove(&feature);
        self
    }

    pub fn fail_open(mut self, fault: DeviceError) -> Self {
        self.open_failure = Some(fault);
        self
    }

    /// Handle for steering the reader once it is owned by a `DeviceHandle`
    pub fn controller(&self) -> SimController {
        self.controller.clone()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn begin_capture(&mut self) -> Result<u64, DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        let mut script = self.controller.lock();
        script.captures += 1;
        if let Some(fault) = script.queued_faults.pop_front() {
            log::warn!("[SIM] Injected capture fault: {}", fault);
            return Err(fault);
        }
        Ok(script.finger_seed)
    }
}

impl CaptureDevice for SimulatedReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        if let Some(fault) = self.open_failure.take() {
            return Err(fault);
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.open = false;
        self.enroll_stage = 0;
        Ok(())
    }

    fn has_feature(&self, feature: DeviceFeature) -> bool {
        self.features.contains(&feature)
    }

    fn reset_enrollment(&mut self) {
        self.enroll_stage = 0;
    }

    fn capture_enroll_stage(
        &mut self,
        target_stages: u32,
        status: &mut dyn FnMut(&str),
    ) -> Result<EnrollCapture, DeviceError> {
        status("Place your finger on the reader and hold...");
        let seed = self.begin_capture()?;

        self.enroll_stage += 1;
        let stage_index = self.enroll_stage;
        log::debug!(
            "[SIM] Enroll stage {}/{} for finger seed {}",
            stage_index,
            target_stages,
            seed
        );

        Ok(EnrollCapture {
            minutiae: synthetic_sample(&self.config, seed, stage_index as u64),
            stage_index,
        })
    }

    fn capture_probe(&mut self) -> Result<MinutiaeSet, DeviceError> {
        let seed = self.begin_capture()?;

        if let Some(sample) = self.controller.lock().queued_probes.pop_front() {
            log::debug!("[SIM] Returning scripted probe");
            return Ok(sample);
        }

        self.probes += 1;
        Ok(synthetic_sample(&self.config, seed, 1000 + self.probes))
    }
}
