//! Multi-sample enrollment
//!
//! An `EnrollmentSession` drives K blocking enrollment captures on one device
//! and aggregates them into a single immutable `Template`:
//!
//! ```text
//! Idle --start--> Capturing --K samples--> Completed --finish--> Template
//!                     |
//!                     +--cancel--> Cancelled
//!                     +--error---> Failed
//! ```
//!
//! Quality values are an advisory heuristic for UI feedback (50 on
//! intermediate stages, 100 on the last). The hardware exposes no calibrated
//! metric, so they are never a security gate.

use crate::config::EnrollmentConfig;
use crate::device::{CaptureDevice, DeviceFeature, DeviceHandle};
use crate::error::{DeviceError, EngineError, EngineResult};
use crate::template::minutiae::pack_sets;
use crate::template::{Finger, MinutiaeSet, Template};
use crate::validation::{validate_enroll_samples, validate_owner_id};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

const QUALITY_INTERMEDIATE: u8 = 50;
const QUALITY_FINAL: u8 = 100;

const ENROLL_FEATURES: [DeviceFeature; 2] = [DeviceFeature::Capture, DeviceFeature::Enroll];

/// Enrollment lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollStage {
    Idle,
    Capturing,
    Completed,
    Cancelled,
    Failed,
}

impl EnrollStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EnrollStage::Completed | EnrollStage::Cancelled | EnrollStage::Failed
        )
    }
}

impl fmt::Display for EnrollStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Snapshot of an enrollment session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentState {
    pub stage: EnrollStage,
    pub samples_captured: u32,
    pub target_samples: u32,
    pub last_quality: u8,
    pub last_message: String,
}

/// Outcome of one successful `add_sample`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollStep {
    NeedMore,
    Done,
}

/// Progress callback: `(samples captured, target samples, message)`
pub type ProgressCallback<'a> = Box<dyn FnMut(u32, u32, &str) + 'a>;

/// Enrollment of one finger on one device
pub struct EnrollmentSession<'a, D: CaptureDevice> {
    device: &'a DeviceHandle<D>,
    owner_id: String,
    finger: Finger,
    state: EnrollmentState,
    samples: Vec<MinutiaeSet>,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a, D: CaptureDevice> EnrollmentSession<'a, D> {
    pub fn new(
        device: &'a DeviceHandle<D>,
        owner_id: &str,
        finger: Finger,
        target_samples: u32,
    ) -> EngineResult<Self> {
        validate_owner_id(owner_id)?;
        validate_enroll_samples(target_samples)?;

        Ok(Self {
            device,
            owner_id: owner_id.to_string(),
            finger,
            state: EnrollmentState {
                stage: EnrollStage::Idle,
                samples_captured: 0,
                target_samples,
                last_quality: 0,
                last_message: String::new(),
            },
            samples: Vec::with_capacity(target_samples as usize),
            progress: None,
        })
    }

    pub fn from_config(
        device: &'a DeviceHandle<D>,
        owner_id: &str,
        finger: Finger,
        config: &EnrollmentConfig,
    ) -> EngineResult<Self> {
        Self::new(device, owner_id, finger, config.samples)
    }

    pub fn with_progress(mut self, callback: impl FnMut(u32, u32, &str) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &EnrollmentState {
        &self.state
    }

    pub fn stage(&self) -> EnrollStage {
        self.state.stage
    }

    fn invalid(&self, op: &'static str) -> EngineError {
        EngineError::InvalidState {
            op,
            stage: self.state.stage.to_string(),
        }
    }

    /// Enter `Capturing`. The device must be open and support enrollment.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.state.stage != EnrollStage::Idle {
            return Err(self.invalid("start"));
        }

        let mut device = self.device.acquire()?;
        self.device.check_ready(&device, &ENROLL_FEATURES)?;
        device.reset_enrollment();
        drop(device);

        self.state.stage = EnrollStage::Capturing;
        self.state.last_message = "Place your finger on the reader".to_string();
        log::info!(
            "Enrollment started: owner={}, finger={}, samples={}",
            self.owner_id,
            self.finger,
            self.state.target_samples
        );
        Ok(())
    }

    /// Capture and accumulate one sample (blocks until the operator scans)
    pub fn add_sample(&mut self) -> EngineResult<EnrollStep> {
        if self.state.stage != EnrollStage::Capturing {
            return Err(self.invalid("add_sample"));
        }

        // Busy means nothing was captured; the session stays usable
        let mut device = self.device.acquire()?;
        if let Err(e) = self.device.check_ready(&device, &ENROLL_FEATURES) {
            drop(device);
            return Err(self.fail(e));
        }

        let target = self.state.target_samples;
        let mut on_status = |msg: &str| log::debug!("Reader: {}", msg);
        let captured = device.capture_enroll_stage(target, &mut on_status);
        drop(device);
        if let Err(e) = self.device.ensure_not_closed_during_capture() {
            return Err(self.fail(e));
        }

        let capture = match captured {
            Ok(capture) => capture,
            Err(e) => return Err(self.fail(e.into())),
        };

        let expected = self.state.samples_captured + 1;
        if capture.stage_index != expected {
            let err = DeviceError::OutOfSequence {
                expected,
                got: capture.stage_index,
            };
            return Err(self.fail(err.into()));
        }

        self.samples.push(capture.minutiae);
        self.state.samples_captured = expected;

        let done = expected == target;
        if done {
            self.state.last_quality = QUALITY_FINAL;
            self.state.last_message = format!(
                "Scan {}/{} complete - processing fingerprint template",
                expected, target
            );
        } else {
            self.state.last_quality = QUALITY_INTERMEDIATE;
            self.state.last_message = format!(
                "Scan {}/{} complete - lift finger and place again",
                expected, target
            );
        }
        log::info!("Enrollment scan {}/{} captured", expected, target);

        if let Some(cb) = self.progress.as_mut() {
            cb(expected, target, &self.state.last_message);
        }

        if done {
            self.state.stage = EnrollStage::Completed;
            Ok(EnrollStep::Done)
        } else {
            Ok(EnrollStep::NeedMore)
        }
    }

    /// Hand over the aggregated template. Succeeds once per completed session.
    pub fn finish(&mut self) -> EngineResult<Template> {
        if self.state.stage != EnrollStage::Completed || self.samples.is_empty() {
            return Err(EngineError::NoData);
        }

        let mut samples = std::mem::take(&mut self.samples);
        let packed = pack_sets(&samples);
        samples.zeroize();

        let template = Template::new(
            &self.owner_id,
            self.finger,
            packed?,
            self.state.samples_captured as u16,
            Utc::now(),
        )?;

        log::info!(
            "✓ Template created: owner={}, finger={}, samples={}",
            template.owner_id(),
            template.finger(),
            template.sample_count()
        );
        Ok(template)
    }

    /// Abandon the session and wipe captured samples. No-op once terminal.
    pub fn cancel(&mut self) {
        if self.state.stage.is_terminal() {
            return;
        }

        self.samples.zeroize();
        self.state.stage = EnrollStage::Cancelled;
        self.state.last_message = "Enrollment cancelled".to_string();
        log::info!(
            "Enrollment cancelled: owner={}, after {} scans",
            self.owner_id,
            self.state.samples_captured
        );
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        log::error!("Enrollment failed at scan {}: {}", self.state.samples_captured + 1, err);
        self.samples.zeroize();
        self.state.stage = EnrollStage::Failed;
        self.state.last_message = err.to_string();
        err
    }
}

impl<D: CaptureDevice> Drop for EnrollmentSession<'_, D> {
    fn drop(&mut self) {
        self.samples.zeroize();
    }
}
