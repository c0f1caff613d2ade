//! Fingerprint biometric session and matching engine
//!
//! Enrolls a finger from K repeated captures into one opaque `Template`,
//! verifies a live finger against stored templates (1:1) and identifies it
//! within a caller-supplied gallery (1:N). Numeric scores come from the
//! matcher's raw scoring primitive when it has one; otherwise the engine
//! reports explicit placeholder scores.
//!
//! Persistence, UI and networking are caller concerns: templates go in and
//! out as bytes, and the capture device is always passed in explicitly.

pub mod config;
pub mod device;
pub mod enroll;
pub mod error;
pub mod ffi;
pub mod identify;
pub mod matcher;
pub mod paths;
pub mod score;
pub mod template;
pub mod validation;
pub mod verify;
pub mod worker;

pub use config::{EngineConfig, EnrollmentConfig, MatchingConfig};
pub use device::{CaptureAbort, CaptureDevice, DeviceFeature, DeviceHandle, EnrollCapture};
pub use enroll::{EnrollStage, EnrollStep, EnrollmentSession, EnrollmentState};
pub use error::{DecodeError, DeviceError, EngineError, EngineResult, MatcherError};
pub use identify::{Gallery, GalleryEntry, IdentificationEngine, IdentifyHooks};
pub use matcher::{default_matcher, Matcher, PreparedProbe, RawScorer};
pub use score::{MatchOutcome, ScoreExtractor, ScoreSource};
pub use template::{Finger, MinutiaeSet, Template, TemplateCodec};
pub use verify::VerificationEngine;
pub use worker::{DeviceJob, DeviceWorker, WorkerEvent};
