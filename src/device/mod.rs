//! Capture devices and exclusive device handles
//!
//! The reader driver is an external collaborator. It is consumed through the
//! `CaptureDevice` trait and always owned by a `DeviceHandle`, which callers
//! pass explicitly into every engine call. There is no process-wide device
//! context.
//!
//! Thread Safety:
//! A handle may be shared across threads, but only one operation may hold the
//! device at a time. A second call issued while one is outstanding fails with
//! `EngineError::DeviceBusy` instead of queueing behind the blocking capture.
//! `close()` is the exception: it never waits for the device. With a capture
//! in flight it marks the handle closed, fires the driver's `CaptureAbort`
//! and leaves the driver close to whoever releases the device.

pub mod sim;

use crate::error::{DeviceError, EngineError, EngineResult};
use crate::template::MinutiaeSet;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// Capabilities a reader may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFeature {
    Capture,
    Enroll,
    Verify,
    Identify,
}

/// Result of one enrollment stage
#[derive(Debug, Clone)]
pub struct EnrollCapture {
    pub minutiae: MinutiaeSet,
    /// 1-based index of the completed stage
    pub stage_index: u32,
}

/// Interrupts a blocking capture from another thread
///
/// The interrupted capture call should return promptly with an error.
pub trait CaptureAbort: Send + Sync {
    fn abort(&self);
}

/// A fingerprint reader with an embedded feature extractor
///
/// Every capture call blocks until the operator has placed (and lifted) a
/// finger or the driver gives up. Durations are not bounded here.
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<(), DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError>;

    fn has_feature(&self, feature: DeviceFeature) -> bool;

    /// Forget any partially captured enrollment
    fn reset_enrollment(&mut self) {}

    /// Handle used by `DeviceHandle::close` to cut short an in-flight
    /// capture. Drivers without one can only be closed between captures.
    fn abort_handle(&self) -> Option<Arc<dyn CaptureAbort>> {
        None
    }

    /// Capture one enrollment stage. `status` receives driver prompts such as
    /// "place finger" while the capture is in progress.
    fn capture_enroll_stage(
        &mut self,
        target_stages: u32,
        status: &mut dyn FnMut(&str),
    ) -> Result<EnrollCapture, DeviceError>;

    /// Capture one probe sample for matching
    fn capture_probe(&mut self) -> Result<MinutiaeSet, DeviceError>;
}

/// Exclusive owner of one opened capture device
pub struct DeviceHandle<D: CaptureDevice> {
    device: Mutex<D>,
    open: AtomicBool,
    /// Driver close deferred to the release of an in-flight operation
    close_pending: AtomicBool,
    abort: Option<Arc<dyn CaptureAbort>>,
    name: String,
}

/// One operation's hold on the device
///
/// Runs a deferred driver close when released.
pub(crate) struct DeviceGuard<'h, D: CaptureDevice> {
    handle: &'h DeviceHandle<D>,
    device: MutexGuard<'h, D>,
}

impl<D: CaptureDevice> Deref for DeviceGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D: CaptureDevice> DerefMut for DeviceGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: CaptureDevice> Drop for DeviceGuard<'_, D> {
    fn drop(&mut self) {
        if self.handle.close_pending.swap(false, Ordering::SeqCst) {
            close_driver(&mut *self.device, &self.handle.name);
        }
    }
}

fn close_driver<D: CaptureDevice>(device: &mut D, name: &str) {
    match device.close() {
        Ok(()) => log::info!("Reader closed: {}", name),
        Err(e) => log::warn!("Failed to close reader '{}': {}", name, e),
    }
}

impl<D: CaptureDevice> DeviceHandle<D> {
    /// Open `device` and take ownership of it
    pub fn open(mut device: D) -> EngineResult<Self> {
        let name = device.name().to_string();
        log::info!("Opening fingerprint reader: {}", name);

        device.open()?;
        let abort = device.abort_handle();

        log::info!("✓ Reader opened: {}", name);
        Ok(Self {
            device: Mutex::new(device),
            open: AtomicBool::new(true),
            close_pending: AtomicBool::new(false),
            abort,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close the device, aborting any operation that currently holds it
    ///
    /// The aborted operation fails with `NotReady`. Closing an already
    /// closed handle is a no-op.
    pub fn close(&self) -> EngineResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut device = match self.device.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::warn!("Closing reader '{}' with an operation in flight", self.name);
                self.close_pending.store(true, Ordering::SeqCst);
                match &self.abort {
                    Some(abort) => abort.abort(),
                    None => log::warn!(
                        "Reader '{}' cannot abort captures, close waits for the current one",
                        self.name
                    ),
                }
                return Ok(());
            }
        };

        device.close()?;
        log::info!("Reader closed: {}", self.name);
        Ok(())
    }

    /// Check the device is open and advertises every feature in `required`
    pub fn ensure_ready(&self, required: &[DeviceFeature]) -> EngineResult<()> {
        let device = self.acquire()?;
        self.check_ready(&device, required)
    }

    /// Take the device for one operation without waiting
    pub(crate) fn acquire(&self) -> EngineResult<DeviceGuard<'_, D>> {
        let device = match self.device.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                log::warn!("Reader '{}' busy, rejecting overlapping call", self.name);
                return Err(EngineError::DeviceBusy);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                // A panicking caller cannot leave the driver mid-capture
                log::warn!("Reader '{}' lock poisoned, recovering", self.name);
                poisoned.into_inner()
            }
        };
        Ok(DeviceGuard {
            handle: self,
            device,
        })
    }

    /// Fails when the handle was closed while a capture was running
    pub(crate) fn ensure_not_closed_during_capture(&self) -> EngineResult<()> {
        if self.is_open() {
            return Ok(());
        }
        log::warn!("Capture on '{}' aborted by close", self.name);
        Err(EngineError::NotReady(format!(
            "reader '{}' closed during capture",
            self.name
        )))
    }

    /// Readiness check against an already acquired device
    pub(crate) fn check_ready(&self, device: &D, required: &[DeviceFeature]) -> EngineResult<()> {
        if !self.is_open() {
            return Err(EngineError::NotReady(format!(
                "reader '{}' is closed",
                self.name
            )));
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|f| !device.has_feature(**f))
            .map(|f| format!("{:?}", f))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::NotReady(format!(
                "reader '{}' lacks {}",
                self.name,
                missing.join("+")
            )));
        }

        Ok(())
    }

    /// Acquire, check readiness and capture one probe
    pub(crate) fn capture_probe(&self, required: &[DeviceFeature]) -> EngineResult<MinutiaeSet> {
        let mut device = self.acquire()?;
        self.check_ready(&device, required)?;

        log::info!("Waiting for finger on '{}'...", self.name);
        let captured = device.capture_probe();
        self.ensure_not_closed_during_capture()?;
        let probe = captured?;
        log::debug!("Probe captured: {} minutiae", probe.len());
        Ok(probe)
    }
}

impl<D: CaptureDevice> Drop for DeviceHandle<D> {
    fn drop(&mut self) {
        let pending = self.close_pending.swap(false, Ordering::SeqCst);
        if self.open.swap(false, Ordering::SeqCst) || pending {
            let device = match self.device.get_mut() {
                Ok(d) => d,
                Err(poisoned) => poisoned.into_inner(),
            };
            close_driver(device, &self.name);
        }
    }
}
