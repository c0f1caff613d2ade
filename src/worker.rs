//! Device worker thread
//!
//! The engine is synchronous: every call blocks until the operator scans a
//! finger. `DeviceWorker` is the wrapper for hosts that cannot block their
//! main thread. It moves the device handle and matcher onto a dedicated
//! thread and talks to it through crossbeam channels.
//!
//! Thread Safety:
//! Only one job runs at a time. Submitting while a job is outstanding fails
//! with `EngineError::DeviceBusy`, the same rule a shared `DeviceHandle`
//! enforces. Cancellation is cooperative and only observed at the engine's
//! poll points (before a capture, between gallery entries).
//!
//! Stopping never waits on the event queue: a caller that stopped reading
//! `events()` can still drop the worker.

use crate::config::MatchingConfig;
use crate::device::{CaptureDevice, DeviceHandle};
use crate::error::{EngineError, EngineResult};
use crate::identify::{Gallery, IdentificationEngine, IdentifyHooks};
use crate::matcher::Matcher;
use crate::score::MatchOutcome;
use crate::verify::VerificationEngine;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

const EVENT_QUEUE: usize = 64;

/// Work items accepted by the worker
#[derive(Debug, Clone)]
pub enum DeviceJob {
    Verify { template: Vec<u8> },
    VerifyAny { templates: Vec<Vec<u8>> },
    Identify { gallery: Gallery },
    Shutdown,
}

/// Events streamed back from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Gallery preparation progress of the running identification
    Progress { current: usize, total: usize },
    /// The running job completed
    Finished(EngineResult<MatchOutcome>),
}

/// Owns one device and a matcher on a dedicated thread
pub struct DeviceWorker {
    job_tx: Sender<DeviceJob>,
    event_rx: Receiver<WorkerEvent>,
    cancel: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    /// Dropped to stop the worker; never sent on
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceWorker {
    /// Start the worker thread
    pub fn start<D: CaptureDevice + 'static>(
        device: DeviceHandle<D>,
        matcher: Box<dyn Matcher>,
        config: MatchingConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        log::info!(
            "Starting device worker for '{}' (matcher: {})",
            device.name(),
            matcher.name()
        );

        let (job_tx, job_rx) = bounded::<DeviceJob>(1);
        let (event_tx, event_rx) = bounded::<WorkerEvent>(EVENT_QUEUE);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let cancel = Arc::new(AtomicBool::new(false));
        let busy = Arc::new(AtomicBool::new(false));

        let thread = {
            let cancel = Arc::clone(&cancel);
            let busy = Arc::clone(&busy);
            std::thread::Builder::new()
                .name("fpcore-device".to_string())
                .spawn(move || {
                    let channels = WorkerChannels {
                        jobs: job_rx,
                        events: event_tx,
                        stop: stop_rx,
                    };
                    run_worker(device, matcher, config, channels, cancel, busy);
                })
                .map_err(|e| EngineError::NotReady(format!("failed to spawn worker: {}", e)))?
        };

        Ok(Self {
            job_tx,
            event_rx,
            cancel,
            busy,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Queue a job. Fails `DeviceBusy` while another job is outstanding.
    pub fn submit(&self, job: DeviceJob) -> EngineResult<()> {
        if matches!(job, DeviceJob::Shutdown) {
            let _ = self.job_tx.try_send(job);
            return Ok(());
        }

        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(EngineError::DeviceBusy);
        }
        self.cancel.store(false, Ordering::SeqCst);

        match self.job_tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.busy.store(false, Ordering::SeqCst);
                Err(EngineError::DeviceBusy)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.busy.store(false, Ordering::SeqCst);
                Err(EngineError::NotReady("device worker stopped".to_string()))
            }
        }
    }

    /// Event stream of the running job
    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.event_rx
    }

    /// Ask the running job to stop at its next poll point
    pub fn cancel(&self) {
        log::info!("Cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Submit a job and block until it finishes, discarding progress events
    pub fn run(&self, job: DeviceJob) -> EngineResult<MatchOutcome> {
        self.submit(job)?;
        loop {
            match self.event_rx.recv() {
                Ok(WorkerEvent::Finished(result)) => return result,
                Ok(WorkerEvent::Progress { .. }) => {}
                Err(_) => {
                    return Err(EngineError::NotReady("device worker stopped".to_string()))
                }
            }
        }
    }

    /// Stop the worker and wait for the thread to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.thread.take() {
            log::info!("Stopping device worker...");
            self.cancel.store(true, Ordering::SeqCst);
            // Disconnecting the stop channel wakes the worker whether it waits
            // for a job or for room in the event queue
            drop(self.stop_tx.take());
            if handle.join().is_err() {
                log::error!("Device worker thread panicked");
            }
            log::info!("✓ Device worker stopped");
        }
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerChannels {
    jobs: Receiver<DeviceJob>,
    events: Sender<WorkerEvent>,
    stop: Receiver<()>,
}

fn run_worker<D: CaptureDevice>(
    device: DeviceHandle<D>,
    matcher: Box<dyn Matcher>,
    config: MatchingConfig,
    channels: WorkerChannels,
    cancel: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
) {
    let verifier = VerificationEngine::new(matcher.as_ref(), config.clone());
    let identifier = IdentificationEngine::new(matcher.as_ref(), config);
    let (verifier, identifier) = match (verifier, identifier) {
        (Ok(v), Ok(i)) => (v, i),
        (Err(e), _) | (_, Err(e)) => {
            log::error!("Device worker failed to start: {}", e);
            return;
        }
    };

    let WorkerChannels {
        jobs: job_rx,
        events: event_tx,
        stop: stop_rx,
    } = channels;

    loop {
        let next = select! {
            recv(job_rx) -> job => job.ok(),
            recv(stop_rx) -> _ => None,
        };
        let Some(job) = next else { break };
        let cancelled = || cancel.load(Ordering::SeqCst);

        let result = match job {
            DeviceJob::Shutdown => break,
            _ if cancelled() => Err(EngineError::Cancelled),
            DeviceJob::Verify { template } => verifier.verify(&device, &template),
            DeviceJob::VerifyAny { templates } => verifier.verify_any(&device, &templates),
            DeviceJob::Identify { gallery } => {
                let mut progress = |current: usize, total: usize| {
                    let _ = event_tx.try_send(WorkerEvent::Progress { current, total });
                };
                let hooks = IdentifyHooks {
                    progress: Some(&mut progress),
                    cancel: Some(&cancelled),
                };
                identifier.identify_with(&device, &gallery, hooks)
            }
        };

        if let Err(e) = &result {
            log::warn!("Device job failed: {}", e);
        }
        busy.store(false, Ordering::SeqCst);
        let delivered = select! {
            send(event_tx, WorkerEvent::Finished(result)) -> sent => sent.is_ok(),
            recv(stop_rx) -> _ => false,
        };
        if !delivered {
            break;
        }
    }

    log::debug!("Device worker loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{synthetic_sample, SimulatedReader, SimulatorConfig};
    use crate::matcher::stub::PairCountMatcher;
    use crate::template::minutiae::pack_sets;
    use crate::template::{Finger, MinutiaeSet, Template, TemplateCodec};
    use chrono::Utc;

    fn enrolled_bytes(owner: &str, seed: u64) -> Vec<u8> {
        let cfg = SimulatorConfig::default();
        let sets: Vec<MinutiaeSet> = (1..=3).map(|scan| synthetic_sample(&cfg, seed, scan)).collect();
        let template =
            Template::new(owner, Finger::LeftIndex, pack_sets(&sets).unwrap(), 3, Utc::now())
                .unwrap();
        TemplateCodec::encode(&template)
    }

    fn worker(seed: u64) -> DeviceWorker {
        let reader = SimulatedReader::new("sim");
        reader.controller().place_finger(seed);
        let device = DeviceHandle::open(reader).unwrap();
        DeviceWorker::start(
            device,
            Box::new(PairCountMatcher::new()),
            MatchingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_job_round_trip() {
        let worker = worker(11);
        let outcome = worker
            .run(DeviceJob::Verify {
                template: enrolled_bytes("alice", 11),
            })
            .unwrap();
        assert!(outcome.matched);
        assert!(!worker.is_busy());
        worker.shutdown();
    }

    #[test]
    fn test_identify_streams_progress() {
        let worker = worker(2);
        let mut gallery = Gallery::new();
        for seed in 1..=3 {
            let id = format!("user{}", seed);
            gallery.push(&id, enrolled_bytes(&id, seed)).unwrap();
        }

        worker.submit(DeviceJob::Identify { gallery }).unwrap();
        let mut progress = Vec::new();
        let outcome = loop {
            match worker.events().recv().unwrap() {
                WorkerEvent::Progress { current, total } => progress.push((current, total)),
                WorkerEvent::Finished(result) => break result.unwrap(),
            }
        };

        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(outcome.candidate_id.as_deref(), Some("user2"));
    }

    #[test]
    fn test_error_results_are_delivered() {
        let worker = worker(1);
        assert_eq!(
            worker.run(DeviceJob::Identify {
                gallery: Gallery::new()
            }),
            Err(EngineError::EmptyGallery)
        );
    }

    #[test]
    fn test_drop_with_unread_events_does_not_hang() {
        let worker = worker(1);
        let junk = || DeviceJob::Verify {
            template: b"not a template".to_vec(),
        };

        // Never read events: the queue fills and the worker blocks on it
        let mut accepted = 0;
        for _ in 0..5000 {
            if accepted > EVENT_QUEUE + 1 {
                break;
            }
            match worker.submit(junk()) {
                Ok(()) => accepted += 1,
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(1)),
            }
        }
        assert!(accepted > EVENT_QUEUE);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(worker);
            let _ = done_tx.send(());
        });
        assert!(done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .is_ok());
    }
}
