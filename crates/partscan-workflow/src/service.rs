use crate::config::WorkflowConfig;
use crate::event_bus::EventBus;
use crate::session::{Session, SessionError, SessionSnapshot, Step};
use partscan_capture::{
    CameraPreferences, CameraProvider, CameraStream, CaptureError, ImageClassifier, Prediction,
    QrDecoder,
};
use partscan_core::events::SystemEvent;
use partscan_core::{Verdict, WorkflowError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of a user capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The stream is not producing frames yet; nothing happened, retry.
    NotReady,
    /// A reset arrived while classification was in flight; the result was
    /// discarded.
    Cancelled,
    /// The session reached the result step with this verdict.
    Completed(Verdict),
}

/// Session state plus the one exclusive resource, guarded together so the
/// single-stream invariant holds across every transition.
struct Inner {
    session: Session,
    stream: Option<Box<dyn CameraStream>>,
    /// Generation and name of the async operation currently in flight for
    /// this session, if any. Blocks a second overlapping start/capture.
    /// The generation tag keeps a superseded operation from wiping the
    /// marker a restarted generation owns.
    in_flight: Option<(u64, &'static str)>,
}

/// Clears the in-flight marker when the owning start/capture future is
/// dropped before completion, so an abandoned call cannot wedge the
/// session until reset.
struct InFlightGuard {
    inner: Arc<RwLock<Inner>>,
    generation: u64,
    armed: bool,
}

impl InFlightGuard {
    fn new(inner: Arc<RwLock<Inner>>, generation: u64) -> Self {
        Self {
            inner,
            generation,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let generation = self.generation;
        // Drop cannot block on the session lock; clear from a detached
        // task. Outside a runtime the process is tearing down anyway.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let mut inner = inner.write().await;
                if inner.in_flight.map_or(false, |(g, _)| g == generation) {
                    inner.in_flight = None;
                }
            });
        }
    }
}

/// Drives a [`Session`] through idle -> QR scanning -> part capture ->
/// result, mediating between the camera provider, QR decoder, and image
/// classifier.
///
/// Cloning is cheap and shares the same session; the scan loop runs on a
/// clone of the service.
pub struct WorkflowService<P, D, C> {
    camera: Arc<P>,
    decoder: Arc<D>,
    classifier: Arc<C>,
    inner: Arc<RwLock<Inner>>,
    bus: EventBus,
    config: WorkflowConfig,
    classifier_ready: Arc<AtomicBool>,
}

impl<P, D, C> Clone for WorkflowService<P, D, C> {
    fn clone(&self) -> Self {
        Self {
            camera: Arc::clone(&self.camera),
            decoder: Arc::clone(&self.decoder),
            classifier: Arc::clone(&self.classifier),
            inner: Arc::clone(&self.inner),
            bus: self.bus.clone(),
            config: self.config.clone(),
            classifier_ready: Arc::clone(&self.classifier_ready),
        }
    }
}

impl<P, D, C> WorkflowService<P, D, C>
where
    P: CameraProvider + 'static,
    D: QrDecoder + 'static,
    C: ImageClassifier + 'static,
{
    pub fn new(camera: P, decoder: D, classifier: C, config: WorkflowConfig) -> Self {
        let bus = EventBus::new(config.event_channel_capacity);
        Self {
            camera: Arc::new(camera),
            decoder: Arc::new(decoder),
            classifier: Arc::new(classifier),
            inner: Arc::new(RwLock::new(Inner {
                session: Session::new(),
                stream: None,
                in_flight: None,
            })),
            bus,
            config,
            classifier_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Loads classifier weights once, at workstation startup.
    ///
    /// On failure the classifier stays unusable: later captures still
    /// reach the result step but fail closed with a mismatch verdict.
    pub async fn load_model(&self) -> Result<(), WorkflowError> {
        match self.classifier.load().await {
            Ok(()) => {
                self.classifier_ready.store(true, Ordering::SeqCst);
                info!("classifier model loaded");
                Ok(())
            }
            Err(err) => {
                let err = map_capture(err);
                self.inner
                    .write()
                    .await
                    .session
                    .record_error(err.to_string());
                self.raise_error("model", &err);
                Err(err)
            }
        }
    }

    /// Idle -> ScanningQr: acquires the QR camera and starts the decode
    /// poll loop. On acquisition failure the step stays Idle and the same
    /// start can be retried.
    pub async fn start(&self) -> Result<(), WorkflowError> {
        let generation = {
            let mut inner = self.inner.write().await;
            if inner.session.step() != Step::Idle {
                return Err(map_session(SessionError::InvalidTransition {
                    from: inner.session.step(),
                    event: "start",
                }));
            }
            if let Some((_, op)) = inner.in_flight {
                return Err(map_session(SessionError::Busy(op)));
            }
            let generation = inner.session.generation();
            inner.in_flight = Some((generation, "start"));
            generation
        };
        let mut marker = InFlightGuard::new(Arc::clone(&self.inner), generation);

        // May stay pending on a permission grant; a reset in the meantime
        // bumps the generation and the result below is discarded.
        let preferences = CameraPreferences {
            facing: self.config.camera_facing,
            resolution_hint: None,
        };
        let acquired = self.camera.acquire(&preferences).await;

        let mut inner = self.inner.write().await;
        marker.disarm();
        // Only this generation's marker; a restart's pending operation
        // keeps its own.
        if inner.in_flight.map_or(false, |(g, _)| g == generation) {
            inner.in_flight = None;
        }
        if inner.session.generation() != generation {
            if let Ok(ref stream) = acquired {
                stream.release();
            }
            debug!("start superseded by reset while acquiring camera");
            return Ok(());
        }

        match acquired {
            Ok(stream) => match inner.session.begin_scan() {
                Ok(()) => {
                    inner.stream = Some(stream);
                    drop(inner);
                    self.bus.publish(SystemEvent::ScanStarted);
                    info!("qr scanning started");
                    self.spawn_scan_loop(generation);
                    Ok(())
                }
                Err(err) => {
                    stream.release();
                    Err(map_session(err))
                }
            },
            Err(err) => {
                let err = map_capture(err);
                inner.session.record_error(err.to_string());
                drop(inner);
                self.raise_error("camera", &err);
                Err(err)
            }
        }
    }

    /// Snapshots the current part-camera frame, classifies it, and moves
    /// to the result step.
    ///
    /// Returns [`CaptureOutcome::NotReady`] without any state change while
    /// the stream has no frame yet. Classification failure fails closed:
    /// the session still reaches Result with a mismatch verdict and the
    /// error is both recorded and returned.
    pub async fn capture(&self) -> Result<CaptureOutcome, WorkflowError> {
        let (generation, frame) = {
            let mut inner = self.inner.write().await;
            if inner.session.step() != Step::CapturingPart {
                return Err(map_session(SessionError::InvalidTransition {
                    from: inner.session.step(),
                    event: "capture",
                }));
            }
            if let Some((_, op)) = inner.in_flight {
                return Err(map_session(SessionError::Busy(op)));
            }
            let Some(stream) = inner.stream.as_ref() else {
                return Err(WorkflowError::PlaybackFailed(
                    "part camera is not running; retry camera acquisition".to_string(),
                ));
            };
            let Some(frame) = stream.current_frame() else {
                return Ok(CaptureOutcome::NotReady);
            };
            // Snapshot taken; the stream's job is done on every path from
            // here, success or failure.
            if let Some(stream) = inner.stream.take() {
                stream.release();
            }
            let generation = inner.session.generation();
            inner.in_flight = Some((generation, "capture"));
            (generation, frame)
        };
        let mut marker = InFlightGuard::new(Arc::clone(&self.inner), generation);

        self.bus.publish(SystemEvent::PartCaptured {
            width: frame.width(),
            height: frame.height(),
        });

        let image_png = match frame.encode_png() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, "captured frame could not be encoded");
                None
            }
        };

        let predictions = if self.classifier_ready.load(Ordering::SeqCst) {
            self.classifier.predict(&frame).await
        } else {
            Err(CaptureError::ModelLoad(
                "classifier model is not loaded".to_string(),
            ))
        };

        let mut inner = self.inner.write().await;
        marker.disarm();
        if inner.in_flight.map_or(false, |(g, _)| g == generation) {
            inner.in_flight = None;
        }
        if inner.session.generation() != generation {
            debug!("capture superseded by reset during classification");
            return Ok(CaptureOutcome::Cancelled);
        }

        match predictions.and_then(select_best) {
            Ok(best) => {
                let verdict = inner
                    .session
                    .complete_capture(image_png, best.label.clone())
                    .map_err(map_session)?;
                drop(inner);
                info!(predicted_label = %best.label, %verdict, "classification complete");
                self.bus.publish(SystemEvent::VerdictReached {
                    predicted_label: best.label,
                    verdict,
                });
                Ok(CaptureOutcome::Completed(verdict))
            }
            Err(err) => {
                let err = map_capture(err);
                inner
                    .session
                    .fail_capture(image_png, err.to_string())
                    .map_err(map_session)?;
                drop(inner);
                self.raise_error("classifier", &err);
                self.bus.publish(SystemEvent::VerdictReached {
                    predicted_label: String::new(),
                    verdict: Verdict::Mismatch,
                });
                Err(err)
            }
        }
    }

    /// Re-attempts part-camera acquisition after it failed on entry to
    /// CapturingPart. No-op when a stream is already live.
    pub async fn retry_part_camera(&self) -> Result<(), WorkflowError> {
        let generation = {
            let inner = self.inner.read().await;
            if inner.session.step() != Step::CapturingPart {
                return Err(map_session(SessionError::InvalidTransition {
                    from: inner.session.step(),
                    event: "retry_part_camera",
                }));
            }
            if inner.stream.is_some() {
                return Ok(());
            }
            inner.session.generation()
        };
        self.acquire_part_stream(generation).await
    }

    /// Returns to Idle from any state: releases any active stream, clears
    /// all session fields, and bumps the generation so in-flight callbacks
    /// become no-ops. The scan loop is never aborted mid-await (it could
    /// be holding a freshly acquired stream); it retires itself at its
    /// next generation check, releasing anything it acquired meanwhile.
    /// Idempotent.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        if let Some(stream) = inner.stream.take() {
            stream.release();
        }
        inner.in_flight = None;
        inner.session.reset();
        drop(inner);
        self.bus.publish(SystemEvent::WorkflowReset);
        info!("workflow reset");
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.session.snapshot()
    }

    /// True while a camera stream is live.
    pub async fn has_active_stream(&self) -> bool {
        self.inner.read().await.stream.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn spawn_scan_loop(&self, generation: u64) {
        let service = self.clone();
        let period = Duration::from_millis(self.config.scan_interval_ms.max(1));
        tokio::spawn(async move { service.scan_loop(generation, period).await });
    }

    /// Bounded-recurrence QR poll. One decode attempt at a time: the next
    /// tick cannot start before the previous attempt resolved. Exits the
    /// moment the generation moves on or a code is accepted.
    async fn scan_loop(&self, generation: u64, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let frame = {
                let inner = self.inner.read().await;
                if inner.session.generation() != generation
                    || inner.session.step() != Step::ScanningQr
                {
                    return;
                }
                inner.stream.as_ref().and_then(|s| s.current_frame())
            };
            let Some(frame) = frame else {
                continue;
            };
            match self.decoder.decode(&frame).await {
                Ok(Some(text)) if !text.is_empty() => {
                    if self.finish_scan(generation, text).await {
                        return;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    // Same as "no code in this frame": keep scanning.
                    debug!(error = %err, "qr decode attempt failed");
                }
            }
        }
    }

    /// Accepts a decoded payload: releases the QR stream, advances to
    /// CapturingPart, and immediately acquires the part camera. Returns
    /// true when the loop should stop.
    async fn finish_scan(&self, generation: u64, text: String) -> bool {
        {
            let mut inner = self.inner.write().await;
            if inner.session.generation() != generation
                || inner.session.step() != Step::ScanningQr
            {
                return true;
            }
            if let Err(err) = inner.session.qr_decoded(text.clone()) {
                warn!(error = %err, "decoded payload rejected");
                return false;
            }
            if let Some(stream) = inner.stream.take() {
                stream.release();
            }
        }
        info!(qr_text = %text, "qr code decoded");
        self.bus.publish(SystemEvent::QrDecoded { qr_text: text });

        if let Err(err) = self.acquire_part_stream(generation).await {
            warn!(error = %err, "part camera acquisition failed; awaiting retry");
        }
        true
    }

    /// Acquires a general-purpose stream for the part photo. The error is
    /// surfaced and recorded; the step stays CapturingPart so the same
    /// stage can be retried.
    async fn acquire_part_stream(&self, generation: u64) -> Result<(), WorkflowError> {
        let acquired = self.camera.acquire(&CameraPreferences::any()).await;

        let mut inner = self.inner.write().await;
        if inner.session.generation() != generation
            || inner.session.step() != Step::CapturingPart
        {
            if let Ok(ref stream) = acquired {
                stream.release();
            }
            return Ok(());
        }
        match acquired {
            Ok(stream) => {
                // Never hold two streams: replace-then-release order keeps
                // the invariant observable at every instant.
                if let Some(old) = inner.stream.take() {
                    old.release();
                }
                inner.stream = Some(stream);
                Ok(())
            }
            Err(err) => {
                let err = map_capture(err);
                inner.session.record_error(err.to_string());
                drop(inner);
                self.raise_error("part-camera", &err);
                Err(err)
            }
        }
    }

    fn raise_error(&self, source: &str, err: &WorkflowError) {
        warn!(source, error = %err, "workflow error");
        self.bus.publish(SystemEvent::ErrorRaised {
            source: source.to_string(),
            message: err.to_string(),
        });
    }
}

/// Ranks predictions by confidence, descending. Equal confidences resolve
/// to whichever came first in the collaborator's returned ordering; that
/// nondeterminism is part of the contract, not a bug to fix here.
fn select_best(predictions: Vec<Prediction>) -> Result<Prediction, CaptureError> {
    for prediction in &predictions {
        prediction.validate()?;
    }
    let mut best: Option<&Prediction> = None;
    for prediction in &predictions {
        match best {
            Some(current) if prediction.confidence > current.confidence => {
                best = Some(prediction)
            }
            Some(_) => {}
            None => best = Some(prediction),
        }
    }
    best.cloned()
        .ok_or_else(|| CaptureError::Inference("classifier returned no predictions".to_string()))
}

fn map_capture(err: CaptureError) -> WorkflowError {
    match err {
        CaptureError::AccessDenied(m) => WorkflowError::CameraAccessDenied(m),
        CaptureError::Unavailable(m) => WorkflowError::CameraUnavailable(m),
        CaptureError::Playback(m) => WorkflowError::PlaybackFailed(m),
        CaptureError::ModelLoad(m) => WorkflowError::ModelLoadFailed(m),
        CaptureError::Inference(m) => WorkflowError::ClassificationFailed(m),
    }
}

fn map_session(err: SessionError) -> WorkflowError {
    WorkflowError::InvalidOperation(err.to_string())
}
