//! Simulated collaborators for tests and demo runs.
//!
//! Each driver is a cheap clone over shared interior state so a test (or
//! the agent) can keep a handle and script behavior while the workflow
//! owns its own clone.

use crate::frame::Frame;
use crate::traits::{
    CameraPreferences, CameraProvider, CameraStream, CaptureError, DecodeError, ImageClassifier,
    Prediction, QrDecoder,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct CameraState {
    frame: Option<Frame>,
    /// `current_frame` calls that still report "no frame yet".
    warmup_polls: u32,
    fail_next: Option<CaptureError>,
    acquire_delay: Option<Duration>,
    open: usize,
    acquired_total: usize,
    released_total: usize,
}

/// In-process camera provider with scriptable acquisition and frames.
#[derive(Clone, Debug, Default)]
pub struct SimulatedCamera {
    state: Arc<Mutex<CameraState>>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(frame: Frame) -> Self {
        let camera = Self::new();
        camera.set_frame(frame);
        camera
    }

    /// Frame returned by every live stream once warmup has elapsed.
    pub fn set_frame(&self, frame: Frame) {
        lock(&self.state).frame = Some(frame);
    }

    /// The next `n` frame polls report no frame, mimicking a stream that
    /// has not started producing dimensions yet.
    pub fn set_warmup_polls(&self, n: u32) {
        lock(&self.state).warmup_polls = n;
    }

    /// The next acquisition fails with `err`; later ones succeed again.
    pub fn fail_next_acquire(&self, err: CaptureError) {
        lock(&self.state).fail_next = Some(err);
    }

    /// Delays every acquisition, mimicking a pending permission prompt.
    pub fn set_acquire_delay(&self, delay: Duration) {
        lock(&self.state).acquire_delay = Some(delay);
    }

    /// Streams currently acquired and not yet released.
    pub fn open_streams(&self) -> usize {
        lock(&self.state).open
    }

    pub fn acquired_total(&self) -> usize {
        lock(&self.state).acquired_total
    }

    pub fn released_total(&self) -> usize {
        lock(&self.state).released_total
    }
}

#[async_trait]
impl CameraProvider for SimulatedCamera {
    async fn acquire(
        &self,
        _preferences: &CameraPreferences,
    ) -> Result<Box<dyn CameraStream>, CaptureError> {
        let delay = lock(&self.state).acquire_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        state.open += 1;
        state.acquired_total += 1;
        Ok(Box::new(SimulatedStream {
            shared: Arc::clone(&self.state),
            released: AtomicBool::new(false),
        }))
    }
}

struct SimulatedStream {
    shared: Arc<Mutex<CameraState>>,
    released: AtomicBool,
}

impl CameraStream for SimulatedStream {
    fn current_frame(&self) -> Option<Frame> {
        if self.released.load(Ordering::SeqCst) {
            return None;
        }
        let mut state = lock(&self.shared);
        if state.warmup_polls > 0 {
            state.warmup_polls -= 1;
            return None;
        }
        state.frame.clone()
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            let mut state = lock(&self.shared);
            state.open = state.open.saturating_sub(1);
            state.released_total += 1;
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Scripted pull-style decoder: each `decode` call pops the next result;
/// an exhausted script keeps reporting "no code found".
#[derive(Clone, Debug, Default)]
pub struct SimulatedQrDecoder {
    script: Arc<Mutex<VecDeque<Result<Option<String>, DecodeError>>>>,
}

impl SimulatedQrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A decoder that immediately yields `text`.
    pub fn with_text(text: impl Into<String>) -> Self {
        let decoder = Self::new();
        decoder.push_success(text);
        decoder
    }

    pub fn push_success(&self, text: impl Into<String>) {
        lock(&self.script).push_back(Ok(Some(text.into())));
    }

    pub fn push_miss(&self) {
        lock(&self.script).push_back(Ok(None));
    }

    pub fn push_failure(&self, err: DecodeError) {
        lock(&self.script).push_back(Err(err));
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl QrDecoder for SimulatedQrDecoder {
    async fn decode(&self, _frame: &Frame) -> Result<Option<String>, DecodeError> {
        lock(&self.script).pop_front().unwrap_or(Ok(None))
    }
}

#[derive(Debug, Default)]
struct ClassifierState {
    predictions: Vec<Prediction>,
    load_error: Option<CaptureError>,
    predict_error: Option<CaptureError>,
    predict_delay: Option<Duration>,
    loaded: bool,
    predict_calls: usize,
}

/// Fixed-table classifier with scriptable load/predict failures.
#[derive(Clone, Debug, Default)]
pub struct SimulatedClassifier {
    state: Arc<Mutex<ClassifierState>>,
}

impl SimulatedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predictions(predictions: Vec<Prediction>) -> Self {
        let classifier = Self::new();
        classifier.set_predictions(predictions);
        classifier
    }

    pub fn set_predictions(&self, predictions: Vec<Prediction>) {
        lock(&self.state).predictions = predictions;
    }

    /// Every subsequent `load` fails with `err`.
    pub fn fail_load(&self, err: CaptureError) {
        lock(&self.state).load_error = Some(err);
    }

    /// Every subsequent `predict` fails with `err`.
    pub fn fail_predict(&self, err: CaptureError) {
        lock(&self.state).predict_error = Some(err);
    }

    /// Delays every prediction, mimicking slow inference.
    pub fn set_predict_delay(&self, delay: Duration) {
        lock(&self.state).predict_delay = Some(delay);
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.state).loaded
    }

    pub fn predict_calls(&self) -> usize {
        lock(&self.state).predict_calls
    }
}

#[async_trait]
impl ImageClassifier for SimulatedClassifier {
    async fn load(&self) -> Result<(), CaptureError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.load_error.clone() {
            return Err(err);
        }
        state.loaded = true;
        Ok(())
    }

    async fn predict(&self, _frame: &Frame) -> Result<Vec<Prediction>, CaptureError> {
        let (delay, result) = {
            let mut state = lock(&self.state);
            state.predict_calls += 1;
            let result = match state.predict_error.clone() {
                Some(err) => Err(err),
                None => Ok(state.predictions.clone()),
            };
            (state.predict_delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}
