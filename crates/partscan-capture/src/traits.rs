use crate::frame::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Collaborator failures, mapped into the user-visible workflow taxonomy
/// at the call site.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera access denied: {0}")]
    AccessDenied(String),
    #[error("no usable camera: {0}")]
    Unavailable(String),
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// A failed QR decode attempt. Distinct from "no code in this frame",
/// which is `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("qr decode failed: {0}")]
pub struct DecodeError(pub String);

/// Facing-mode hint passed to camera providers.
///
/// `RearPreferred` asks for a rear/back-labeled device if one can be
/// enumerated, degrading to an "environment" hint and then to any device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraFacing {
    RearPreferred,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraPreferences {
    pub facing: CameraFacing,
    /// Optional `(width, height)` hint; providers degrade from exact to
    /// relaxed constraints rather than failing on an unmet hint.
    pub resolution_hint: Option<(u32, u32)>,
}

impl CameraPreferences {
    pub fn rear_preferred() -> Self {
        Self {
            facing: CameraFacing::RearPreferred,
            resolution_hint: None,
        }
    }

    pub fn any() -> Self {
        Self {
            facing: CameraFacing::Any,
            resolution_hint: None,
        }
    }
}

impl Default for CameraPreferences {
    fn default() -> Self {
        Self::rear_preferred()
    }
}

/// A single ranked classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Confidence must be finite and within [0.0, 1.0].
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(CaptureError::Inference(format!(
                "confidence out of range [0.0, 1.0]: {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A live camera feed handle.
///
/// The stream has exactly one owner at a time; `release` stops all
/// underlying tracks and is idempotent.
pub trait CameraStream: Send + Sync {
    /// The most recent frame, or `None` while the stream is not yet
    /// producing frames with dimensions (or after release).
    fn current_frame(&self) -> Option<Frame>;

    /// Stops all underlying tracks. Safe to call repeatedly.
    fn release(&self);

    fn is_released(&self) -> bool;
}

impl std::fmt::Debug for dyn CameraStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn CameraStream")
    }
}

/// Pluggable camera acquisition backend.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Acquires a live stream matching the preferences as closely as the
    /// backend allows. May stay pending on a permission grant; callers
    /// must tolerate cancellation while waiting.
    async fn acquire(
        &self,
        preferences: &CameraPreferences,
    ) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// Pull-style QR decoder: one attempt per still frame.
///
/// Push-style backends are adapted by buffering their latest result behind
/// this interface; the workflow polls either shape the same way.
#[async_trait]
pub trait QrDecoder: Send + Sync {
    /// Returns the decoded payload if the frame contains a readable code,
    /// `Ok(None)` when no code was found.
    async fn decode(&self, frame: &Frame) -> Result<Option<String>, DecodeError>;
}

/// Pluggable image classification backend.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Loads model weights from the backend's configured location. Called
    /// once at workflow construction; failure leaves the classifier
    /// unusable and later predictions fail.
    async fn load(&self) -> Result<(), CaptureError>;

    /// Classifies a still image. The returned predictions are not
    /// required to be sorted; callers rank by confidence.
    async fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, CaptureError>;
}
