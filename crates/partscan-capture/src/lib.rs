//! Collaborator contracts for the capture workflow: camera acquisition,
//! QR decoding, and image classification.
//!
//! The workflow never talks to hardware or model runtimes directly; it is
//! generic over the traits in [`traits`]. `drivers` holds the in-process
//! implementations: simulated drivers for tests and demo runs, and a
//! pull-style QR decoder backed by `rqrr`.

pub mod drivers;
pub mod frame;
pub mod traits;

pub use frame::{Frame, FrameError};
pub use traits::{
    CameraFacing, CameraPreferences, CameraProvider, CameraStream, CaptureError, DecodeError,
    ImageClassifier, Prediction, QrDecoder,
};
