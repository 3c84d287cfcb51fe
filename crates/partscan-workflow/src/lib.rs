//! Capture workflow state machine.
//!
//! Drives one scan-and-match attempt through its four steps: idle, QR
//! scanning, part photo capture, and result. The pure state lives in
//! [`session::Session`]; [`service::WorkflowService`] owns the camera
//! stream and mediates between the collaborators behind the
//! `partscan-capture` traits.

pub mod config;
pub mod event_bus;
pub mod service;
pub mod session;

pub use config::{ConfigError, WorkflowConfig};
pub use event_bus::EventBus;
pub use service::{CaptureOutcome, WorkflowService};
pub use session::{Session, SessionError, SessionSnapshot, Step};
