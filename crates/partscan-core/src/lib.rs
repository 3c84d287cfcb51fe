//! Core domain types for the partscan verification workstation.

pub mod error;
pub mod events;
pub mod telemetry;
pub mod time;
pub mod types;

pub use error::*;
pub use types::*;
