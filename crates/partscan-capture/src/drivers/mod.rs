pub mod rqrr;
pub mod simulated;

pub use self::rqrr::RqrrDecoder;
pub use self::simulated::{SimulatedCamera, SimulatedClassifier, SimulatedQrDecoder};
