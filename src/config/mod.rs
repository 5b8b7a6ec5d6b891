//! Configuration and calibration data

pub mod calibration;
pub mod settings;

pub use calibration::Calibration;
pub use settings::*;
