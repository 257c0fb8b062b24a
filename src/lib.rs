pub mod analysis;
pub mod broadcast;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod hal;
pub mod logging;
pub mod observability;
pub mod storage;

pub use config::AppConfig;
pub use engine::{MeasurementController, StartOutcome, StopOutcome};
pub use error::{AcquisitionError, DeviceError, Result};
