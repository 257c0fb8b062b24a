pub mod controller;
pub mod measurement;
pub mod state;

pub use controller::{
    ControllerSettings, HealthReport, MeasurementController, StartOutcome, StopOutcome,
};
pub use measurement::{EndReason, MeasurementSession};
pub use state::{MeasurementState, MeasurementStatus, SessionState};
