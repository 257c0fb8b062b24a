pub mod sensor;

pub use sensor::{SimulatedConnector, SimulatedSensorNode, SimulatedSession};
