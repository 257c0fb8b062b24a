pub mod observer;
pub mod registry;

pub use observer::{spawn_observer, JsonLineSink, ObserverSink, ObserverTask};
pub use registry::{ObserverHandle, ObserverId, ObserverRegistry};
