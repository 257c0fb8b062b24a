pub mod csv_sink;
pub mod dataloss;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::{SampleFrame, SessionInstructions};
use crate::hal::StreamingConfiguration;

pub use csv_sink::{CsvStorage, CsvSink};
pub use dataloss::DatalossTracker;

/// Session description written ahead of the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageMetadata {
    pub name: String,
    pub start_time: String,
    /// Sensor range label, e.g. "± 100 g₀"
    pub sensor_range: String,
    pub sample_rate: f64,
    pub instructions: SessionInstructions,
}

/// Per-session persistence of converted frames
pub trait StorageSink: Send {
    fn append(&mut self, frame: &SampleFrame) -> Result<()>;

    /// Frames detected as missing so far
    fn dataloss(&self) -> u64;

    /// Flush and release the underlying file
    fn close(&mut self) -> Result<()>;
}

/// Opens a storage sink for a new session
pub trait StorageBackend: Send + Sync {
    fn open(
        &self,
        name: &str,
        streaming: StreamingConfiguration,
        metadata: &StorageMetadata,
    ) -> Result<Box<dyn StorageSink>>;
}
