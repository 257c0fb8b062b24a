use serde::{Deserialize, Serialize};

/// Frame counter modulus of the sensor node stream
pub const COUNTER_MODULUS: u16 = 256;

/// One converted multi-channel reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFrame {
    /// Wrapping frame counter as reported by the device
    pub counter: u8,

    /// Seconds since the ingestion loop started
    pub timestamp: f64,

    /// Physical values of the enabled channels, in device channel order
    pub values: Vec<f64>,
}

impl SampleFrame {
    pub fn new(counter: u8, timestamp: f64, values: Vec<f64>) -> Self {
        Self {
            counter,
            timestamp,
            values,
        }
    }
}

/// One point of the derived metric series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedPoint {
    pub x: f64,
    pub y: f64,
}

/// Observer payload record
///
/// Exactly one of the per-frame fields, `derived` or `dataloss` is populated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataValue {
    pub timestamp: Option<f64>,
    pub first: Option<f64>,
    pub second: Option<f64>,
    pub third: Option<f64>,
    pub derived: Option<Vec<DerivedPoint>>,
    pub counter: Option<u8>,
    pub dataloss: Option<u64>,
}

impl DataValue {
    pub fn frame(counter: u8, timestamp: f64, values: [Option<f64>; 3]) -> Self {
        let [first, second, third] = values;
        Self {
            timestamp: Some(timestamp),
            first,
            second,
            third,
            counter: Some(counter),
            ..Default::default()
        }
    }

    pub fn dataloss(count: u64) -> Self {
        Self {
            dataloss: Some(count),
            ..Default::default()
        }
    }

    pub fn derived(points: Vec<DerivedPoint>) -> Self {
        Self {
            derived: Some(points),
            ..Default::default()
        }
    }

    pub fn is_frame(&self) -> bool {
        self.counter.is_some()
    }
}

/// Ordered group of records flushed to observers together
pub type Batch = Vec<DataValue>;

/// Message delivered to every registered observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObserverMessage {
    Batch(Batch),
    Error {
        error: bool,
        #[serde(rename = "type")]
        kind: String,
        message: String,
    },
}

impl ObserverMessage {
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            error: true,
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// True for the dataloss summary that closes a session
    pub fn is_summary(&self) -> bool {
        matches!(self, Self::Batch(batch) if batch.len() == 1 && batch[0].dataloss.is_some())
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Batch(batch) if batch.iter().any(|v| v.derived.is_some()))
    }
}
