use crate::core::SampleFrame;
use crate::hal::types::RawFrame;

/// Full scale of the 16-bit ADC words
const RAW_FULL_SCALE: f64 = 65535.0;

/// Converts raw ADC words to acceleration in g
///
/// Parameterized once per session by the device-reported sensor range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    sensor_range: f64,
}

impl UnitConverter {
    pub fn new(sensor_range: f64) -> Self {
        Self { sensor_range }
    }

    pub fn sensor_range(&self) -> f64 {
        self.sensor_range
    }

    pub fn convert(&self, raw: u16) -> f64 {
        raw as f64 / RAW_FULL_SCALE * self.sensor_range - self.sensor_range / 2.0
    }

    /// Convert a raw frame, re-timestamping it relative to `start_time` (Unix seconds)
    pub fn raw_to_frame(&self, raw: &RawFrame, start_time: f64) -> SampleFrame {
        SampleFrame {
            counter: raw.counter,
            timestamp: raw.timestamp - start_time,
            values: raw.values.iter().map(|v| self.convert(*v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_spans_symmetric_range() {
        let converter = UnitConverter::new(200.0);
        assert_eq!(converter.convert(0), -100.0);
        assert_eq!(converter.convert(u16::MAX), 100.0);
        assert!(converter.convert(32768).abs() < 0.01);
    }

    #[test]
    fn test_raw_to_frame_is_relative() {
        let converter = UnitConverter::new(200.0);
        let raw = RawFrame {
            counter: 12,
            timestamp: 1_000.25,
            values: vec![0, u16::MAX],
        };

        let frame = converter.raw_to_frame(&raw, 1_000.0);
        assert_eq!(frame.counter, 12);
        assert_eq!(frame.timestamp, 0.25);
        assert_eq!(frame.values, vec![-100.0, 100.0]);
    }
}
