use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::core::{Channel, SessionInstructions};
use crate::error::DeviceError;

/// Device session lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Disconnected,
    Connected,
    Streaming,
    Closed,
}

/// Which logical channels the device should stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamingConfiguration {
    pub first: bool,
    pub second: bool,
    pub third: bool,
}

impl StreamingConfiguration {
    pub fn new(first: bool, second: bool, third: bool) -> Self {
        Self { first, second, third }
    }

    pub fn from_instructions(instructions: &SessionInstructions) -> Self {
        let [first, second, third] = instructions.enabled_channels();
        Self { first, second, third }
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::First => self.first,
            Channel::Second => self.second,
            Channel::Third => self.third,
        }
    }

    pub fn as_array(&self) -> [bool; 3] {
        [self.first, self.second, self.third]
    }

    pub fn enabled_count(&self) -> usize {
        self.as_array().iter().filter(|e| **e).count()
    }
}

/// Sensor channel routing written to the device; 0 disables a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfiguration {
    pub first: u8,
    pub second: u8,
    pub third: u8,
}

impl SensorConfiguration {
    pub fn from_instructions(instructions: &SessionInstructions) -> Self {
        Self {
            first: instructions.first.channel_number,
            second: instructions.second.channel_number,
            third: instructions.third.channel_number,
        }
    }

    pub fn sensor_channel(&self, channel: Channel) -> u8 {
        match channel {
            Channel::First => self.first,
            Channel::Second => self.second,
            Channel::Third => self.third,
        }
    }

    pub fn streaming(&self) -> StreamingConfiguration {
        StreamingConfiguration::new(self.first > 0, self.second > 0, self.third > 0)
    }

    /// Whether any enabled channel reads a sensor other than its default one
    pub fn requires_channel_configuration_support(&self) -> bool {
        Channel::ALL.iter().any(|ch| {
            let number = self.sensor_channel(*ch);
            number > 0 && number != ch.default_sensor_channel()
        })
    }
}

/// Unconverted reading as delivered by the device stream
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub counter: u8,
    /// Host reception time in seconds since the Unix epoch
    pub timestamp: f64,
    /// ADC words of the streamed channels only, in device channel order
    pub values: Vec<u16>,
}

/// Receiving end of an open device stream
///
/// The stream ends when the sender side is dropped.
pub struct FrameStream {
    rx: mpsc::Receiver<Result<RawFrame, DeviceError>>,
    opened_at: f64,
}

impl FrameStream {
    pub fn new(rx: mpsc::Receiver<Result<RawFrame, DeviceError>>) -> Self {
        Self {
            rx,
            opened_at: unix_now(),
        }
    }

    /// Create a stream together with the sender a device feeds
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<RawFrame, DeviceError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    /// Override the host time the stream counts as opened
    pub fn opened_at(mut self, unix_secs: f64) -> Self {
        self.opened_at = unix_secs;
        self
    }

    /// Host time in Unix seconds that frame timestamps are measured against
    pub fn start_time(&self) -> f64 {
        self.opened_at
    }

    pub async fn next(&mut self) -> Option<Result<RawFrame, DeviceError>> {
        self.rx.recv().await
    }
}

/// Current host time in seconds since the Unix epoch
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routing_needs_no_support() {
        let config = SensorConfiguration { first: 1, second: 0, third: 3 };
        assert!(!config.requires_channel_configuration_support());
        assert_eq!(config.streaming(), StreamingConfiguration::new(true, false, true));
    }

    #[test]
    fn test_remapped_routing_needs_support() {
        let config = SensorConfiguration { first: 4, second: 0, third: 0 };
        assert!(config.requires_channel_configuration_support());
        assert_eq!(config.streaming().enabled_count(), 1);
    }
}
