use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// ADC clock of the sensor node in Hz
pub const ADC_CLOCK_HZ: f64 = 38_400_000.0;

/// Logical measurement channel as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    First,
    Second,
    Third,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::First, Channel::Second, Channel::Third];

    /// Position in logical order (first = 0)
    pub fn index(self) -> usize {
        match self {
            Channel::First => 0,
            Channel::Second => 1,
            Channel::Third => 2,
        }
    }

    /// Sensor channel a logical channel reads when no remapping is requested
    pub fn default_sensor_channel(self) -> u8 {
        self.index() as u8 + 1
    }
}

/// Sensor routing for one logical channel; `channel_number == 0` disables it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelSelection {
    pub channel_number: u8,
    #[serde(default)]
    pub sensor_id: String,
}

impl ChannelSelection {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn sensor(channel_number: u8, sensor_id: impl Into<String>) -> Self {
        Self {
            channel_number,
            sensor_id: sensor_id.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.channel_number > 0
    }
}

/// ADC parameters; every field falls back to the sensor node default when absent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdcConfig {
    pub prescaler: Option<u32>,
    pub acquisition_time: Option<u32>,
    pub oversampling_rate: Option<u32>,
    pub reference_voltage: Option<f64>,
}

impl AdcConfig {
    pub fn prescaler(&self) -> u32 {
        self.prescaler.filter(|v| *v > 0).unwrap_or(2)
    }

    pub fn acquisition_time(&self) -> u32 {
        self.acquisition_time.filter(|v| *v > 0).unwrap_or(8)
    }

    pub fn oversampling_rate(&self) -> u32 {
        self.oversampling_rate.filter(|v| *v > 0).unwrap_or(64)
    }

    pub fn reference_voltage(&self) -> f64 {
        self.reference_voltage.filter(|v| *v > 0.0).unwrap_or(3.3)
    }

    /// Copy with every default filled in
    pub fn resolved(&self) -> Self {
        Self {
            prescaler: Some(self.prescaler()),
            acquisition_time: Some(self.acquisition_time()),
            oversampling_rate: Some(self.oversampling_rate()),
            reference_voltage: Some(self.reference_voltage()),
        }
    }

    /// ADC sample rate in Hz, shared by all enabled channels
    pub fn sample_rate(&self) -> f64 {
        let cycles = (self.prescaler() + 1) as f64
            * (self.acquisition_time() + 13) as f64
            * self.oversampling_rate() as f64;
        ADC_CLOCK_HZ / cycles
    }
}

/// Request for the post-session derived metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetricRequest {
    pub channel: Channel,
    /// Analysis window width in milliseconds
    pub window_width_ms: f64,
}

impl DerivedMetricRequest {
    pub fn window_width_secs(&self) -> f64 {
        self.window_width_ms / 1000.0
    }
}

/// Client-provided acquisition parameters, immutable once a session starts
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionInstructions {
    pub name: Option<String>,
    /// Session duration limit in seconds
    pub time: Option<f64>,
    pub first: ChannelSelection,
    pub second: ChannelSelection,
    pub third: ChannelSelection,
    #[serde(default)]
    pub adc: AdcConfig,
    pub derived_metric: Option<DerivedMetricRequest>,
    /// Free-form client metadata persisted alongside the stream
    pub meta: Option<Value>,
}

impl SessionInstructions {
    pub fn selection(&self, channel: Channel) -> &ChannelSelection {
        match channel {
            Channel::First => &self.first,
            Channel::Second => &self.second,
            Channel::Third => &self.third,
        }
    }

    /// Enabled flags in logical order
    pub fn enabled_channels(&self) -> [bool; 3] {
        Channel::ALL.map(|ch| self.selection(ch).is_enabled())
    }

    /// Session duration limit, `None` when absent or not representable
    pub fn duration(&self) -> Option<Duration> {
        self.time
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
    }

    /// Reject values the acquisition cannot honour
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled_channels().iter().any(|enabled| *enabled) {
            return Err("no channel enabled".to_string());
        }
        if let Some(time) = self.time {
            if Duration::try_from_secs_f64(time).is_err() {
                return Err(format!("invalid session duration {} s", time));
            }
        }
        Ok(())
    }
}
