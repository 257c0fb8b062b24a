use async_trait::async_trait;

use super::types::{FrameStream, SensorConfiguration, StreamingConfiguration};
use crate::core::AdcConfig;
use crate::error::DeviceError;

/// Creates unconnected device sessions; implemented per transport
pub trait DeviceConnector: Send + Sync {
    /// Transport identifier (e.g. "simulated", "can")
    fn driver_id(&self) -> &str;

    fn create_session(&self) -> Box<dyn DeviceSession>;
}

/// A connected, configurable sensor device
#[async_trait]
pub trait DeviceSession: Send {
    /// Connect to the sensor node with the given identity
    async fn connect(&mut self, device_id: &str) -> Result<(), DeviceError>;

    /// Program ADC parameters, returning the resulting sample rate in Hz
    async fn configure_adc(&mut self, adc: &AdcConfig) -> Result<f64, DeviceError>;

    /// Route logical channels to sensor channels
    async fn write_sensor_configuration(
        &mut self,
        config: &SensorConfiguration,
    ) -> Result<(), DeviceError>;

    /// Full-scale sensor range reported by the device, in g
    async fn sensor_range(&mut self) -> Result<f64, DeviceError>;

    /// Open the raw sample stream for the enabled channels
    async fn open_stream(
        &mut self,
        config: StreamingConfiguration,
    ) -> Result<FrameStream, DeviceError>;

    /// Disconnect and release the device
    async fn close(&mut self) -> Result<(), DeviceError>;
}
