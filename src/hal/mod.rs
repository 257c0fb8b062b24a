pub mod channel_mapper;
pub mod device_manager;
pub mod format_converter;
pub mod mock;
pub mod traits;
pub mod types;

pub use channel_mapper::ChannelIndexMap;
pub use device_manager::{DeviceSessionManager, SharedDeviceSession};
pub use format_converter::UnitConverter;
pub use traits::{DeviceConnector, DeviceSession};
pub use types::{
    unix_now, DeviceState, FrameStream, RawFrame, SensorConfiguration, StreamingConfiguration,
};
