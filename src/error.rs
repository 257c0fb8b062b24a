use thiserror::Error;

use crate::broadcast::ObserverId;

/// Failures reported by a device session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("stream timed out: {0}")]
    Timeout(String),

    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    #[error("stream failed: {0}")]
    Stream(String),
}

impl DeviceError {
    /// Short name sent to observers in error events
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::Unavailable(_) => "DeviceUnavailable",
            DeviceError::Timeout(_) => "StreamTimeout",
            DeviceError::Unsupported(_) => "UnsupportedConfiguration",
            DeviceError::Stream(_) => "StreamError",
        }
    }
}

/// Errors surfaced by the acquisition core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("a measurement is already running")]
    AlreadyRunning,

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("stream timed out: {0}")]
    StreamTimeout(String),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("observer {0} is unreachable")]
    UnreachableObserver(ObserverId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<DeviceError> for AcquisitionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Unavailable(msg) | DeviceError::Stream(msg) => {
                AcquisitionError::DeviceUnavailable(msg)
            }
            DeviceError::Timeout(msg) => AcquisitionError::StreamTimeout(msg),
            DeviceError::Unsupported(msg) => AcquisitionError::UnsupportedConfiguration(msg),
        }
    }
}

impl AcquisitionError {
    /// Short name sent to observers in error events
    pub fn kind(&self) -> &'static str {
        match self {
            AcquisitionError::AlreadyRunning => "AlreadyRunning",
            AcquisitionError::DeviceUnavailable(_) => "DeviceUnavailable",
            AcquisitionError::StreamTimeout(_) => "StreamTimeout",
            AcquisitionError::UnsupportedConfiguration(_) => "UnsupportedConfiguration",
            AcquisitionError::UnreachableObserver(_) => "UnreachableObserver",
            AcquisitionError::Storage(_) => "StorageError",
            AcquisitionError::Config(_) => "ConfigError",
        }
    }
}

pub type Result<T, E = AcquisitionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_map_to_acquisition_errors() {
        let err: AcquisitionError = DeviceError::Timeout("no data".to_string()).into();
        assert_eq!(err, AcquisitionError::StreamTimeout("no data".to_string()));
        assert_eq!(err.kind(), "StreamTimeout");

        let err: AcquisitionError = DeviceError::Unsupported("sensor 4".to_string()).into();
        assert_eq!(err.kind(), "UnsupportedConfiguration");

        let err: AcquisitionError = DeviceError::Stream("bus off".to_string()).into();
        assert!(matches!(err, AcquisitionError::DeviceUnavailable(_)));
    }
}
