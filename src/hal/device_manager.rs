use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DeviceConnector, DeviceSession};
use crate::error::{AcquisitionError, Result};

/// Handle to the connected device, shared between the manager and the running session
pub type SharedDeviceSession = Arc<Mutex<Box<dyn DeviceSession>>>;

/// Owns the single device connection of the process
///
/// `acquire` and `release` serialize on one lock, so concurrent callers never
/// observe a half-opened or half-closed device.
pub struct DeviceSessionManager {
    /// Transport used to create fresh sessions
    connector: Arc<dyn DeviceConnector>,

    /// Sensor node to connect to
    device_id: String,

    /// Currently installed handle
    instance: Mutex<Option<SharedDeviceSession>>,

    /// Lock-free mirror of `instance.is_some()` for health probes
    ready: AtomicBool,
}

impl DeviceSessionManager {
    pub fn new(connector: Arc<dyn DeviceConnector>, device_id: impl Into<String>) -> Self {
        Self {
            connector,
            device_id: device_id.into(),
            instance: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Return the open device session, connecting first if there is none
    pub async fn acquire(&self) -> Result<SharedDeviceSession> {
        let mut instance = self.instance.lock().await;

        if let Some(session) = instance.as_ref() {
            debug!(device = %self.device_id, "reusing device session");
            return Ok(Arc::clone(session));
        }

        let mut session = self.connector.create_session();
        if let Err(e) = session.connect(&self.device_id).await {
            warn!(device = %self.device_id, error = %e, "device connection failed");
            if let Err(close_err) = session.close().await {
                debug!(
                    device = %self.device_id,
                    error = %close_err,
                    "discarding half-opened device session"
                );
            }
            return Err(AcquisitionError::DeviceUnavailable(e.to_string()));
        }

        info!(
            device = %self.device_id,
            driver = self.connector.driver_id(),
            "device session opened"
        );
        let session: SharedDeviceSession = Arc::new(Mutex::new(session));
        *instance = Some(Arc::clone(&session));
        self.ready.store(true, Ordering::Release);
        Ok(session)
    }

    /// Close and discard the device session; returns whether one was open
    pub async fn release(&self) -> Result<bool> {
        let mut instance = self.instance.lock().await;

        let Some(session) = instance.take() else {
            return Ok(false);
        };
        self.ready.store(false, Ordering::Release);

        let result = session.lock().await.close().await;
        info!(device = %self.device_id, "device session closed");
        result.map(|_| true).map_err(AcquisitionError::from)
    }

    /// Non-blocking probe used for health reporting
    pub fn has_instance(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
