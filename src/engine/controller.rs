use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use super::measurement::MeasurementSession;
use super::state::{MeasurementState, MeasurementStatus, SessionState};
use crate::analysis::{DerivedMetricFinalizer, SignalAnalyzer};
use crate::broadcast::{spawn_observer, ObserverId, ObserverRegistry, ObserverSink, ObserverTask};
use crate::config::AppConfig;
use crate::core::{ObserverMessage, SessionInstructions};
use crate::error::{AcquisitionError, Result};
use crate::hal::{DeviceConnector, DeviceSessionManager};
use crate::observability::IngestMetrics;
use crate::storage::StorageBackend;

/// Session name used when the client does not provide one
const DEFAULT_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartOutcome {
    Accepted,
    AlreadyRunning,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopOutcome {
    Stopped,
    NothingToStop,
}

/// Liveness report of the acquisition core
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub device_ready: bool,
    pub measurement: MeasurementStatus,
}

/// Controller tuning taken from [`AppConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub update_rate_hz: f64,
    pub queue_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ControllerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            update_rate_hz: config.acquisition.update_rate_hz,
            queue_capacity: config.broadcast.queue_capacity,
            send_timeout: config.broadcast.send_timeout(),
        }
    }
}

/// Thread-safe entry point for starting, stopping and observing measurements
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct MeasurementController {
    devices: Arc<DeviceSessionManager>,
    registry: Arc<ObserverRegistry>,
    storage: Arc<dyn StorageBackend>,
    finalizer: DerivedMetricFinalizer,
    state: Arc<Mutex<MeasurementState>>,
    settings: ControllerSettings,
}

impl MeasurementController {
    pub fn new(
        devices: Arc<DeviceSessionManager>,
        storage: Arc<dyn StorageBackend>,
        analyzer: Arc<dyn SignalAnalyzer>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            devices,
            registry: Arc::new(ObserverRegistry::new()),
            storage,
            finalizer: DerivedMetricFinalizer::new(analyzer),
            state: Arc::new(Mutex::new(MeasurementState::new())),
            settings,
        }
    }

    /// Build a controller for the configured device, persisting through `storage`
    pub fn from_config(
        config: &AppConfig,
        connector: Arc<dyn DeviceConnector>,
        storage: Arc<dyn StorageBackend>,
        analyzer: Arc<dyn SignalAnalyzer>,
    ) -> Self {
        let devices = Arc::new(DeviceSessionManager::new(connector, config.device.id.clone()));
        Self::new(devices, storage, analyzer, ControllerSettings::from(config))
    }

    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    pub fn devices(&self) -> &Arc<DeviceSessionManager> {
        &self.devices
    }

    /// Start a new session
    ///
    /// Returns `AlreadyRunning` without touching the current session when one
    /// is active. The session is reserved before the device is contacted, so
    /// status and stop stay responsive while connecting. A device that cannot
    /// be opened is reported to observers, which are then closed, and returned
    /// as an error, leaving the state Idle. Later failures end the session on
    /// the ingestion task.
    pub async fn start(&self, instructions: SessionInstructions) -> Result<StartOutcome> {
        let (name, start_time, cancel) = {
            let mut state = self.state.lock().await;

            if state.state().is_active() {
                info!(
                    requested = instructions.name.as_deref().unwrap_or(""),
                    current = state.name().unwrap_or(""),
                    "start rejected, measurement already active"
                );
                return Ok(StartOutcome::AlreadyRunning);
            }

            instructions
                .validate()
                .map_err(AcquisitionError::UnsupportedConfiguration)?;

            let start_time = Local::now();
            let name = instructions
                .name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| start_time.format(DEFAULT_NAME_FORMAT).to_string());

            let cancel = state
                .begin(name.clone(), start_time, instructions.clone())
                .map_err(|_| AcquisitionError::AlreadyRunning)?;
            (name, start_time, cancel)
        };

        let device = match self.devices.acquire().await {
            Ok(device) => device,
            Err(e) => {
                warn!(session = %name, error = %e, "measurement could not start");
                if let Err(state_err) = self.state.lock().await.finish() {
                    warn!(
                        session = %name,
                        error = %state_err,
                        "unexpected state after failed start"
                    );
                }
                self.registry
                    .broadcast(ObserverMessage::error(e.kind(), e.to_string()));
                self.registry.close_all();
                return Err(e);
            }
        };

        let session = MeasurementSession {
            name: name.clone(),
            start_time,
            instructions,
            update_rate_hz: self.settings.update_rate_hz,
            device,
            devices: Arc::clone(&self.devices),
            registry: Arc::clone(&self.registry),
            storage: Arc::clone(&self.storage),
            finalizer: self.finalizer.clone(),
            state: Arc::clone(&self.state),
            metrics: Arc::new(IngestMetrics::new()),
        };

        // A stop that arrived while connecting already cancelled the token;
        // the task then goes straight to teardown.
        let mut state = self.state.lock().await;
        state.attach_task(tokio::spawn(session.run_supervised(cancel)));

        info!(session = %name, "measurement started");
        Ok(StartOutcome::Accepted)
    }

    /// Request the running session to stop
    ///
    /// Returns immediately; teardown happens on the ingestion task.
    pub async fn stop(&self) -> StopOutcome {
        let mut state = self.state.lock().await;
        if state.request_stop() {
            info!(session = state.name().unwrap_or(""), "measurement stop requested");
            StopOutcome::Stopped
        } else {
            StopOutcome::NothingToStop
        }
    }

    pub async fn status(&self) -> MeasurementStatus {
        self.state.lock().await.status()
    }

    pub async fn session_state(&self) -> SessionState {
        self.state.lock().await.state()
    }

    /// Receiver notified on every session state change
    pub async fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.lock().await.subscribe()
    }

    /// Wait until no session is active
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe_state().await;
        let _ = rx.wait_for(|state| *state == SessionState::Idle).await;
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            device_ready: self.devices.has_instance(),
            measurement: self.status().await,
        }
    }

    /// Close the device handle and connect afresh
    pub async fn reset_device(&self) -> Result<()> {
        let state = self.state.lock().await;
        if state.state().is_active() {
            return Err(AcquisitionError::AlreadyRunning);
        }
        let closed = self.devices.release().await?;
        self.devices.acquire().await?;
        info!(closed, "device reset");
        Ok(())
    }

    /// Attach a client sink; it receives every message broadcast from now on
    pub fn spawn_observer<S: ObserverSink>(&self, sink: S) -> ObserverTask {
        spawn_observer(
            Arc::clone(&self.registry),
            sink,
            self.settings.queue_capacity,
            self.settings.send_timeout,
        )
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.registry.unregister(id)
    }

    /// Stop any session, wait for its teardown and disconnect everything
    pub async fn shutdown(&self) {
        let task = {
            let mut state = self.state.lock().await;
            state.request_stop();
            state.take_task()
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "measurement task ended abnormally");
            }
        }
        // A session still connecting has no task yet; its start call spawns
        // one that tears down right away.
        self.wait_idle().await;

        if let Err(e) = self.devices.release().await {
            warn!(error = %e, "failed to release device during shutdown");
        }
        let closed = self.registry.close_all();
        info!(closed, "acquisition shut down");
    }
}
