use chrono::{DateTime, Local};
use std::mem;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::MeasurementState;
use crate::analysis::DerivedMetricFinalizer;
use crate::broadcast::ObserverRegistry;
use crate::core::{Batch, Channel, DataValue, ObserverMessage, SessionInstructions};
use crate::error::{AcquisitionError, Result};
use crate::hal::{
    ChannelIndexMap, DeviceSessionManager, FrameStream, SensorConfiguration, SharedDeviceSession,
    UnitConverter,
};
use crate::observability::IngestMetrics;
use crate::storage::{StorageBackend, StorageMetadata, StorageSink};

/// Why the ingestion loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Session duration limit reached
    DurationElapsed,
    /// Device stream ended on its own
    StreamEnded,
    /// Stop was requested
    Cancelled,
}

/// One acquisition session, from device configuration to teardown
pub struct MeasurementSession {
    pub(crate) name: String,
    pub(crate) start_time: DateTime<Local>,
    pub(crate) instructions: SessionInstructions,
    pub(crate) update_rate_hz: f64,
    pub(crate) device: SharedDeviceSession,
    pub(crate) devices: Arc<DeviceSessionManager>,
    pub(crate) registry: Arc<ObserverRegistry>,
    pub(crate) storage: Arc<dyn StorageBackend>,
    pub(crate) finalizer: DerivedMetricFinalizer,
    pub(crate) state: Arc<Mutex<MeasurementState>>,
    pub(crate) metrics: Arc<IngestMetrics>,
}

/// Everything the loop accumulates that teardown has to finish
#[derive(Default)]
struct Progress {
    sink: Option<Box<dyn StorageSink>>,
    pending: Batch,
    batch_size: usize,
    frame_rate: f64,
    metric_samples: Vec<f64>,
    metric_timestamps: Vec<f64>,
}

struct Prepared {
    stream: FrameStream,
    converter: UnitConverter,
    index_map: ChannelIndexMap,
    start_secs: f64,
}

impl MeasurementSession {
    /// Ingest until the duration elapses, the stream ends, an error occurs or
    /// `cancel` fires; all of them end in the same teardown.
    pub async fn run(self, cancel: CancellationToken) {
        let mut progress = Progress::default();
        let outcome = self.ingest(&mut progress, &cancel).await;
        self.teardown(progress, outcome).await;
    }

    /// Run the session on its own task and recover if it panics
    ///
    /// A panicking ingestion task never reaches its teardown, so the device is
    /// released, observers are closed and the state returns to Idle here.
    pub async fn run_supervised(self, cancel: CancellationToken) {
        let name = self.name.clone();
        let devices = Arc::clone(&self.devices);
        let registry = Arc::clone(&self.registry);
        let state = Arc::clone(&self.state);

        let Err(e) = tokio::spawn(self.run(cancel)).await else {
            return;
        };

        error!(session = %name, error = %e, "measurement task aborted");
        registry.broadcast(ObserverMessage::error(
            "InternalError",
            format!("measurement task aborted: {}", e),
        ));
        let closed = registry.close_all();
        debug!(session = %name, closed, "observers closed after abort");

        if let Err(e) = devices.release().await {
            warn!(session = %name, error = %e, "failed to release device");
        }
        if let Err(e) = state.lock().await.finish() {
            warn!(session = %name, error = %e, "unexpected state after abort");
        };
    }

    /// Configure the device, open storage and the stream
    async fn prepare(&self, progress: &mut Progress) -> Result<Prepared> {
        let mut device = self.device.lock().await;

        let adc = self.instructions.adc.resolved();
        let sample_rate = device.configure_adc(&adc).await?;

        let sensor_config = SensorConfiguration::from_instructions(&self.instructions);
        if sensor_config.requires_channel_configuration_support() {
            device.write_sensor_configuration(&sensor_config).await?;
        }

        let converter = UnitConverter::new(device.sensor_range().await?);
        let streaming = sensor_config.streaming();
        let index_map = ChannelIndexMap::from_streaming(&streaming);
        if index_map.enabled_count() == 0 {
            return Err(AcquisitionError::UnsupportedConfiguration(
                "no channel enabled".to_string(),
            ));
        }

        progress.frame_rate = sample_rate / index_map.enabled_count() as f64;
        progress.batch_size = ((progress.frame_rate / self.update_rate_hz) as usize).max(1);

        let metadata = StorageMetadata {
            name: self.name.clone(),
            start_time: self.start_time.to_rfc3339(),
            sensor_range: format!("± {} g₀", converter.sensor_range() / 2.0),
            sample_rate,
            instructions: self.instructions.clone(),
        };
        let sink = self
            .storage
            .open(&self.name, streaming, &metadata)
            .map_err(|e| AcquisitionError::Storage(format!("{:#}", e)))?;
        progress.sink = Some(sink);

        let stream = device.open_stream(streaming).await?;
        let start_secs = stream.start_time();

        info!(
            session = %self.name,
            sample_rate,
            frame_rate = progress.frame_rate,
            batch_size = progress.batch_size,
            channels = index_map.enabled_count(),
            "measurement streaming"
        );

        Ok(Prepared {
            stream,
            converter,
            index_map,
            start_secs,
        })
    }

    fn metric_channel(&self, index_map: &ChannelIndexMap) -> Option<Channel> {
        let request = self.instructions.derived_metric.as_ref()?;
        if index_map.index(request.channel).is_none() {
            warn!(
                session = %self.name,
                channel = ?request.channel,
                "derived metric requested for a disabled channel"
            );
            return None;
        }
        Some(request.channel)
    }

    async fn ingest(
        &self,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<EndReason> {
        let Prepared {
            mut stream,
            converter,
            index_map,
            start_secs,
        } = self.prepare(progress).await?;

        let metric_channel = self.metric_channel(&index_map);
        let limit = self.instructions.duration().map(|d| d.as_secs_f64());
        let mut baseline: Option<f64> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(EndReason::Cancelled),
                next = stream.next() => next,
            };

            let raw = match next {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(EndReason::StreamEnded),
            };

            let started = self.metrics.start_processing();
            let frame = converter.raw_to_frame(&raw, start_secs);
            self.metrics.record_frame();

            if let Some(sink) = progress.sink.as_mut() {
                if let Err(e) = sink.append(&frame) {
                    self.metrics.record_storage_error();
                    return Err(AcquisitionError::Storage(format!("{:#}", e)));
                }
                self.metrics.record_persisted();
            }

            if let Some(channel) = metric_channel {
                if let Some(value) = index_map.value(channel, &frame.values) {
                    progress.metric_samples.push(value);
                    progress.metric_timestamps.push(frame.timestamp);
                }
            }

            progress.pending.push(DataValue::frame(
                frame.counter,
                frame.timestamp,
                index_map.project(&frame.values),
            ));
            if progress.pending.len() >= progress.batch_size {
                self.flush(progress);
            }
            self.metrics.finish_processing(started);

            let base = *baseline.get_or_insert(frame.timestamp);
            if let Some(limit) = limit {
                if frame.timestamp - base >= limit {
                    return Ok(EndReason::DurationElapsed);
                }
            }
        }
    }

    fn flush(&self, progress: &mut Progress) {
        if progress.pending.is_empty() {
            return;
        }
        let batch = mem::replace(&mut progress.pending, Vec::with_capacity(progress.batch_size));
        let delivered = self.registry.broadcast(ObserverMessage::Batch(batch));
        self.metrics.record_batch();
        debug!(session = %self.name, delivered, "batch flushed");
    }

    async fn teardown(&self, mut progress: Progress, outcome: Result<EndReason>) {
        self.flush(&mut progress);

        if let Some(mut sink) = progress.sink.take() {
            let lost = sink.dataloss();
            if let Err(e) = sink.close() {
                warn!(session = %self.name, error = %e, "failed to close measurement storage");
            }
            self.registry
                .broadcast(ObserverMessage::Batch(vec![DataValue::dataloss(lost)]));
        }

        match &outcome {
            Ok(reason) => {
                info!(session = %self.name, reason = ?reason, "measurement finished");
                self.publish_derived_metric(&progress);
            }
            Err(e) => {
                error!(session = %self.name, error = %e, "measurement failed");
                self.registry
                    .broadcast(ObserverMessage::error(e.kind(), e.to_string()));
                let closed = self.registry.close_all();
                debug!(session = %self.name, closed, "observers closed after error");
            }
        }

        if let Err(e) = self.devices.release().await {
            warn!(session = %self.name, error = %e, "failed to release device");
        }

        {
            let mut state = self.state.lock().await;
            if let Err(e) = state.finish() {
                warn!(session = %self.name, error = %e, "unexpected state at teardown");
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            session = %self.name,
            frames = snapshot.frames_ingested,
            persisted = snapshot.frames_persisted,
            batches = snapshot.batches_flushed,
            storage_errors = snapshot.storage_errors,
            avg_latency_us = snapshot.avg_latency_us,
            "measurement closed"
        );
    }

    fn publish_derived_metric(&self, progress: &Progress) {
        let Some(request) = self.instructions.derived_metric.as_ref() else {
            return;
        };

        match self.finalizer.finalize(
            &progress.metric_samples,
            &progress.metric_timestamps,
            progress.frame_rate,
            request.window_width_secs(),
        ) {
            Some(points) => {
                self.registry
                    .broadcast(ObserverMessage::Batch(vec![DataValue::derived(points)]));
            }
            None => info!(
                session = %self.name,
                samples = progress.metric_samples.len(),
                "derived metric skipped"
            ),
        }
    }
}
