use async_trait::async_trait;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::{AdcConfig, COUNTER_MODULUS};
use crate::error::DeviceError;
use crate::hal::{
    unix_now, DeviceConnector, DeviceSession, DeviceState, FrameStream, RawFrame,
    SensorConfiguration, StreamingConfiguration,
};

/// Behaviour of a simulated sensor node
#[derive(Debug, Clone)]
pub struct SimulatedSensorNode {
    /// Full-scale range in g reported to the session
    pub sensor_range: f64,
    /// Frequency of the generated sine in Hz
    pub signal_frequency: f64,
    /// Sine amplitude as a fraction of half scale
    pub amplitude: f64,
    /// Pacing interval between frame bursts
    pub tick: Duration,
    pub fail_connect: bool,
    /// Time the node takes to answer a connect request
    pub connect_delay: Option<Duration>,
    pub reject_sensor_configuration: bool,
    /// Stream ends cleanly after this many frames
    pub end_after: Option<u64>,
    /// Stream stalls and reports a timeout after this many frames
    pub timeout_after: Option<u64>,
    /// Every n-th counter value is skipped
    pub skip_counter_every: Option<u64>,
}

impl Default for SimulatedSensorNode {
    fn default() -> Self {
        Self {
            sensor_range: 200.0,
            signal_frequency: 50.0,
            amplitude: 0.5,
            tick: Duration::from_millis(10),
            fail_connect: false,
            connect_delay: None,
            reject_sensor_configuration: false,
            end_after: None,
            timeout_after: None,
            skip_counter_every: None,
        }
    }
}

impl SimulatedSensorNode {
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn reject_sensor_configuration(mut self) -> Self {
        self.reject_sensor_configuration = true;
        self
    }

    pub fn end_after(mut self, frames: u64) -> Self {
        self.end_after = Some(frames);
        self
    }

    pub fn timeout_after(mut self, frames: u64) -> Self {
        self.timeout_after = Some(frames);
        self
    }

    pub fn skip_counter_every(mut self, n: u64) -> Self {
        self.skip_counter_every = Some(n);
        self
    }
}

/// Creates simulated sessions and counts their lifecycle calls
#[derive(Clone)]
pub struct SimulatedConnector {
    node: SimulatedSensorNode,
    created: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl SimulatedConnector {
    pub fn new(node: SimulatedSensorNode) -> Self {
        Self {
            node,
            created: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DeviceConnector for SimulatedConnector {
    fn driver_id(&self) -> &str {
        "simulated"
    }

    fn create_session(&self) -> Box<dyn DeviceSession> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(SimulatedSession::new(self.node.clone(), Arc::clone(&self.closed)))
    }
}

pub struct SimulatedSession {
    node: SimulatedSensorNode,
    state: DeviceState,
    sample_rate: f64,
    producer: Option<JoinHandle<()>>,
    closed: Arc<AtomicUsize>,
}

impl SimulatedSession {
    fn new(node: SimulatedSensorNode, closed: Arc<AtomicUsize>) -> Self {
        Self {
            node,
            state: DeviceState::Disconnected,
            sample_rate: AdcConfig::default().sample_rate(),
            producer: None,
            closed,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state.clone()
    }

    fn require_connected(&self, action: &str) -> Result<(), DeviceError> {
        if !matches!(self.state, DeviceState::Connected | DeviceState::Streaming) {
            return Err(DeviceError::Unavailable(format!(
                "Cannot {} device in state {:?}",
                action, self.state
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for SimulatedSession {
    async fn connect(&mut self, device_id: &str) -> Result<(), DeviceError> {
        if let Some(delay) = self.node.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.node.fail_connect {
            return Err(DeviceError::Unavailable(format!(
                "sensor node {} did not respond",
                device_id
            )));
        }
        if self.state != DeviceState::Disconnected {
            return Err(DeviceError::Unavailable(format!(
                "Cannot connect device in state {:?}",
                self.state
            )));
        }
        self.state = DeviceState::Connected;
        Ok(())
    }

    async fn configure_adc(&mut self, adc: &AdcConfig) -> Result<f64, DeviceError> {
        self.require_connected("configure")?;
        self.sample_rate = adc.sample_rate();
        Ok(self.sample_rate)
    }

    async fn write_sensor_configuration(
        &mut self,
        config: &SensorConfiguration,
    ) -> Result<(), DeviceError> {
        self.require_connected("configure")?;
        if self.node.reject_sensor_configuration {
            return Err(DeviceError::Unsupported(format!(
                "sensor channel configuration {:?} is not supported by the sensor node",
                config
            )));
        }
        Ok(())
    }

    async fn sensor_range(&mut self) -> Result<f64, DeviceError> {
        self.require_connected("query")?;
        Ok(self.node.sensor_range)
    }

    async fn open_stream(
        &mut self,
        config: StreamingConfiguration,
    ) -> Result<FrameStream, DeviceError> {
        self.require_connected("stream from")?;
        let channels = config.enabled_count();
        if channels == 0 {
            return Err(DeviceError::Unsupported("no channel enabled".to_string()));
        }

        if let Some(previous) = self.producer.take() {
            previous.abort();
        }

        let frame_rate = self.sample_rate / channels as f64;
        // First frame is stamped at the moment the stream opens
        let epoch = unix_now();
        let (tx, stream) = FrameStream::channel(1024);
        let stream = stream.opened_at(epoch);
        let node = self.node.clone();

        let producer = tokio::spawn(async move {
            let per_tick = ((frame_rate * node.tick.as_secs_f64()).round() as u64).max(1);
            let mut index: u64 = 0;
            let mut counter: u64 = 0;

            loop {
                for _ in 0..per_tick {
                    if node.end_after.is_some_and(|n| index >= n) {
                        return;
                    }
                    if node.timeout_after.is_some_and(|n| index >= n) {
                        // A stalled node produces nothing until the host gives up
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        let _ = tx
                            .send(Err(DeviceError::Timeout(
                                "no data received from sensor node".to_string(),
                            )))
                            .await;
                        return;
                    }
                    if node.skip_counter_every.is_some_and(|n| index > 0 && index % n == 0) {
                        counter += 1;
                    }

                    let t = index as f64 / frame_rate;
                    let phase = 2.0 * PI * node.signal_frequency * t;
                    let values = (0..channels)
                        .map(|ch| {
                            let s = node.amplitude * (phase + ch as f64 * PI / 3.0).sin();
                            ((s + 1.0) / 2.0 * u16::MAX as f64).round() as u16
                        })
                        .collect();
                    let frame = RawFrame {
                        counter: (counter % COUNTER_MODULUS as u64) as u8,
                        timestamp: epoch + t,
                        values,
                    };

                    if tx.send(Ok(frame)).await.is_err() {
                        return; // Stream closed by the consumer
                    }
                    index += 1;
                    counter += 1;
                }
                tokio::time::sleep(node.tick).await;
            }
        });

        self.producer = Some(producer);
        self.state = DeviceState::Streaming;
        Ok(stream)
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        if self.state != DeviceState::Closed {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.state = DeviceState::Closed;
        }
        Ok(())
    }
}
