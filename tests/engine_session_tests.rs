use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use daqstream::analysis::{SignalAnalyzer, SlidingRmsAnalyzer};
use daqstream::broadcast::ObserverHandle;
use daqstream::core::{
    Channel, ChannelSelection, DerivedMetricRequest, ObserverMessage, SessionInstructions,
};
use daqstream::engine::{
    ControllerSettings, MeasurementController, SessionState, StartOutcome, StopOutcome,
};
use daqstream::hal::mock::{SimulatedConnector, SimulatedSensorNode};
use daqstream::hal::DeviceSessionManager;
use daqstream::storage::CsvStorage;
use daqstream::AcquisitionError;

struct Harness {
    controller: MeasurementController,
    connector: SimulatedConnector,
    dir: TempDir,
}

fn harness(node: SimulatedSensorNode) -> Harness {
    harness_with_analyzer(node, Arc::new(SlidingRmsAnalyzer))
}

fn harness_with_analyzer(
    node: SimulatedSensorNode,
    analyzer: Arc<dyn SignalAnalyzer>,
) -> Harness {
    let dir = tempdir().unwrap();
    let connector = SimulatedConnector::new(node);
    let devices = Arc::new(DeviceSessionManager::new(
        Arc::new(connector.clone()),
        "Test-STH",
    ));
    let controller = MeasurementController::new(
        devices,
        Arc::new(CsvStorage::new(dir.path())),
        analyzer,
        ControllerSettings::default(),
    );
    Harness {
        controller,
        connector,
        dir,
    }
}

fn observe(controller: &MeasurementController) -> mpsc::Receiver<Arc<ObserverMessage>> {
    let (handle, rx) = ObserverHandle::channel(4096);
    controller.registry().register(handle);
    rx
}

fn drain(rx: &mut mpsc::Receiver<Arc<ObserverMessage>>) -> Vec<Arc<ObserverMessage>> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn instructions(name: &str, time: f64) -> SessionInstructions {
    SessionInstructions {
        name: Some(name.to_string()),
        time: Some(time),
        first: ChannelSelection::sensor(1, "acc-1"),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_duration_limited_session_completes() {
    let h = harness(SimulatedSensorNode::default());
    let mut rx = observe(&h.controller);

    let outcome = h.controller.start(instructions("t1", 2.0)).await.unwrap();
    assert_eq!(outcome, StartOutcome::Accepted);

    let status = h.controller.status().await;
    assert!(status.running);
    assert_eq!(status.name.as_deref(), Some("t1"));
    assert!(status.start_time.is_some());

    h.controller.wait_idle().await;

    let status = h.controller.status().await;
    assert!(!status.running);
    assert!(status.name.is_none());

    let messages = drain(&mut rx);
    let summaries: Vec<_> = messages.iter().filter(|m| m.is_summary()).collect();
    assert_eq!(summaries.len(), 1);
    assert!(messages.last().unwrap().is_summary());

    let frames: usize = messages
        .iter()
        .filter_map(|m| match m.as_ref() {
            ObserverMessage::Batch(batch) => Some(batch.iter().filter(|v| v.is_frame()).count()),
            _ => None,
        })
        .sum();
    // 2 s at roughly 9524 frames per second on a single channel
    assert!(frames > 18_000, "only {} frames delivered", frames);

    assert!(h.dir.path().join("t1.csv").exists());
    assert_eq!(h.connector.close_count(), 1);
    assert!(!h.controller.devices().has_instance());
}

#[tokio::test(start_paused = true)]
async fn test_frames_carry_only_enabled_channels() {
    let h = harness(SimulatedSensorNode::default().end_after(500));
    let mut rx = observe(&h.controller);

    let mut request = instructions("pair", 10.0);
    request.third = ChannelSelection::sensor(3, "acc-3");
    h.controller.start(request).await.unwrap();
    h.controller.wait_idle().await;

    let messages = drain(&mut rx);
    let ObserverMessage::Batch(batch) = messages[0].as_ref() else {
        panic!("expected a batch first");
    };
    let value = &batch[0];
    assert!(value.first.is_some());
    assert!(value.second.is_none());
    assert!(value.third.is_some());
    assert_eq!(value.counter, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_rejected() {
    let h = harness(SimulatedSensorNode::default());

    h.controller.start(instructions("t1", 10.0)).await.unwrap();
    let before = h.controller.status().await;

    let outcome = h.controller.start(instructions("t2", 3.0)).await.unwrap();
    assert_eq!(outcome, StartOutcome::AlreadyRunning);

    let status = h.controller.status().await;
    assert_eq!(status, before);
    assert_eq!(status.name.as_deref(), Some("t1"));
    assert_eq!(status.instructions.and_then(|i| i.time), Some(10.0));
    assert_eq!(h.connector.sessions_created(), 1);

    h.controller.stop().await;
    h.controller.wait_idle().await;
}

#[tokio::test]
async fn test_stop_when_idle() {
    let h = harness(SimulatedSensorNode::default());
    assert_eq!(h.controller.stop().await, StopOutcome::NothingToStop);
    assert_eq!(h.controller.session_state().await, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_device_once() {
    let h = harness(SimulatedSensorNode::default());
    let mut rx = observe(&h.controller);

    h.controller.start(instructions("short", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.controller.stop().await, StopOutcome::Stopped);
    assert!(!h.controller.status().await.running);
    assert_eq!(h.controller.stop().await, StopOutcome::NothingToStop);

    h.controller.wait_idle().await;

    assert_eq!(h.connector.close_count(), 1);
    assert!(!h.controller.devices().has_instance());
    let summaries = drain(&mut rx).iter().filter(|m| m.is_summary()).count();
    assert_eq!(summaries, 1);

    // The next session reconnects from scratch
    h.controller.start(instructions("again", 0.5)).await.unwrap();
    h.controller.wait_idle().await;
    assert_eq!(h.connector.sessions_created(), 2);
    assert_eq!(h.connector.close_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stream_timeout_notifies_and_closes_observers() {
    let h = harness(SimulatedSensorNode::default().timeout_after(200));
    let mut rx = observe(&h.controller);

    h.controller.start(instructions("stall", 10.0)).await.unwrap();
    h.controller.wait_idle().await;

    let mut messages = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }

    match messages.last().unwrap().as_ref() {
        ObserverMessage::Error { error, kind, .. } => {
            assert!(*error);
            assert_eq!(kind, "StreamTimeout");
        }
        other => panic!("expected error event, got {:?}", other),
    }
    assert!(h.controller.registry().is_empty());
    assert_eq!(h.connector.close_count(), 1);
    assert_eq!(h.controller.session_state().await, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_sensor_configuration() {
    let h = harness(SimulatedSensorNode::default().reject_sensor_configuration());
    let mut rx = observe(&h.controller);

    let mut request = instructions("routed", 1.0);
    request.first = ChannelSelection::sensor(4, "acc-4");
    h.controller.start(request).await.unwrap();
    h.controller.wait_idle().await;

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        messages[0].as_ref(),
        ObserverMessage::Error { kind, .. } if kind == "UnsupportedConfiguration"
    ));
    assert!(!h.controller.devices().has_instance());
}

#[tokio::test]
async fn test_device_unavailable_leaves_state_idle() {
    let h = harness(SimulatedSensorNode::default().fail_connect());
    let mut rx = observe(&h.controller);

    let result = h.controller.start(instructions("t1", 1.0)).await;
    assert!(matches!(result, Err(AcquisitionError::DeviceUnavailable(_))));
    assert_eq!(h.controller.session_state().await, SessionState::Idle);
    assert!(!h.controller.health().await.device_ready);

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        messages[0].as_ref(),
        ObserverMessage::Error { kind, .. } if kind == "DeviceUnavailable"
    ));
    assert!(h.controller.registry().is_empty());
}

#[tokio::test]
async fn test_reset_device_reconnects() {
    let h = harness(SimulatedSensorNode::default());

    assert_ok!(h.controller.reset_device().await);
    assert!(h.controller.health().await.device_ready);
    assert_eq!(h.connector.sessions_created(), 1);

    assert_ok!(h.controller.reset_device().await);
    assert_eq!(h.connector.sessions_created(), 2);
    assert_eq!(h.connector.close_count(), 1);
}

#[tokio::test]
async fn test_no_enabled_channel_is_rejected() {
    let h = harness(SimulatedSensorNode::default());
    let request = SessionInstructions {
        name: Some("empty".to_string()),
        ..Default::default()
    };

    let result = h.controller.start(request).await;
    assert!(matches!(result, Err(AcquisitionError::UnsupportedConfiguration(_))));
    assert_eq!(h.connector.sessions_created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_derived_metric_follows_summary() {
    let h = harness(SimulatedSensorNode::default());
    let mut rx = observe(&h.controller);

    let mut request = instructions("metric", 1.0);
    request.derived_metric = Some(DerivedMetricRequest {
        channel: Channel::First,
        window_width_ms: 100.0,
    });
    h.controller.start(request).await.unwrap();
    h.controller.wait_idle().await;

    let messages = drain(&mut rx);
    let n = messages.len();
    assert!(messages[n - 2].is_summary());
    assert!(messages[n - 1].is_derived());

    let ObserverMessage::Batch(batch) = messages[n - 1].as_ref() else {
        panic!("expected derived metric batch");
    };
    let points = batch[0].derived.as_ref().unwrap();
    assert!(points.len() > 9_000);
    assert_eq!(points[0].x, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_dataloss_is_reported() {
    let h = harness(SimulatedSensorNode::default().skip_counter_every(100).end_after(1000));
    let mut rx = observe(&h.controller);

    h.controller.start(instructions("lossy", 10.0)).await.unwrap();
    h.controller.wait_idle().await;

    let messages = drain(&mut rx);
    let ObserverMessage::Batch(summary) = messages.last().unwrap().as_ref() else {
        panic!("expected summary batch");
    };
    assert_eq!(summary[0].dataloss, Some(9));
}

#[tokio::test(start_paused = true)]
async fn test_health_reports_device_and_measurement() {
    let h = harness(SimulatedSensorNode::default());

    let health = h.controller.health().await;
    assert!(!health.device_ready);
    assert!(!health.measurement.running);

    h.controller.start(instructions("t1", 10.0)).await.unwrap();
    let health = h.controller.health().await;
    assert!(health.device_ready);
    assert!(health.measurement.running);

    assert!(matches!(
        h.controller.reset_device().await,
        Err(AcquisitionError::AlreadyRunning)
    ));

    h.controller.shutdown().await;
    assert_eq!(h.controller.session_state().await, SessionState::Idle);
    assert!(!h.controller.health().await.device_ready);
}

#[tokio::test(start_paused = true)]
async fn test_default_name_uses_start_time() {
    let h = harness(SimulatedSensorNode::default());
    let mut request = instructions("", 10.0);
    request.name = None;

    h.controller.start(request).await.unwrap();
    let name = h.controller.status().await.name.unwrap();
    // e.g. 2024-05-01_13-45-09
    assert_eq!(name.len(), 19);
    assert_eq!(&name[10..11], "_");

    h.controller.stop().await;
    h.controller.wait_idle().await;
    assert!(h.dir.path().join(format!("{}.csv", name)).exists());
}

#[tokio::test(start_paused = true)]
async fn test_first_frame_at_zero_does_not_end_session() {
    let h = harness(SimulatedSensorNode::default());
    let mut rx = observe(&h.controller);

    h.controller.start(instructions("zero", 1.0)).await.unwrap();
    h.controller.wait_idle().await;

    let timestamps: Vec<f64> = drain(&mut rx)
        .iter()
        .filter_map(|m| match m.as_ref() {
            ObserverMessage::Batch(batch) => Some(batch.clone()),
            _ => None,
        })
        .flatten()
        .filter(|v| v.is_frame())
        .filter_map(|v| v.timestamp)
        .collect();

    assert_eq!(timestamps.first().copied(), Some(0.0));
    assert!(timestamps.len() > 9_000, "ended after {} frames", timestamps.len());
    assert!(*timestamps.last().unwrap() >= 1.0);
}

#[tokio::test]
async fn test_unrepresentable_duration_is_rejected() {
    let h = harness(SimulatedSensorNode::default());

    let result = h.controller.start(instructions("forever", 1e20)).await;
    assert!(matches!(result, Err(AcquisitionError::UnsupportedConfiguration(_))));

    let result = h.controller.start(instructions("negative", -1.0)).await;
    assert!(matches!(result, Err(AcquisitionError::UnsupportedConfiguration(_))));

    assert_eq!(h.connector.sessions_created(), 0);
    assert_eq!(h.controller.session_state().await, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_session_returns_to_idle() {
    let analyzer = |_: &[f64], _: f64, _: f64| -> Option<Vec<f64>> {
        panic!("analysis blew up");
    };
    let h = harness_with_analyzer(SimulatedSensorNode::default(), Arc::new(analyzer));
    let mut rx = observe(&h.controller);

    let mut request = instructions("crash", 1.0);
    request.derived_metric = Some(DerivedMetricRequest {
        channel: Channel::First,
        window_width_ms: 100.0,
    });
    h.controller.start(request).await.unwrap();
    h.controller.wait_idle().await;

    let mut messages = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }
    assert!(matches!(
        messages.last().unwrap().as_ref(),
        ObserverMessage::Error { kind, .. } if kind == "InternalError"
    ));
    assert!(h.controller.registry().is_empty());
    assert_eq!(h.connector.close_count(), 1);
    assert!(!h.controller.devices().has_instance());

    let outcome = h.controller.start(instructions("after", 0.5)).await.unwrap();
    assert_eq!(outcome, StartOutcome::Accepted);
    h.controller.stop().await;
    h.controller.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn test_status_answers_while_device_connects() {
    let node = SimulatedSensorNode::default().connect_delay(Duration::from_millis(500));
    let h = harness(node);

    let controller = h.controller.clone();
    let starting =
        tokio::spawn(async move { controller.start(instructions("slow", 10.0)).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status = tokio::time::timeout(Duration::from_millis(1), h.controller.status())
        .await
        .expect("status blocked behind device connect");
    assert!(status.running);
    assert_eq!(status.name.as_deref(), Some("slow"));
    assert!(!h.controller.health().await.device_ready);

    assert_eq!(h.controller.stop().await, StopOutcome::Stopped);

    let outcome = starting.await.unwrap().unwrap();
    assert_eq!(outcome, StartOutcome::Accepted);

    h.controller.wait_idle().await;
    assert_eq!(h.connector.sessions_created(), 1);
    assert_eq!(h.connector.close_count(), 1);
    assert!(!h.controller.devices().has_instance());
}
