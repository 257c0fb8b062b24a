use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use daqstream::analysis::SlidingRmsAnalyzer;
use daqstream::broadcast::JsonLineSink;
use daqstream::config::{AppConfig, DEFAULT_CONFIG_FILE};
use daqstream::core::{Channel, ChannelSelection, DerivedMetricRequest, SessionInstructions};
use daqstream::hal::mock::{SimulatedConnector, SimulatedSensorNode};
use daqstream::storage::CsvStorage;
use daqstream::{logging, MeasurementController, StartOutcome};

/// Record one measurement from a simulated sensor node, streaming it as JSON lines
#[derive(Parser, Debug)]
#[command(name = "daqstream", version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Session name, defaults to the start time
    #[arg(short, long)]
    name: Option<String>,

    /// Session duration in seconds
    #[arg(short, long, default_value_t = 5.0)]
    time: f64,

    /// Enabled logical channels (1-3)
    #[arg(long, value_delimiter = ',', default_value = "1")]
    channels: Vec<u8>,

    /// Compute the derived metric on the first enabled channel with this window (ms)
    #[arg(long)]
    window_ms: Option<f64>,

    /// Override the measurement directory
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn instructions_from(args: &Args) -> SessionInstructions {
    let mut instructions = SessionInstructions {
        name: args.name.clone(),
        time: Some(args.time),
        ..Default::default()
    };

    let mut metric_channel = None;
    for channel in Channel::ALL {
        if !args.channels.contains(&(channel.index() as u8 + 1)) {
            continue;
        }
        let selection = ChannelSelection::sensor(channel.default_sensor_channel(), "simulated");
        match channel {
            Channel::First => instructions.first = selection,
            Channel::Second => instructions.second = selection,
            Channel::Third => instructions.third = selection,
        }
        metric_channel.get_or_insert(channel);
    }

    if let (Some(window_width_ms), Some(channel)) = (args.window_ms, metric_channel) {
        instructions.derived_metric = Some(DerivedMetricRequest {
            channel,
            window_width_ms,
        });
    }
    instructions
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_from(&args.config).context("Failed to load configuration")?;
    if let Some(dir) = &args.dir {
        config.acquisition.measurement_dir = dir.clone();
    }
    logging::init(&config.logging).map_err(anyhow::Error::msg)?;

    let controller = MeasurementController::from_config(
        &config,
        Arc::new(SimulatedConnector::new(SimulatedSensorNode::default())),
        Arc::new(CsvStorage::new(config.acquisition.measurement_dir.clone())),
        Arc::new(SlidingRmsAnalyzer),
    );
    let observer = controller.spawn_observer(JsonLineSink::new(tokio::io::stdout()));

    if controller.start(instructions_from(&args)).await? == StartOutcome::AlreadyRunning {
        anyhow::bail!("a measurement is already running");
    }
    info!(device = %config.device.id, "recording");

    tokio::select! {
        _ = controller.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            controller.stop().await;
            controller.wait_idle().await;
        }
    }

    controller.shutdown().await;
    observer.join().await;
    Ok(())
}
