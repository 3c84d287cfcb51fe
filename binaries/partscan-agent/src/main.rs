//! Partscan Agent - workstation binary for the scan-and-match capture
//! workflow.
//!
//! Drives one full pass against simulated collaborators: scan a QR code
//! to learn the expected part identifier, photograph the part, classify
//! the photo, and report whether the predicted label matches the code.
//!
//! # Usage
//!
//! ```bash
//! # Run a demo pass with default configuration
//! partscan-agent
//!
//! # Run with a configuration file
//! partscan-agent --config /path/to/config.toml
//!
//! # Override specific options
//! partscan-agent --qr-text PART-789 --scan-interval-ms 250
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::AgentConfig;
use partscan_capture::drivers::{SimulatedCamera, SimulatedClassifier, SimulatedQrDecoder};
use partscan_capture::{Frame, Prediction};
use partscan_core::events::SystemEvent;
use partscan_core::{telemetry, Verdict};
use partscan_workflow::{CaptureOutcome, Step, WorkflowService};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// CLI arguments for the Partscan Agent.
#[derive(Parser, Debug)]
#[command(
    name = "partscan-agent",
    about = "Workstation agent driving the QR scan and part-match workflow",
    version,
    author
)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Station ID for this workstation.
    #[arg(long, value_name = "ID")]
    station_id: Option<String>,

    /// QR payload the simulated scanner will decode.
    #[arg(long, value_name = "TEXT")]
    qr_text: Option<String>,

    /// Delay between QR decode attempts, in milliseconds.
    #[arg(long, value_name = "MS")]
    scan_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print the default configuration and exit.
    #[arg(long)]
    print_config: bool,
}

type DemoService = WorkflowService<SimulatedCamera, SimulatedQrDecoder, SimulatedClassifier>;

/// Builds the simulated collaborators from the demo scenario and wires
/// them into a workflow service.
fn build_service(config: &AgentConfig) -> Result<DemoService> {
    let demo = &config.demo;
    let width = demo.frame_width;
    let height = demo.frame_height;
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x + y) % 256) as u8))
        .collect();
    let frame = Frame::new(width, height, pixels).context("invalid demo frame dimensions")?;

    let camera = SimulatedCamera::with_frame(frame);

    let decoder = SimulatedQrDecoder::new();
    for _ in 0..demo.decode_misses {
        decoder.push_miss();
    }
    decoder.push_success(demo.qr_text.clone());

    let classifier = SimulatedClassifier::with_predictions(
        demo.predictions
            .iter()
            .map(|p| Prediction::new(p.label.clone(), p.confidence))
            .collect(),
    );

    Ok(WorkflowService::new(
        camera,
        decoder,
        classifier,
        config.workflow.clone(),
    ))
}

/// Logs every workflow event until the bus closes.
async fn log_events(service: &DemoService) {
    let mut rx = service.subscribe();
    loop {
        match rx.recv().await {
            Ok(SystemEvent::ScanStarted) => info!("event: qr scanning started"),
            Ok(SystemEvent::QrDecoded { qr_text }) => {
                info!(%qr_text, "event: qr code decoded")
            }
            Ok(SystemEvent::PartCaptured { width, height }) => {
                info!(width, height, "event: part photographed")
            }
            Ok(SystemEvent::VerdictReached {
                predicted_label,
                verdict,
            }) => info!(%predicted_label, %verdict, "event: verdict reached"),
            Ok(SystemEvent::WorkflowReset) => info!("event: workflow reset"),
            Ok(SystemEvent::ErrorRaised { source, message }) => {
                warn!(%source, %message, "event: error raised")
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event consumer lagged behind")
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Runs one scan-and-match pass to completion.
async fn run_pass(service: &DemoService) -> Result<Verdict> {
    service
        .load_model()
        .await
        .context("classifier model failed to load")?;
    service.start().await.context("workflow failed to start")?;

    // The scan loop advances to part capture on its own once the decoder
    // reports a payload.
    tokio::time::timeout(Duration::from_secs(30), async {
        while service.snapshot().await.step != Step::CapturingPart
            || !service.has_active_stream().await
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .context("timed out waiting for a QR code")?;

    let snapshot = service.snapshot().await;
    info!(qr_text = %snapshot.qr_text, "expected part identified; capturing photo");

    loop {
        match service.capture().await.context("capture failed")? {
            CaptureOutcome::NotReady => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            CaptureOutcome::Cancelled => {
                anyhow::bail!("capture was cancelled by a reset");
            }
            CaptureOutcome::Completed(verdict) => return Ok(verdict),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    if args.print_config {
        let config = AgentConfig::default();
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut config = if let Some(ref config_path) = args.config {
        AgentConfig::from_file(config_path)
            .with_context(|| format!("failed to load config from {config_path:?}"))?
    } else {
        AgentConfig::default()
    };
    config.merge_cli_args(&args);
    config.validate().context("invalid configuration")?;

    telemetry::init_tracing(&config.logging.level)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let station_id = config.station_id();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        station = %station_id.0,
        "Partscan Agent starting"
    );

    let service = build_service(&config)?;

    let event_logger = {
        let service = service.clone();
        tokio::spawn(async move { log_events(&service).await })
    };

    tokio::select! {
        result = run_pass(&service) => {
            match result {
                Ok(verdict) => {
                    let snapshot = service.snapshot().await;
                    info!(
                        qr_text = %snapshot.qr_text,
                        predicted_label = %snapshot.predicted_label,
                        %verdict,
                        "pass complete"
                    );
                    println!(
                        "expected {} / predicted {} -> {}",
                        snapshot.qr_text, snapshot.predicted_label, verdict
                    );
                }
                Err(e) => {
                    error!(error = %e, "pass failed");
                    service.reset().await;
                    event_logger.abort();
                    return Err(e);
                }
            }
        }
        _ = signal::ctrl_c() => {
            info!("interrupted; resetting workflow");
            service.reset().await;
        }
    }

    event_logger.abort();
    info!("Partscan Agent stopped");
    Ok(())
}
