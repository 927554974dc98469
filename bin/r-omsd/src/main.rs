//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "binary"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Binary entrypoint for the R-OMS daemon."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use r_oms_common::config::{AppConfig, Mode, SimulationConfig};
use r_oms_common::logging::init_tracing;
use r_oms_engine::{CorrelationEngine, EngineConfig, TransportPublisher};
use r_oms_metrics::{new_registry, spawn_http_server, PipelineMetrics, SharedRegistry};
use r_oms_msg::{Envelope, InMemoryTransport, Transport};
use r_oms_normalizer::{
    AmiNormalizer, ArchiveSink, CallCenterNormalizer, JsonlArchive, NormalizerService, Normalizer,
    NullArchive, ScadaNormalizer,
};
use r_oms_processor::OutageProcessor;
use r_oms_schema::OutageNotice;
use r_oms_simgen::{FeedEngine, RawFeedMessage};
use r_oms_store::InMemoryStatusStore;
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("R-OMS ", env!("CARGO_PKG_VERSION")),
    about = "R-OMS pipeline daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the pipeline")]
    Run,
    #[command(about = "Run the pipeline against the randomized feed generator")]
    Simulate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("R-OMS {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    if let Some(Commands::Simulate) = cli.command {
        config.mode = Mode::Simulation;
    }
    init_tracing("r-omsd", &config.logging)?;
    info!(config_path = %loaded.source.display(), mode = ?config.mode, "configuration loaded");

    let metrics_registry = new_registry();
    run_daemon(config, metrics_registry).await
}

/// Transports wiring the pipeline stages together. In a single-instance
/// deployment every topic is an in-memory queue.
struct Topics {
    raw_scada: Arc<InMemoryTransport>,
    raw_ami: Arc<InMemoryTransport>,
    raw_calls: Arc<InMemoryTransport>,
    telemetry: Arc<InMemoryTransport>,
    outages: Arc<InMemoryTransport>,
}

impl Topics {
    fn new() -> Self {
        Self {
            raw_scada: Arc::new(InMemoryTransport::new()),
            raw_ami: Arc::new(InMemoryTransport::new()),
            raw_calls: Arc::new(InMemoryTransport::new()),
            telemetry: Arc::new(InMemoryTransport::new()),
            outages: Arc::new(InMemoryTransport::new()),
        }
    }
}

async fn run_daemon(config: AppConfig, registry: SharedRegistry) -> Result<()> {
    let metrics = PipelineMetrics::new(registry.clone())
        .context("failed to register pipeline metrics")?;
    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry, config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let archive: Arc<dyn ArchiveSink> = if config.archive.enabled {
        Arc::new(
            JsonlArchive::open(&config.archive.directory)
                .context("failed to open archive sink")?,
        )
    } else {
        Arc::new(NullArchive)
    };

    let topics = Topics::new();
    let store = InMemoryStatusStore::new();
    let engine = CorrelationEngine::new(
        store,
        TransportPublisher::new(topics.outages.clone()),
        EngineConfig {
            op_timeout: config.pipeline.op_timeout,
            conflict_retries: config.pipeline.conflict_retries,
        },
    );
    let processor = OutageProcessor::new(
        engine,
        topics.telemetry.clone(),
        config.pipeline.clone(),
        Some(metrics),
    );

    let (shutdown_tx, _) = broadcast::channel(16);
    let processor_handle = processor.spawn(&shutdown_tx);

    let mut service_tasks = Vec::new();
    service_tasks.push(spawn_normalizer(
        ScadaNormalizer,
        topics.raw_scada.clone(),
        &topics,
        archive.clone(),
        &config,
        &shutdown_tx,
    ));
    service_tasks.push(spawn_normalizer(
        AmiNormalizer,
        topics.raw_ami.clone(),
        &topics,
        archive.clone(),
        &config,
        &shutdown_tx,
    ));
    service_tasks.push(spawn_normalizer(
        CallCenterNormalizer,
        topics.raw_calls.clone(),
        &topics,
        archive.clone(),
        &config,
        &shutdown_tx,
    ));
    service_tasks.push(spawn_outage_drain(&topics, &config, &shutdown_tx));

    if config.mode.is_simulation() {
        info!("simulation mode engaged; starting feed generator");
        service_tasks.push(spawn_feed(
            config.simulation.clone(),
            &topics,
            &shutdown_tx,
        ));
    }

    info!(workers = config.pipeline.workers, "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    let _ = shutdown_tx.send(());
    processor_handle.join().await?;
    for task in service_tasks {
        if let Err(err) = task.await {
            warn!(error = %err, "service task join error");
        }
    }
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    info!("daemon shutdown complete");
    Ok(())
}

fn spawn_normalizer<N: Normalizer + 'static>(
    normalizer: N,
    inbound: Arc<InMemoryTransport>,
    topics: &Topics,
    archive: Arc<dyn ArchiveSink>,
    config: &AppConfig,
    shutdown: &broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let source = normalizer.source_system();
    let service = NormalizerService::new(
        normalizer,
        inbound,
        topics.telemetry.clone(),
        archive,
        config.pipeline.poll_interval,
    );
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        if let Err(err) = service.run(shutdown_rx).await {
            warn!(source = %source, error = %err, "normalizer service failed");
        }
    })
}

/// Downstream stand-in: drains outage notices and surfaces them in the log.
fn spawn_outage_drain(
    topics: &Topics,
    config: &AppConfig,
    shutdown: &broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let outages = topics.outages.clone();
    let poll_interval = config.pipeline.poll_interval;
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("outage drain shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {
                    while let Some(delivery) = outages.pull() {
                        match serde_json::from_slice::<OutageNotice>(&delivery.envelope.data) {
                            Ok(notice) => info!(
                                kind = notice.kind(),
                                device_id = notice.device_id(),
                                outage_id = ?notice.outage_id(),
                                "outage notice delivered downstream"
                            ),
                            Err(err) => warn!(error = %err, "undecodable outage notice"),
                        }
                        if let Err(err) = outages.ack(delivery.lease) {
                            warn!(error = %err, "failed to acknowledge outage notice");
                        }
                    }
                }
            }
        }
    })
}

fn spawn_feed(
    simulation: SimulationConfig,
    topics: &Topics,
    shutdown: &broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let scada = topics.raw_scada.clone();
    let ami = topics.raw_ami.clone();
    let calls = topics.raw_calls.clone();
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        let mut engine = FeedEngine::from_config(&simulation);
        let mut ticker = tokio::time::interval(simulation.tick_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("feed generator shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    for message in engine.next_tick() {
                        let published = match &message {
                            RawFeedMessage::Scada(frame) => publish_json(&*scada, frame),
                            RawFeedMessage::Ami(reading) => publish_json(&*ami, reading),
                            RawFeedMessage::CallCenter(report) => publish_json(&*calls, report),
                        };
                        if let Err(err) = published {
                            warn!(error = %err, "failed to publish simulated feed message");
                        }
                    }
                }
            }
        }
    })
}

fn publish_json<T: Serialize>(transport: &dyn Transport, payload: &T) -> Result<()> {
    let envelope = Envelope::json(payload).context("failed to serialize feed payload")?;
    transport
        .publish(envelope)
        .context("failed to publish feed payload")?;
    Ok(())
}
