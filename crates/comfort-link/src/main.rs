//! Comfort host binary: link session + ensemble decision loop

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use comfort_link::feedback_log::FeedbackLog;
use comfort_link::session::{LinkBus, LinkConfig, LinkSession};
use comfort_link::supervisor::SessionSupervisor;
use comfort_link::transport::TcpConnector;
use comfort_link::ProtocolCodec;
use coordination::{default_registry, CsvDatasetSource, EnsembleBus, EnsembleCoordinator, Profile};
use tracing::info;

/// Host-side link and decision loop for the comfort sensor board
#[derive(Debug, Parser)]
#[command(name = "comfort-link", version)]
struct Cli {
    /// Address of the serial-over-TCP bridge to the board
    #[arg(long, default_value = "127.0.0.1:9600")]
    peer: String,

    /// Comfort profile to train the ensemble for
    #[arg(long, default_value = "normal")]
    profile: Profile,

    /// Directory holding the per-profile training CSVs
    #[arg(long, default_value = "data")]
    data_dir: String,

    /// CSV file user feedback is appended to
    #[arg(long, default_value = "user_feedback.csv")]
    feedback_log: String,

    /// Wait after opening the link, while the board finishes its reset
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!(peer = %cli.peer, profile = %cli.profile, "Comfort host starting");

    let link_bus = LinkBus::new().shared();
    let ensemble_bus = EnsembleBus::new().shared();

    // Console sink: every event from both buses, one JSON line each.
    let mut link_rx = link_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = link_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                println!("{json}");
            }
        }
    });
    let mut ensemble_rx = ensemble_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = ensemble_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                println!("{json}");
            }
        }
    });

    let coordinator = EnsembleCoordinator::new(
        default_registry(),
        Arc::new(CsvDatasetSource::new(&cli.data_dir)),
        ensemble_bus,
    )
    .shared();

    // Train in the background while the link comes up.
    let training = coordinator.switch_profile(cli.profile);

    let connector = TcpConnector::new(cli.peer.clone())
        .with_settle_delay(Duration::from_millis(cli.settle_ms));
    let session = Arc::new(LinkSession::new(
        Arc::new(connector),
        ProtocolCodec::new(),
        LinkConfig::default(),
        link_bus.clone(),
    ));

    session.connect().await?;
    session.start().await?;

    if let Some(handle) = training {
        let _ = handle.await;
    }

    let feedback = Arc::new(FeedbackLog::new(&cli.feedback_log));
    let supervisor = SessionSupervisor::new(session.clone(), coordinator, feedback, link_bus);
    let decision_loop = supervisor.spawn();

    info!("Comfort host running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    session.stop().await;
    decision_loop.abort();

    Ok(())
}
