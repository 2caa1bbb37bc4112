use anyhow::Context;
use cgateweb::bridge::Bridge;
use cgateweb::labels::LabelOverlay;
use cgateweb::logging;
use cgateweb::settings::Settings;
use cgateweb::settings::DEFAULT_CONFIG_PATH;
use clap::Parser;
use std::path::Path;
use std::path::PathBuf;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;

#[derive(Debug, Parser)]
#[clap(
    name = clap::crate_name!(),
    version = clap::crate_version!(),
    about = clap::crate_description!()
)]
struct BridgeOpt {
    /// Path to the bridge configuration
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Path to the label overlay file; reloaded on SIGHUP
    #[clap(long)]
    labels: Option<PathBuf>,

    /// Report debug and trace events
    #[clap(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = BridgeOpt::parse();

    let settings = Settings::load(&opt.config).map_err(|errors| {
        for error in &errors {
            eprintln!("cgateweb: {error}");
        }
        anyhow::anyhow!("invalid configuration ({} problems)", errors.len())
    })?;
    logging::init(settings.logging, opt.debug);

    let overlay = match &opt.labels {
        Some(path) => {
            LabelOverlay::from_file(path).context("Failed to load the label overlay")?
        }
        None => LabelOverlay::default(),
    };

    let (labels_tx, labels_rx) = mpsc::channel(1);
    if let Some(path) = opt.labels.clone() {
        tokio::spawn(reload_labels_on_sighup(path, labels_tx));
    }

    info!(
        "cgateweb {} starting: broker {}, C-Gate {}:{}/{}",
        clap::crate_version!(),
        settings.mqtt,
        settings.cbusip,
        settings.cbuscommandport,
        settings.cbuseventport
    );

    let bridge = Bridge::connect(settings, overlay, labels_rx)
        .await
        .context("Failed to start the bridge")?;
    bridge.run(shutdown_signal()).await?;

    info!("cgateweb stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(interrupt) => interrupt,
        Err(err) => {
            error!("Failed to install the SIGINT handler: {err}");
            return std::future::pending().await;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            error!("Failed to install the SIGTERM handler: {err}");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => info!("SIGINT received"),
        _ = terminate.recv() => info!("SIGTERM received"),
    }
}

/// Re-read the label overlay on every SIGHUP and hand the fresh snapshot
/// to the bridge.
async fn reload_labels_on_sighup(path: PathBuf, labels_tx: mpsc::Sender<LabelOverlay>) {
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            error!("Failed to install the SIGHUP handler: {err}");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        match LabelOverlay::from_file(Path::new(&path)) {
            Ok(overlay) => {
                if labels_tx.send(overlay).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!("Keeping the previous label overlay: {err}"),
        }
    }
}
