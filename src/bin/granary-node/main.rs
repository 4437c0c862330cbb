//! granary-node CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use color_eyre::eyre::eyre;
use granary_node::bandwidth::{BandwidthCache, HttpSpeedTest};
use granary_node::config::NodeConfig;
use granary_node::report::Contact;
use granary_node::telemetry::{HttpCollector, Reporter};
use granary_node::{vault, wizard};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONFIG_FILE: &str = "config.toml";

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("granary-node v{}", env!("CARGO_PKG_VERSION"));

    let datadir = cli.datadir();
    if datadir.exists() {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| datadir.join(CONFIG_FILE));
        if !config_path.exists() {
            return Err(eyre!(
                "no granary configuration found in {}",
                datadir.display()
            ));
        }

        let config = NodeConfig::from_file(&config_path)?;
        let password = unlock_password(&cli)?;
        run_node(config, &datadir, &password).await
    } else {
        println!("\n Let's set up your granary configuration!\n");
        let answers = wizard::run(&datadir)?;
        let password = answers.password.clone();
        let datadir = answers.datadir.clone();
        let config = setup(answers)?;
        run_node(config, &datadir, &password).await
    }
}

/// Persist the wizard's answers: generate and encrypt the private key,
/// then write the key blob and configuration.
fn setup(answers: wizard::SetupAnswers) -> color_eyre::Result<NodeConfig> {
    let key = vault::generate_key();
    let blob = vault::encrypt_key(&answers.password, &key)?;

    // The wizard already verified the key path's parent exists.
    std::fs::write(&answers.config.keypath, format!("{blob}\n"))?;
    std::fs::create_dir_all(&answers.config.storage.path)?;

    let config_path = answers.datadir.join(CONFIG_FILE);
    answers.config.to_file(&config_path)?;
    info!("configuration written to {}", config_path.display());

    Ok(answers.config)
}

/// Obtain the key password from the CLI or an interactive prompt.
fn unlock_password(cli: &Cli) -> color_eyre::Result<String> {
    match &cli.password {
        Some(password) if !password.is_empty() => Ok(password.clone()),
        _ => Ok(dialoguer::Password::new()
            .with_prompt("Unlock your private key to start granary")
            .interact()?),
    }
}

/// Unlock the node identity and run until a shutdown signal arrives.
async fn run_node(config: NodeConfig, datadir: &Path, password: &str) -> color_eyre::Result<()> {
    config.validate()?;

    let blob = std::fs::read_to_string(&config.keypath)?;
    let Ok(key) = vault::decrypt_key(password, &blob) else {
        eprintln!("Failed to unlock private key - incorrect password");
        std::process::exit(1);
    };

    let node_id = vault::node_id(&key);
    info!("unlocked node identity {node_id}");

    let contact = Contact {
        address: config.network.address.clone(),
        port: config.network.port,
        node_id: node_id.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reporter_handle = if config.telemetry.enabled {
        let cache = BandwidthCache::new(&datadir.join("cache"), &node_id);
        let probe = Arc::new(HttpSpeedTest::new(config.telemetry.probe_url.clone()));
        let collector = Arc::new(HttpCollector::new(config.telemetry.collector_url.clone()));
        let reporter = Reporter::new(config, contact, cache, probe, collector, shutdown_rx);
        Some(tokio::spawn(reporter.run()))
    } else {
        info!("telemetry disabled, reporting loop not started");
        None
    };

    wait_for_shutdown().await?;

    if let Err(e) = shutdown_tx.send(true) {
        warn!("failed to send shutdown signal: {e}");
    }
    if let Some(handle) = reporter_handle {
        let _ = handle.await;
    }

    info!("node shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, initiating shutdown"),
        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, initiating shutdown");
    Ok(())
}
