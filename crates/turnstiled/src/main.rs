use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod directory;
mod engine;
mod narrator;
mod resolver;
mod session;

use config::Config;
use directory::DirectoryClient;
use engine::{spawn_engine, ScreenSettings};
use narrator::SpeechNarrator;
use resolver::IdentityResolver;
use session::{Session, SessionSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("turnstiled starting");

    let config = Config::from_env();
    tracing::info!(
        camera = %config.camera_device,
        gateway = %config.gateway_base_url,
        directory = %config.directory_base_url,
        "configuration loaded"
    );

    let engine = spawn_engine(
        &config.camera_device,
        &config.detector_model_path(),
        &config.landmark_model_path(),
        config.warmup_frames,
        ScreenSettings {
            blink_hold: config.blink_hold,
            blink_ttl: config.blink_ttl,
            require_motion: config.require_motion,
        },
    )
    .context("failed to start screening engine")?;

    let http = reqwest::Client::new();
    let resolver = IdentityResolver::new(
        http.clone(),
        &config.gateway_base_url,
        &config.gateway_bucket,
    );
    let directory = DirectoryClient::new(http, &config.directory_base_url);
    let narrator = SpeechNarrator::new(&config.speech_command);

    let (session, mut display_rx) = Session::new(
        engine,
        resolver,
        directory,
        narrator,
        SessionSettings {
            cycle_interval: config.cycle_interval,
            auth_hold: config.auth_hold,
        },
    );

    // Surface every display transition in the logs; this is the
    // headless stand-in for a front panel.
    tokio::spawn(async move {
        while display_rx.changed().await.is_ok() {
            let state = display_rx.borrow_and_update().clone();
            tracing::info!(
                authenticated = state.authenticated,
                message = %state.message,
                employee = state.profile.as_ref().map(|p| p.employee_id.as_str()),
                "display updated"
            );
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("turnstiled ready");
    session.run(shutdown_rx).await;
    tracing::info!("turnstiled shutting down");

    Ok(())
}
