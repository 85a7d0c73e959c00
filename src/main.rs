//! Launcher daemon: keeps the artifact current and the process supervised.

use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use updating_launcher::config;
use updating_launcher::control::descriptor::ConnectionDescriptor;
use updating_launcher::control::server::ControlEndpoint;
use updating_launcher::diagnostics;
use updating_launcher::errors::Result;
use updating_launcher::release::ReleaseChecker;
use updating_launcher::supervisor::{DEFAULT_STOP_GRACE, ProcessSupervisor};
use updating_launcher::updater::ArtifactUpdater;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file (non-fatal, env vars can be set externally)
    dotenvy::dotenv().ok();

    // 3. Resolve the working directory and load the configuration
    let directory = updating_launcher::ul_directory();
    tokio::fs::create_dir_all(&directory).await?;
    let config = config::load_or_init(&directory.join(updating_launcher::CONFIG_FILE_NAME))
        .inspect_err(|e| error!("Configuration not usable: {e}"))?;
    let pattern = config.checking.compiled_pattern()?;

    // 4. Assemble the service context
    let supervisor = Arc::new(ProcessSupervisor::new(
        config.artifact_path.clone(),
        config.process.args.clone(),
    ));
    let checker = ReleaseChecker::new(&config.github.owner, &config.github.repo)?;
    let updater = Arc::new(ArtifactUpdater::new(
        checker,
        Arc::clone(&supervisor),
        config.artifact_path.clone(),
        pattern,
    ));

    // 5. Publish the connection descriptor and bring up the control
    //    endpoint; a port that cannot be bound is fatal because the
    //    descriptor would point nowhere.
    let descriptor = ConnectionDescriptor::generate(config.control.port, supervisor.launch_command());
    let descriptor_path = descriptor.write(&directory).await?;
    info!(
        "published connection descriptor at {}",
        descriptor_path.display()
    );

    let listener = ControlEndpoint::<ReleaseChecker>::bind(&config.control.host, config.control.port)
        .await
        .inspect_err(|e| error!("Cannot bring up the control endpoint: {e}"))?;
    let endpoint = Arc::new(ControlEndpoint::new(
        Arc::clone(&updater),
        Arc::clone(&supervisor),
        diagnostics::platform_probe(),
        descriptor.admin_password.clone(),
    ));
    tokio::spawn(endpoint.serve(listener));

    // 6. Drive update checks, either on a fixed rate or once at startup
    match config.checking.poll_period() {
        Some(period) => {
            let updater = Arc::clone(&updater);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    // The first tick fires immediately, so the startup
                    // check is just the first scheduled one.
                    ticker.tick().await;
                    updater.poll_cycle().await;
                }
            });
            warn!(
                "Scheduled updater. Will run every {} minutes.",
                config.checking.rate
            );
        }
        None => {
            updater.poll_cycle().await;
            info!("update checking disabled; ran a single startup check");
        }
    }

    // 7. Run until interrupted, then tear the context down
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    if let Err(e) = supervisor.stop(DEFAULT_STOP_GRACE).await {
        warn!("failed to stop the managed process: {e}");
    }
    if let Err(e) = tokio::fs::remove_file(&descriptor_path).await {
        debug!("could not remove {}: {e}", descriptor_path.display());
    }
    Ok(())
}
