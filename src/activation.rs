//! Activation: the one call a collaborator makes
//!
//! Update the installed server (unless the user supplied their own build),
//! then launch it and hand back a restartable session.

use crate::config::SupervisorConfig;
use crate::installer::{ArtifactSpec, UpdateOrchestrator, UpdateOutcome, VersionStore};
use crate::server::{find_java, LaunchConfig, ServerSession};
use crate::types::{Error, LaunchError, OutputSink, Status};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the update orchestrator described by `config`
pub fn orchestrator(config: &SupervisorConfig) -> Result<UpdateOrchestrator, Error> {
    let artifact = ArtifactSpec {
        display_name: config.server.display_name.clone(),
        project: config.server.project.clone(),
        asset_name: config.server.asset_name.clone(),
    };

    let orchestrator = UpdateOrchestrator::new(
        artifact,
        VersionStore::new(config.install_dir()?),
        config.api_base_url()?,
        &config.server.owner,
        config.cooldown(),
    )?;

    Ok(orchestrator)
}

/// Make sure the managed server is installed and current
pub async fn update(config: &SupervisorConfig, status: &dyn Status) -> Result<UpdateOutcome, Error> {
    let outcome = orchestrator(config)?.ensure_up_to_date(status).await?;
    Ok(outcome)
}

/// Resolve everything needed to start the server
pub fn prepare_launch(config: &SupervisorConfig) -> Result<LaunchConfig, Error> {
    let install_dir = config.install_dir()?;
    let mut launch = config.launch_config(config.server_executable(&install_dir));

    match find_java(config.java.home.as_deref()) {
        Some(java) => {
            info!("Using Java at {}", java.executable.display());
            if let Some(home) = java.home {
                launch
                    .env
                    .entry("JAVA_HOME".to_string())
                    .or_insert_with(|| home.to_string_lossy().into_owned());
            }
        }
        None if config.java.required => return Err(LaunchError::JavaNotFound.into()),
        None => warn!("Could not find Java, launching anyway"),
    }

    Ok(launch)
}

/// Update (if managed), then launch
pub async fn activate(
    config: &SupervisorConfig,
    status: &dyn Status,
    output: Arc<dyn OutputSink>,
) -> Result<ServerSession, Error> {
    let display_name = &config.server.display_name;
    info!("Activating {}...", display_name);
    status.update(&format!("Activating {}...", display_name));

    if config.has_custom_path() {
        info!("Using custom server path, skipping download");
    } else if let Err(e) = update(config, status).await {
        // A failed update must not block an install that already works
        match VersionStore::new(config.install_dir()?).read() {
            Some(installed) => {
                warn!("{}; continuing with installed version {}", e, installed.version);
                status.update(&format!(
                    "Could not update {}, using {}",
                    display_name, installed.version
                ));
            }
            None => return Err(e),
        }
    }

    let launch = prepare_launch(config)?;
    let session = ServerSession::launch(launch, output).await?;

    status.update(&format!("{} is running", display_name));
    Ok(session)
}
