//! Local inference-runtime provisioning
//!
//! Detects the host platform, then drives the installer agent through
//! download, install, service start and verification of the Ollama runtime,
//! classifying failures and offering recovery actions along the way.

pub mod controller;
pub mod core;
pub mod environment;
pub mod error;
pub mod gateway;
mod orchestration;
pub mod platform;
pub mod recovery;
pub mod state_machine;

pub use controller::{ControllerOptions, ProvisionController, StopHandle};
pub use error::{Category, ClassifiedError, ErrorCode, Severity, classify};
pub use gateway::{
    GatewayError, HttpAgent, InstallerAgent, ModelDescriptor, RuntimeStatus, StatusGateway,
};
pub use orchestration::{InstallOptions, run_interactive_install};
pub use platform::{ArchClass, OsClass, PlatformDetector, PlatformProfile};
pub use recovery::RecoveryAction;
pub use state_machine::{InstallationStateMachine, PipelineError};

use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use crate::config::ProvisionConfig;
use self::core::DelayPacer;

/// Build an HTTP-backed controller from configuration
///
/// Detection runs once here and the resulting profile is handed to the
/// controller by value.
pub async fn connect(
    config: &ProvisionConfig,
    events: Option<tokio::sync::mpsc::Sender<core::ProvisionEvent>>,
    force_install: bool,
) -> Result<ProvisionController<HttpAgent>> {
    let agent = HttpAgent::new(
        &config.agent_url,
        &config.runtime_url,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to build installer agent client")?;

    let profile = PlatformDetector::new().detect();
    info!(
        "{} {} ({:?}), supported: {}",
        platform::icon(profile.os),
        platform::display_name(profile.os),
        profile.arch,
        profile.supported
    );

    let options = ControllerOptions {
        force_install: force_install || config.force_install,
        pacer: Box::new(DelayPacer::new(Duration::from_millis(config.step_delay_ms))),
        events,
    };
    Ok(ProvisionController::connect(agent, profile, options).await)
}

/// Ensure Ollama is installed and running, provisioning it if needed
///
/// This is the entry point for an application shell to call at startup.
///
/// # Behavior
/// - already installed and running: return immediately
/// - otherwise: run the full pipeline, then prepare `default_model` if set
pub async fn ensure_provisioned(config: &ProvisionConfig) -> Result<RuntimeStatus> {
    let mut controller = connect(config, None, false).await?;

    if controller.status().is_some_and(RuntimeStatus::is_ready) {
        info!("Ollama already installed and running, skipping provisioning");
    } else {
        info!("Ollama not ready, provisioning");
        controller.start_installation().await?;
    }

    if let Some(model) = config.default_model.as_deref() {
        let ok = controller.prepare_model(model).await?;
        if !ok {
            anyhow::bail!("Model {model} did not answer the test prompt");
        }
    }

    controller
        .status()
        .cloned()
        .context("Runtime status unavailable after provisioning")
}
