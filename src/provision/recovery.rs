//! Recovery actions and presentation helpers for classified errors
//!
//! Remediation routines are advisory: they log what the user should do and
//! report success. The caller always follows a routine with a full pipeline
//! retry, which is what actually confirms the fix.

use std::fmt;
use std::sync::Arc;

use log::info;

use super::core::AsyncTask;
use super::error::{Category, ClassifiedError, ErrorCode, Severity};

type Remediation = Arc<dyn Fn() -> AsyncTask<bool> + Send + Sync>;

/// One remediation offered for a classified error
#[derive(Clone)]
pub struct RecoveryAction {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    /// Needs the user to do something themselves (e.g. relaunch elevated)
    pub requires_user_action: bool,
    routine: Remediation,
}

impl RecoveryAction {
    fn new(
        id: &'static str,
        label: &'static str,
        description: &'static str,
        requires_user_action: bool,
    ) -> Self {
        let routine: Remediation = Arc::new(move || {
            AsyncTask::from_future(async move {
                info!("Recovery action '{id}' acknowledged; retry the installation to apply it");
                true
            })
        });
        Self {
            id,
            label,
            description,
            requires_user_action,
            routine,
        }
    }

    /// Run the remediation routine. Idempotent.
    pub fn execute(&self) -> AsyncTask<bool> {
        (self.routine)()
    }
}

impl fmt::Debug for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryAction")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("requires_user_action", &self.requires_user_action)
            .finish_non_exhaustive()
    }
}

/// Ordered recovery actions for `error`
pub fn recovery_actions_for(error: &ClassifiedError) -> Vec<RecoveryAction> {
    match error.code {
        ErrorCode::NetworkError => vec![
            RecoveryAction::new(
                "retry-connection",
                "Retry Connection",
                "Try reaching the installer agent again",
                false,
            ),
            RecoveryAction::new(
                "check-network",
                "Check Network Settings",
                "Verify internet access, proxy and firewall settings",
                true,
            ),
        ],
        ErrorCode::PermissionError => vec![
            RecoveryAction::new(
                "run-as-admin",
                "Run as Administrator",
                "Restart the application with elevated privileges",
                true,
            ),
            RecoveryAction::new(
                "check-permissions",
                "Check Folder Permissions",
                "Make sure the install directory is writable by your account",
                true,
            ),
        ],
        ErrorCode::InstallationError => vec![
            RecoveryAction::new(
                "retry-installation",
                "Retry Installation",
                "Run the installer again from the first step",
                false,
            ),
            RecoveryAction::new(
                "manual-download",
                "Download Manually",
                "Download the Ollama installer from ollama.com and run it yourself",
                true,
            ),
        ],
        ErrorCode::ServiceError => vec![
            RecoveryAction::new(
                "restart-service",
                "Restart Service",
                "Ask the installer agent to start the Ollama service again",
                false,
            ),
            RecoveryAction::new(
                "check-port",
                "Check Port 11434",
                "Stop whatever else is listening on the Ollama port",
                true,
            ),
        ],
        ErrorCode::ValidationError => vec![
            RecoveryAction::new(
                "reinstall",
                "Reinstall Ollama",
                "Force a fresh installation of the runtime",
                false,
            ),
            RecoveryAction::new(
                "check-logs",
                "Check Ollama Logs",
                "Inspect the runtime logs for startup failures",
                true,
            ),
        ],
        ErrorCode::TimeoutError => vec![
            RecoveryAction::new(
                "retry-operation",
                "Retry Operation",
                "Run the installation again",
                false,
            ),
            RecoveryAction::new(
                "check-connection-speed",
                "Check Connection Speed",
                "Slow connections can make large downloads time out",
                true,
            ),
        ],
        ErrorCode::UserCancelled => vec![RecoveryAction::new(
            "restart-installation",
            "Restart Installation",
            "Start the installation again from the beginning",
            false,
        )],
        ErrorCode::UnknownError => vec![
            RecoveryAction::new(
                "retry-operation",
                "Retry Operation",
                "Run the installation again",
                false,
            ),
            RecoveryAction::new(
                "restart-application",
                "Restart Application",
                "Close and reopen the application, then retry",
                true,
            ),
        ],
    }
}

pub fn user_friendly_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::NetworkError => {
            "We couldn't reach the network. Check your connection and try again."
        }
        ErrorCode::PermissionError => {
            "The installer doesn't have permission to make changes. Try running as Administrator."
        }
        ErrorCode::InstallationError => {
            "Ollama could not be installed. You can retry or install it manually."
        }
        ErrorCode::ServiceError => {
            "Ollama is installed but its service did not start. Another program may be using its port."
        }
        ErrorCode::ValidationError => {
            "Ollama was installed but did not pass verification. A reinstall usually fixes this."
        }
        ErrorCode::TimeoutError => "The operation took too long. Please try again.",
        ErrorCode::UnknownError => "Something unexpected went wrong. Please try again.",
        ErrorCode::UserCancelled => "Installation was cancelled. You can start it again at any time.",
    }
}

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "green",
        Severity::Medium => "yellow",
        Severity::High => "orange",
        Severity::Critical => "red",
    }
}

pub fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "ℹ️",
        Severity::Medium => "⚠️",
        Severity::High => "❌",
        Severity::Critical => "🚨",
    }
}

pub fn is_recoverable(error: &ClassifiedError) -> bool {
    error.retryable && error.severity != Severity::Critical
}

const BASELINE_TROUBLESHOOTING: [&str; 3] = [
    "Check that your internet connection is stable",
    "Make sure at least 10 GB of disk space is free",
    "Close and reopen the application",
];

/// Baseline steps followed by category-specific ones
pub fn troubleshooting_steps(error: &ClassifiedError) -> Vec<&'static str> {
    let specific: &[&str] = match error.category {
        Category::Network => &[
            "Open https://ollama.com in a browser to confirm it is reachable",
            "Disable VPN or proxy software temporarily",
            "Allow the installer through your firewall",
        ],
        Category::Permission => &[
            "Relaunch the application as Administrator (Windows) or with sudo (macOS/Linux)",
            "Check ownership of the Ollama install directory",
            "Temporarily disable antivirus software",
        ],
        Category::Installation => &[
            "Remove any partial Ollama installation",
            "Download the installer manually from https://ollama.com/download",
            "Restart your computer before retrying",
        ],
        Category::Service => &[
            "Check whether another process is listening on port 11434",
            "Run `ollama serve` in a terminal to see startup errors",
            "Restart the Ollama service",
        ],
        Category::Validation => &[
            "Run `ollama --version` in a terminal",
            "Run `ollama list` to confirm the API responds",
            "Reinstall Ollama if either command fails",
        ],
        Category::Unknown => &[
            "Retry the installation",
            "Check the application logs for details",
        ],
    };

    BASELINE_TROUBLESHOOTING
        .iter()
        .chain(specific.iter())
        .copied()
        .collect()
}
