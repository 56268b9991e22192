//! Installation step records

use serde::Serialize;

/// Stable identifiers for the five pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    Detect,
    Download,
    Install,
    StartService,
    Verify,
}

impl StepId {
    pub const ALL: [StepId; 5] = [
        StepId::Detect,
        StepId::Download,
        StepId::Install,
        StepId::StartService,
        StepId::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Detect => "detect",
            StepId::Download => "download",
            StepId::Install => "install",
            StepId::StartService => "start-service",
            StepId::Verify => "verify",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepId::Detect => "Detect Platform",
            StepId::Download => "Download Installer",
            StepId::Install => "Install Ollama",
            StepId::StartService => "Start Service",
            StepId::Verify => "Verify Installation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StepId::Detect => "Identify the operating system and processor architecture",
            StepId::Download => "Fetch the Ollama installer for this platform",
            StepId::Install => "Install the Ollama runtime on this machine",
            StepId::StartService => "Launch the Ollama service in the background",
            StepId::Verify => "Confirm the runtime is installed and answering requests",
        }
    }

    /// Synthetic progress increment used while the step is in flight
    pub fn progress_stride(&self) -> u8 {
        match self {
            StepId::Detect => 100,
            StepId::Download => 10,
            StepId::Install => 5,
            StepId::StartService => 20,
            StepId::Verify => 25,
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

/// One stage of a provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationStep {
    pub id: StepId,
    pub label: &'static str,
    pub description: &'static str,
    pub status: StepStatus,
    /// 0-100, only meaningful while `InProgress`
    pub progress: Option<u8>,
    pub error: Option<String>,
}

impl InstallationStep {
    pub fn new(id: StepId) -> Self {
        Self {
            id,
            label: id.label(),
            description: id.description(),
            status: StepStatus::Pending,
            progress: None,
            error: None,
        }
    }

    pub fn start(&mut self) {
        self.status = StepStatus::InProgress;
        self.progress = Some(0);
        self.error = None;
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = Some(progress.min(100));
    }

    pub fn complete(&mut self) {
        self.status = StepStatus::Completed;
        self.progress = Some(100);
        self.error = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = StepStatus::Error;
        self.error = Some(message.into());
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// Fresh step list: detection pre-completed, everything else pending
pub fn fresh_steps() -> Vec<InstallationStep> {
    StepId::ALL
        .iter()
        .map(|id| {
            let mut step = InstallationStep::new(*id);
            if *id == StepId::Detect {
                step.complete();
            }
            step
        })
        .collect()
}
