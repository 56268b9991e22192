//! Status/validation gateway over the installer agent
//!
//! The installer agent is the privileged process that actually downloads,
//! installs and starts Ollama. This module defines its request/response
//! contract ([`InstallerAgent`]), an HTTP implementation ([`HttpAgent`]),
//! and the [`StatusGateway`] the pipeline and controller talk to.
//!
//! No retries happen here; every failure propagates to the caller.

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use super::core::AsyncTask;

/// Failures coming back from the agent or the runtime API
///
/// `Display` text is what the error classifier matches on, so each variant
/// leads with a phrase naming its failure class.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("network request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Agent(String),

    #[error("{0}")]
    Validation(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartServiceResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallErrors {
    #[serde(default)]
    pub install: Option<String>,
    #[serde(default)]
    pub running: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationInfo {
    pub installed: bool,
    pub running: bool,
    #[serde(default)]
    pub version: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub errors: InstallErrors,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub installation: InstallationInfo,
}

/// Locally available model, as listed by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub size: u64,
    #[serde(rename = "modifiedAt", alias = "modified_at")]
    pub modified_at: String,
    pub digest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

/// Request/response contract of the installer agent and runtime API
pub trait InstallerAgent: Send + Sync {
    fn install(&self, force: bool) -> AsyncTask<GatewayResult<InstallResponse>>;
    fn start_service(&self) -> AsyncTask<GatewayResult<StartServiceResponse>>;
    fn status(&self) -> AsyncTask<GatewayResult<StatusResponse>>;
    fn models(&self) -> AsyncTask<GatewayResult<ModelsResponse>>;
    /// Pull `name` into the runtime; resolves once the pull finished
    fn pull(&self, name: &str) -> AsyncTask<GatewayResult<()>>;
    /// Non-streaming generation; returns the response text
    fn generate(&self, model: &str, prompt: &str) -> AsyncTask<GatewayResult<String>>;
}

/// Point-in-time runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStatus {
    pub installed: bool,
    pub running: bool,
    pub version: Option<String>,
    pub port: u16,
    /// Failure text keyed by phase ("install", "running")
    pub errors: BTreeMap<String, String>,
}

impl RuntimeStatus {
    pub fn is_ready(&self) -> bool {
        self.installed && self.running
    }
}

impl From<InstallationInfo> for RuntimeStatus {
    fn from(info: InstallationInfo) -> Self {
        let mut errors = BTreeMap::new();
        if let Some(e) = info.errors.install {
            errors.insert("install".to_string(), e);
        }
        if let Some(e) = info.errors.running {
            errors.insert("running".to_string(), e);
        }
        Self {
            installed: info.installed,
            running: info.running,
            version: info.version,
            port: info.port,
            errors,
        }
    }
}

const TEST_PROMPT: &str = "Hello";

/// Query and command surface used by the installation pipeline
pub struct StatusGateway<A> {
    agent: A,
}

impl<A: InstallerAgent> StatusGateway<A> {
    pub fn new(agent: A) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub async fn get_status(&self) -> GatewayResult<RuntimeStatus> {
        let response = self.agent.status().await?;
        let status = RuntimeStatus::from(response.installation);
        debug!(
            "Runtime status: installed={} running={} version={:?} port={}",
            status.installed, status.running, status.version, status.port
        );
        Ok(status)
    }

    pub async fn get_available_models(&self) -> GatewayResult<Vec<ModelDescriptor>> {
        Ok(self.agent.models().await?.models)
    }

    pub async fn has_model(&self, name: &str) -> GatewayResult<bool> {
        let models = self.get_available_models().await?;
        Ok(models
            .iter()
            .any(|m| m.name == name || m.name.split(':').next() == Some(name)))
    }

    /// Agent-reported failure becomes `GatewayError::Agent`
    pub async fn install(&self, force: bool) -> GatewayResult<()> {
        let response = self.agent.install(force).await?;
        if response.success {
            Ok(())
        } else {
            Err(GatewayError::Agent(
                response
                    .error
                    .unwrap_or_else(|| "installer agent reported failure".to_string()),
            ))
        }
    }

    pub async fn start_service(&self) -> GatewayResult<()> {
        let response = self.agent.start_service().await?;
        if response.success {
            Ok(())
        } else {
            Err(GatewayError::Agent(
                response
                    .message
                    .unwrap_or_else(|| "installer agent could not start the service".to_string()),
            ))
        }
    }

    pub async fn pull_model(&self, name: &str) -> GatewayResult<bool> {
        self.agent.pull(name).await?;
        Ok(true)
    }

    /// Minimal generate round trip; true iff the model answered
    pub async fn test_model(&self, name: &str) -> GatewayResult<bool> {
        let response = self.agent.generate(name, TEST_PROMPT).await?;
        Ok(!response.trim().is_empty())
    }
}

/// Installer agent reached over HTTP
///
/// Install/start/status/models go to the agent; pull and generate go
/// straight to the Ollama API.
#[derive(Debug, Clone)]
pub struct HttpAgent {
    client: reqwest::Client,
    agent_url: String,
    runtime_url: String,
}

#[derive(Serialize)]
struct InstallRequest {
    force: bool,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl HttpAgent {
    pub fn new(
        agent_url: impl Into<String>,
        runtime_url: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rtprovision/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            agent_url: agent_url.into().trim_end_matches('/').to_string(),
            runtime_url: runtime_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn get<T>(&self, url: String) -> AsyncTask<GatewayResult<T>>
    where
        T: for<'de> Deserialize<'de> + Send + 'static,
    {
        let request = self.client.get(url);
        AsyncTask::from_future(async move { decode(request.send().await?).await })
    }

    fn post<B, T>(&self, url: String, body: &B) -> AsyncTask<GatewayResult<T>>
    where
        B: Serialize,
        T: for<'de> Deserialize<'de> + Send + 'static,
    {
        let request = self.client.post(url).json(body);
        AsyncTask::from_future(async move { decode(request.send().await?).await })
    }
}

async fn decode<T>(response: reqwest::Response) -> GatewayResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}

impl InstallerAgent for HttpAgent {
    fn install(&self, force: bool) -> AsyncTask<GatewayResult<InstallResponse>> {
        self.post(
            format!("{}/ollama/install", self.agent_url),
            &InstallRequest { force },
        )
    }

    fn start_service(&self) -> AsyncTask<GatewayResult<StartServiceResponse>> {
        self.post(format!("{}/ollama/start", self.agent_url), &serde_json::json!({}))
    }

    fn status(&self) -> AsyncTask<GatewayResult<StatusResponse>> {
        self.get(format!("{}/ollama/status", self.agent_url))
    }

    fn models(&self) -> AsyncTask<GatewayResult<ModelsResponse>> {
        self.get(format!("{}/ollama/models", self.agent_url))
    }

    fn pull(&self, name: &str) -> AsyncTask<GatewayResult<()>> {
        let name = name.to_string();
        self.post::<_, PullResponse>(
            format!("{}/api/pull", self.runtime_url),
            &PullRequest {
                name: &name,
                stream: false,
            },
        )
        .and_then(move |response| async move {
            match response.error {
                Some(e) => Err(GatewayError::Agent(format!("Failed to pull model {name}: {e}"))),
                None if response.status == "success" || response.status.is_empty() => Ok(()),
                None => Err(GatewayError::Agent(format!(
                    "Failed to pull model {name}: runtime reported '{}'",
                    response.status
                ))),
            }
        })
    }

    fn generate(&self, model: &str, prompt: &str) -> AsyncTask<GatewayResult<String>> {
        self.post::<_, GenerateResponse>(
            format!("{}/api/generate", self.runtime_url),
            &GenerateRequest {
                model,
                prompt,
                stream: false,
            },
        )
        .map(|r| r.response)
    }
}
