//! rtprovision: local inference-runtime provisioning
//!
//! Detects the host, installs and starts the Ollama runtime through a
//! privileged installer agent, verifies it, and turns any failure into a
//! classified error with recovery options. Designed to be called by an
//! application shell during startup via [`provision::ensure_provisioned`].

pub mod config;
pub mod provision;
