//! Five-step provisioning pipeline
//!
//! detect -> download -> install -> start service -> verify, strictly in
//! order. Detection is done before construction, so step 0 starts out
//! completed. The first failing step halts the run; there is no internal
//! retry and a new run always starts from a fresh machine.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use super::core::{
    EventSink, InstallationStep, ProgressPacer, ProvisionEvent, StepId, StepStatus, fresh_steps,
};
use super::gateway::{GatewayError, InstallerAgent, StatusGateway};
use super::platform::{self, PlatformProfile};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{message}")]
    StepFailed {
        index: usize,
        step: StepId,
        message: String,
        #[source]
        source: GatewayError,
    },

    #[error("installation cancelled by user")]
    Cancelled { index: usize },
}

impl PipelineError {
    pub fn index(&self) -> usize {
        match self {
            PipelineError::StepFailed { index, .. } | PipelineError::Cancelled { index } => *index,
        }
    }

    pub fn step(&self) -> Option<StepId> {
        match self {
            PipelineError::StepFailed { step, .. } => Some(*step),
            PipelineError::Cancelled { .. } => None,
        }
    }
}

const CANCELLED_MESSAGE: &str = "Installation cancelled by user";

/// Step list plus the run logic over it
#[derive(Debug, Clone)]
pub struct InstallationStateMachine {
    profile: PlatformProfile,
    steps: Vec<InstallationStep>,
    current: usize,
    force_install: bool,
}

impl InstallationStateMachine {
    pub fn new(profile: PlatformProfile, force_install: bool) -> Self {
        Self {
            profile,
            steps: fresh_steps(),
            current: 0,
            force_install,
        }
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn steps(&self) -> &[InstallationStep] {
        &self.steps
    }

    pub fn current_step(&self) -> usize {
        self.current
    }

    /// Completed share plus the current step's fraction, capped at 100
    ///
    /// A failed or cancelled step keeps contributing its last progress so
    /// the value never drops within a run.
    pub fn overall_progress(&self) -> f32 {
        let total = self.steps.len() as f32;
        let completed = self.steps.iter().filter(|s| s.is_completed()).count() as f32;
        let partial = self
            .steps
            .get(self.current)
            .filter(|s| matches!(s.status, StepStatus::InProgress | StepStatus::Error))
            .and_then(|s| s.progress)
            .unwrap_or(0) as f32;

        (completed / total * 100.0 + partial / total).min(100.0)
    }

    /// Drive every pending step to completion or first failure
    ///
    /// `cancel` is checked between progress ticks and after each agent call;
    /// a call already issued is not aborted, its result is dropped.
    pub async fn run<A: InstallerAgent>(
        &mut self,
        gateway: &StatusGateway<A>,
        pacer: &dyn ProgressPacer,
        cancel: &AtomicBool,
        events: &EventSink,
    ) -> Result<(), PipelineError> {
        for index in 0..self.steps.len() {
            if self.steps[index].is_completed() {
                continue;
            }
            if cancel.load(Ordering::SeqCst) {
                return Err(self.cancel_at(index, events));
            }
            self.run_step(index, gateway, pacer, cancel, events).await?;
        }

        info!("Provisioning pipeline finished");
        Ok(())
    }

    async fn run_step<A: InstallerAgent>(
        &mut self,
        index: usize,
        gateway: &StatusGateway<A>,
        pacer: &dyn ProgressPacer,
        cancel: &AtomicBool,
        events: &EventSink,
    ) -> Result<(), PipelineError> {
        let id = self.steps[index].id;
        self.current = index;
        self.steps[index].start();
        info!("Step {}/{}: {}", index + 1, self.steps.len(), self.steps[index].label);
        events.send(ProvisionEvent::StepStarted { index, id });

        let stride = id.progress_stride();
        let mut progress: u8 = 0;
        while progress.saturating_add(stride) < 100 {
            pacer.pause(id).await;
            if cancel.load(Ordering::SeqCst) {
                return Err(self.cancel_at(index, events));
            }
            progress += stride;
            self.steps[index].set_progress(progress);
            debug!("Step {id} at {progress}%");
            events.send(ProvisionEvent::StepProgress {
                index,
                id,
                progress,
                overall: self.overall_progress(),
            });
        }

        let outcome = self.perform(id, gateway).await;

        if cancel.load(Ordering::SeqCst) {
            warn!("Discarding {id} result received after cancellation");
            return Err(self.cancel_at(index, events));
        }

        match outcome {
            Ok(()) => {
                self.steps[index].complete();
                info!("Step {id} completed");
                events.send(ProvisionEvent::StepCompleted {
                    index,
                    id,
                    overall: self.overall_progress(),
                });
                Ok(())
            }
            Err(source) => {
                let message = format!("{}: {source}", failure_prefix(id));
                self.steps[index].fail(message.clone());
                warn!("Step {id} failed: {message}");
                events.send(ProvisionEvent::StepFailed {
                    index,
                    id,
                    message: message.clone(),
                });
                Err(PipelineError::StepFailed {
                    index,
                    step: id,
                    message,
                    source,
                })
            }
        }
    }

    async fn perform<A: InstallerAgent>(
        &self,
        id: StepId,
        gateway: &StatusGateway<A>,
    ) -> Result<(), GatewayError> {
        match id {
            StepId::Detect => Ok(()),
            StepId::Download => {
                if !self.profile.supported {
                    return Err(GatewayError::Agent(format!(
                        "no installer is published for {}",
                        platform::display_name(self.profile.os)
                    )));
                }
                info!(
                    "Installer source for {}: {}",
                    platform::display_name(self.profile.os),
                    platform::download_url(self.profile.os)
                );
                // The agent fetches the installer itself; this confirms it answers.
                gateway.get_status().await.map(|_| ())
            }
            StepId::Install => gateway.install(self.force_install).await,
            StepId::StartService => gateway.start_service().await,
            StepId::Verify => {
                let status = gateway.get_status().await?;
                if !status.is_ready() {
                    let mut detail = format!(
                        "runtime reports installed={} running={}",
                        status.installed, status.running
                    );
                    for (phase, error) in &status.errors {
                        detail.push_str(&format!(", {phase}: {error}"));
                    }
                    return Err(GatewayError::Validation(detail));
                }
                let models = gateway.get_available_models().await?;
                debug!("Runtime lists {} local models", models.len());
                Ok(())
            }
        }
    }

    fn cancel_at(&mut self, index: usize, events: &EventSink) -> PipelineError {
        self.current = index;
        self.steps[index].fail(CANCELLED_MESSAGE);
        info!("Provisioning cancelled at step {}", self.steps[index].id);
        events.send(ProvisionEvent::Cancelled { index });
        PipelineError::Cancelled { index }
    }
}

fn failure_prefix(id: StepId) -> &'static str {
    match id {
        StepId::Detect => "Failed to detect platform",
        StepId::Download => "Failed to download Ollama installer",
        StepId::Install => "Failed to install Ollama",
        StepId::StartService => "Failed to start service",
        StepId::Verify => "Ollama installation verification failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::core::ImmediatePacer;
    use crate::provision::gateway::testing::{FailAt, ScriptedAgent};
    use crate::provision::platform::profile_from_signature;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn linux() -> PlatformProfile {
        profile_from_signature("linux x86_64 unix")
    }

    #[test]
    fn initial_state_has_detection_completed() {
        let machine = InstallationStateMachine::new(linux(), false);
        let statuses: Vec<_> = machine.steps().iter().map(|s| s.status).collect();
        assert_eq!(statuses[0], StepStatus::Completed);
        assert!(statuses[1..].iter().all(|s| *s == StepStatus::Pending));
        assert_eq!(machine.overall_progress(), 20.0);
    }

    #[tokio::test]
    async fn successful_run_completes_every_step() {
        let gateway = StatusGateway::new(ScriptedAgent::new(FailAt::Nothing));
        let mut machine = InstallationStateMachine::new(linux(), false);

        machine
            .run(&gateway, &ImmediatePacer, &AtomicBool::new(false), &EventSink::default())
            .await
            .unwrap();

        assert!(machine.steps().iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(machine.overall_progress(), 100.0);
    }

    #[tokio::test]
    async fn install_failure_halts_pipeline() {
        let gateway = StatusGateway::new(ScriptedAgent::new(FailAt::Install));
        let mut machine = InstallationStateMachine::new(linux(), false);

        let err = machine
            .run(&gateway, &ImmediatePacer, &AtomicBool::new(false), &EventSink::default())
            .await
            .unwrap_err();

        assert_eq!(err.index(), 2);
        let steps = machine.steps();
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert_eq!(steps[2].status, StepStatus::Error);
        assert!(steps[2].error.as_deref().unwrap().starts_with("Failed to install Ollama"));
        assert_eq!(steps[3].status, StepStatus::Pending);
        assert_eq!(steps[4].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn verify_rejects_runtime_that_is_not_running() {
        let agent = ScriptedAgent::new(FailAt::Nothing);
        agent.silent_start.store(true, Ordering::SeqCst);
        let gateway = StatusGateway::new(agent);
        let mut machine = InstallationStateMachine::new(linux(), false);

        let err = machine
            .run(&gateway, &ImmediatePacer, &AtomicBool::new(false), &EventSink::default())
            .await
            .unwrap_err();

        assert_eq!(err.index(), 4);
        assert!(err.to_string().starts_with("Ollama installation verification failed"));
        assert!(err.to_string().contains("installed=true running=false"));
    }

    #[tokio::test]
    async fn unsupported_platform_fails_at_download() {
        let gateway = StatusGateway::new(ScriptedAgent::new(FailAt::Nothing));
        let mut machine = InstallationStateMachine::new(profile_from_signature("haiku"), false);
        let err = machine
            .run(&gateway, &ImmediatePacer, &AtomicBool::new(false), &EventSink::default())
            .await
            .unwrap_err();
        assert_eq!(err.index(), 1);
        assert_eq!(gateway.agent().install_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_run_never_calls_agent() {
        let gateway = StatusGateway::new(ScriptedAgent::new(FailAt::Nothing));
        let mut machine = InstallationStateMachine::new(linux(), false);
        let err = machine
            .run(&gateway, &ImmediatePacer, &AtomicBool::new(true), &EventSink::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { index: 1 }));
        assert_eq!(gateway.agent().status_calls.load(Ordering::SeqCst), 0);
        assert_eq!(machine.steps()[1].status, StepStatus::Error);
        assert!(machine.steps()[2..].iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn result_arriving_after_stop_is_discarded() {
        let cancel = Arc::new(AtomicBool::new(false));
        let agent = ScriptedAgent::new(FailAt::Nothing);
        *agent.stop_during_install.lock().unwrap() = Some(cancel.clone());
        let gateway = StatusGateway::new(agent);
        let mut machine = InstallationStateMachine::new(linux(), false);

        let err = machine
            .run(&gateway, &ImmediatePacer, &cancel, &EventSink::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { index: 2 }));
        assert_eq!(gateway.agent().install_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.agent().start_calls.load(Ordering::SeqCst), 0);
        let steps = machine.steps();
        assert_eq!(steps[2].status, StepStatus::Error);
        assert_eq!(steps[2].error.as_deref(), Some(CANCELLED_MESSAGE));
        assert!(steps[3..].iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn progress_events_are_ordered_and_monotonic() {
        let (tx, mut rx) = mpsc::channel(256);
        let gateway = StatusGateway::new(ScriptedAgent::new(FailAt::Nothing));
        let mut machine = InstallationStateMachine::new(linux(), false);
        machine
            .run(&gateway, &ImmediatePacer, &AtomicBool::new(false), &EventSink::new(tx))
            .await
            .unwrap();

        let mut last_overall = 0.0f32;
        let mut started = Vec::new();
        let mut in_flight: Option<usize> = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ProvisionEvent::StepStarted { index, .. } => {
                    assert!(in_flight.is_none(), "two steps in progress at once");
                    in_flight = Some(index);
                    started.push(index);
                }
                ProvisionEvent::StepProgress { overall, .. } => {
                    assert!(overall >= last_overall);
                    last_overall = overall;
                }
                ProvisionEvent::StepCompleted { index, overall, .. } => {
                    assert_eq!(in_flight.take(), Some(index));
                    assert!(overall >= last_overall);
                    last_overall = overall;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(started, vec![1, 2, 3, 4]);
        assert_eq!(last_overall, 100.0);
    }
}
