//! Stateful coordinator that a UI drives
//!
//! Owns the platform profile, the live step list, aggregate progress, the
//! last classified error with its recovery actions, and the last known
//! runtime status. Runs are sequential; a [`StopHandle`] lets another task
//! abandon the run in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc;

use super::core::{DelayPacer, EventSink, InstallationStep, ProgressPacer, ProvisionEvent};
use super::error::{ClassifiedError, classify};
use super::gateway::{InstallerAgent, RuntimeStatus, StatusGateway};
use super::platform::PlatformProfile;
use super::recovery::{RecoveryAction, recovery_actions_for};
use super::state_machine::{InstallationStateMachine, PipelineError};

/// Cloneable handle that requests cancellation of the current run
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct ControllerOptions {
    pub force_install: bool,
    pub pacer: Box<dyn ProgressPacer>,
    pub events: Option<mpsc::Sender<ProvisionEvent>>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            force_install: false,
            pacer: Box::new(DelayPacer::new(Duration::from_millis(150))),
            events: None,
        }
    }
}

pub struct ProvisionController<A> {
    gateway: StatusGateway<A>,
    profile: PlatformProfile,
    machine: InstallationStateMachine,
    progress: f32,
    error: Option<ClassifiedError>,
    recovery_actions: Vec<RecoveryAction>,
    status: Option<RuntimeStatus>,
    installing: bool,
    cancel: Arc<AtomicBool>,
    pacer: Box<dyn ProgressPacer>,
    events: EventSink,
    force_install: bool,
}

impl<A: InstallerAgent> ProvisionController<A> {
    /// Build the controller and run the initial status check
    pub async fn connect(agent: A, profile: PlatformProfile, options: ControllerOptions) -> Self {
        let events = options.events.map(EventSink::new).unwrap_or_default();
        let mut controller = Self {
            gateway: StatusGateway::new(agent),
            machine: InstallationStateMachine::new(profile.clone(), options.force_install),
            profile,
            progress: 0.0,
            error: None,
            recovery_actions: Vec::new(),
            status: None,
            installing: false,
            cancel: Arc::new(AtomicBool::new(false)),
            pacer: options.pacer,
            events,
            force_install: options.force_install,
        };
        controller.check_installation_status().await;
        controller
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn gateway(&self) -> &StatusGateway<A> {
        &self.gateway
    }

    pub fn steps(&self) -> &[InstallationStep] {
        self.machine.steps()
    }

    pub fn current_step(&self) -> usize {
        self.machine.current_step()
    }

    pub fn overall_progress(&self) -> f32 {
        self.progress
    }

    pub fn error(&self) -> Option<&ClassifiedError> {
        self.error.as_ref()
    }

    pub fn recovery_actions(&self) -> &[RecoveryAction] {
        &self.recovery_actions
    }

    pub fn status(&self) -> Option<&RuntimeStatus> {
        self.status.as_ref()
    }

    pub fn is_installing(&self) -> bool {
        self.installing
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Refresh runtime status; true when already installed and running
    ///
    /// A failed query keeps the last known status and reports false.
    pub async fn check_installation_status(&mut self) -> bool {
        match self.gateway.get_status().await {
            Ok(status) => {
                let ready = status.is_ready();
                info!(
                    "Ollama installed={} running={} version={}",
                    status.installed,
                    status.running,
                    status.version.as_deref().unwrap_or("unknown")
                );
                self.status = Some(status);
                ready
            }
            Err(e) => {
                warn!("Could not query runtime status: {e}");
                false
            }
        }
    }

    /// Run the pipeline from the top on a fresh step list
    ///
    /// A stop requested since the previous run ended is honored here: the
    /// run is cancelled before any agent call. The stop flag is cleared
    /// once the run returns.
    pub async fn start_installation(&mut self) -> Result<(), ClassifiedError> {
        self.reset_pipeline();
        self.installing = true;

        let result = self
            .machine
            .run(&self.gateway, self.pacer.as_ref(), &self.cancel, &self.events)
            .await;

        self.installing = false;
        self.cancel.store(false, Ordering::SeqCst);
        self.progress = self.progress.max(self.machine.overall_progress());

        match result {
            Ok(()) => {
                self.check_installation_status().await;
                self.events.send(ProvisionEvent::Finished);
                Ok(())
            }
            Err(PipelineError::Cancelled { .. }) => {
                let cancelled = ClassifiedError::cancelled();
                self.record_error(cancelled.clone());
                Err(cancelled)
            }
            Err(e) => {
                let context = e.step().map(|s| s.as_str()).unwrap_or("pipeline");
                let classified = classify(&e, Some(context));
                error!("Provisioning failed: {classified}");
                self.record_error(classified.clone());
                Err(classified)
            }
        }
    }

    /// Abandon the run in flight and record a cancellation
    ///
    /// An agent call already issued is not aborted; its result is dropped
    /// when it arrives. With no run in flight the next start is cancelled.
    pub fn stop_installation(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.installing = false;
        info!("Installation stop requested");
        self.record_error(ClassifiedError::cancelled());
    }

    /// Discard all step state and progress, then start over
    ///
    /// Same as [`start_installation`](Self::start_installation), which
    /// always begins from a fresh pipeline.
    pub async fn retry_installation(&mut self) -> Result<(), ClassifiedError> {
        info!("Retrying installation from the first step");
        self.start_installation().await
    }

    /// Fresh step list, zero progress, no error
    pub fn reset_pipeline(&mut self) {
        self.machine = InstallationStateMachine::new(self.profile.clone(), self.force_install);
        self.progress = 0.0;
        self.error = None;
        self.recovery_actions.clear();
        self.events.send(ProvisionEvent::Reset {
            steps: self.machine.steps().to_vec(),
        });
    }

    /// Pull `name` when missing, then smoke-test it
    pub async fn prepare_model(&mut self, name: &str) -> Result<bool, ClassifiedError> {
        let outcome = async {
            if !self.gateway.has_model(name).await? {
                info!("Pulling model {name}");
                self.gateway.pull_model(name).await?;
            }
            self.gateway.test_model(name).await
        }
        .await;

        outcome.map_err(|e| {
            let classified = classify(&e, Some(name));
            self.record_error(classified.clone());
            classified
        })
    }

    fn record_error(&mut self, error: ClassifiedError) {
        self.recovery_actions = recovery_actions_for(&error);
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::core::{ImmediatePacer, StepId, StepStatus};
    use crate::provision::error::ErrorCode;
    use crate::provision::gateway::testing::{FailAt, ScriptedAgent};
    use crate::provision::platform::profile_from_signature;

    fn options() -> ControllerOptions {
        ControllerOptions {
            force_install: false,
            pacer: Box::new(ImmediatePacer),
            events: None,
        }
    }

    async fn controller(agent: ScriptedAgent) -> ProvisionController<ScriptedAgent> {
        ProvisionController::connect(agent, profile_from_signature("macos aarch64 unix"), options())
            .await
    }

    #[tokio::test]
    async fn construction_checks_status_once() {
        let ctl = controller(ScriptedAgent::ready()).await;
        assert_eq!(ctl.gateway().agent().status_calls.load(Ordering::SeqCst), 1);
        assert!(ctl.status().unwrap().is_ready());
        assert!(ctl.error().is_none());
    }

    #[tokio::test]
    async fn unreachable_agent_reports_not_installed() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Probe)).await;
        assert!(!ctl.check_installation_status().await);
        assert!(ctl.status().is_none());
    }

    #[tokio::test]
    async fn successful_install_refreshes_status() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Nothing)).await;
        assert!(!ctl.status().unwrap().is_ready());

        ctl.start_installation().await.unwrap();

        assert!(ctl.steps().iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(ctl.overall_progress(), 100.0);
        assert!(ctl.status().unwrap().is_ready());
        assert!(!ctl.is_installing());
    }

    #[tokio::test]
    async fn install_failure_is_classified() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Install)).await;
        let err = ctl.start_installation().await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InstallationError);
        assert_eq!(ctl.error().map(|e| e.code), Some(ErrorCode::InstallationError));
        assert_eq!(ctl.recovery_actions()[0].id, "retry-installation");

        let statuses: Vec<_> = ctl.steps().iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            [
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Error,
                StepStatus::Pending,
                StepStatus::Pending
            ]
        );
        assert!(!ctl.steps()[2].error.as_deref().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn start_failure_is_a_service_error() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Start)).await;
        let err = ctl.start_installation().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ServiceError);
        assert_eq!(ctl.current_step(), 3);
    }

    #[tokio::test]
    async fn unreachable_agent_fails_download_as_network_error() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Probe)).await;
        let err = ctl.start_installation().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NetworkError);
        assert_eq!(ctl.steps()[1].id, StepId::Download);
        assert_eq!(ctl.steps()[1].status, StepStatus::Error);
    }

    #[tokio::test]
    async fn reset_discards_failed_run() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Install)).await;
        ctl.start_installation().await.unwrap_err();

        ctl.reset_pipeline();

        assert_eq!(ctl.overall_progress(), 0.0);
        assert!(ctl.error().is_none());
        assert_eq!(ctl.steps()[0].status, StepStatus::Completed);
        assert!(ctl.steps()[1..].iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn retry_restarts_from_the_top() {
        let (tx, mut rx) = mpsc::channel(512);
        let agent = ScriptedAgent::new(FailAt::Install);
        let mut ctl = ProvisionController::connect(
            agent,
            profile_from_signature("linux x86_64 unix"),
            ControllerOptions {
                events: Some(tx),
                ..options()
            },
        )
        .await;
        ctl.start_installation().await.unwrap_err();
        while rx.try_recv().is_ok() {}

        ctl.gateway().agent().set_fail_at(FailAt::Nothing);
        ctl.retry_installation().await.unwrap();

        match rx.try_recv().unwrap() {
            ProvisionEvent::Reset { steps } => {
                assert_eq!(steps[0].status, StepStatus::Completed);
                assert!(steps[1..].iter().all(|s| s.status == StepStatus::Pending));
            }
            other => panic!("expected reset, got {other:?}"),
        }
        let mut first_started = None;
        while let Ok(event) = rx.try_recv() {
            if let ProvisionEvent::StepStarted { index, .. } = event {
                first_started.get_or_insert(index);
            }
        }
        assert_eq!(first_started, Some(1));
        assert_eq!(ctl.gateway().agent().install_calls.load(Ordering::SeqCst), 2);
        assert!(ctl.error().is_none());
        assert_eq!(ctl.overall_progress(), 100.0);
    }

    #[tokio::test]
    async fn stop_records_cancellation() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Nothing)).await;
        ctl.stop_installation();

        let err = ctl.error().unwrap();
        assert_eq!(err.code, ErrorCode::UserCancelled);
        assert_eq!(ctl.recovery_actions()[0].id, "restart-installation");
        assert!(ctl.stop_handle().is_stopped());
    }

    #[tokio::test]
    async fn stop_between_runs_cancels_the_next_start() {
        let mut ctl = controller(ScriptedAgent::new(FailAt::Install)).await;
        ctl.start_installation().await.unwrap_err();

        // e.g. Ctrl-C while a recovery action runs
        ctl.stop_handle().stop();
        ctl.gateway().agent().set_fail_at(FailAt::Nothing);

        let err = ctl.retry_installation().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UserCancelled);
        assert_eq!(ctl.gateway().agent().install_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.steps()[1].status, StepStatus::Error);
        assert!(!ctl.stop_handle().is_stopped());

        ctl.retry_installation().await.unwrap();
        assert_eq!(ctl.gateway().agent().install_calls.load(Ordering::SeqCst), 2);
        assert!(ctl.error().is_none());
    }

    #[tokio::test]
    async fn stop_handle_abandons_run_in_flight() {
        struct StopOnFirstPause(StopHandle);
        impl ProgressPacer for StopOnFirstPause {
            fn pause(&self, _step: StepId) -> crate::provision::core::AsyncTask<()> {
                self.0.stop();
                crate::provision::core::AsyncTask::ready(())
            }
        }

        let mut ctl = controller(ScriptedAgent::new(FailAt::Nothing)).await;
        ctl.pacer = Box::new(StopOnFirstPause(ctl.stop_handle()));

        let err = ctl.start_installation().await.unwrap_err();

        assert_eq!(err.code, ErrorCode::UserCancelled);
        assert_eq!(ctl.steps()[1].status, StepStatus::Error);
        assert!(ctl.steps()[2..].iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(ctl.gateway().agent().install_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prepare_model_pulls_and_tests() {
        let mut ctl = controller(ScriptedAgent::ready()).await;
        assert!(ctl.prepare_model("mistral").await.unwrap());
        assert!(ctl.prepare_model("llama3.2").await.unwrap());
    }
}
