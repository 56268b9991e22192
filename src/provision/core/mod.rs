//! Core provisioning records: steps, progress events, pacing and boxed tasks

mod async_task;
mod progress;
mod step;

pub use async_task::AsyncTask;
pub use progress::{DelayPacer, EventSink, ImmediatePacer, ProgressPacer, ProvisionEvent};
pub use step::{InstallationStep, StepId, StepStatus, fresh_steps};
