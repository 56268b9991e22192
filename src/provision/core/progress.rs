//! Provisioning progress events and synthetic progress pacing

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::warn;
use tokio::sync::mpsc;

use super::async_task::AsyncTask;
use super::step::{InstallationStep, StepId};

/// Progress update published by the orchestration controller
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionEvent {
    /// Step list was discarded and rebuilt ahead of a run
    Reset { steps: Vec<InstallationStep> },
    StepStarted { index: usize, id: StepId },
    StepProgress {
        index: usize,
        id: StepId,
        progress: u8,
        overall: f32,
    },
    StepCompleted {
        index: usize,
        id: StepId,
        overall: f32,
    },
    StepFailed {
        index: usize,
        id: StepId,
        message: String,
    },
    Cancelled { index: usize },
    Finished,
}

/// Best-effort publisher over a bounded channel
///
/// A closed receiver disables further sends after a single warning; a full
/// channel drops the update.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ProvisionEvent>>,
    disabled: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ProvisionEvent>) -> Self {
        Self {
            tx: Some(tx),
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn send(&self, event: ProvisionEvent) {
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }

        if let Some(ref tx) = self.tx
            && let Err(e) = tx.try_send(event)
        {
            match e {
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("Progress channel closed, provisioning continues without updates");
                    self.disabled.store(true, Ordering::Relaxed);
                }
                mpsc::error::TrySendError::Full(_) => {}
            }
        }
    }
}

/// Delay inserted between synthetic progress increments
///
/// The installer agent does not report real progress; the pacer only
/// spaces out the fabricated increments so a UI has something to draw.
pub trait ProgressPacer: Send + Sync {
    fn pause(&self, step: StepId) -> AsyncTask<()>;
}

/// Sleeps a fixed interval per increment
#[derive(Debug, Clone, Copy)]
pub struct DelayPacer {
    pub delay: Duration,
}

impl DelayPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ProgressPacer for DelayPacer {
    fn pause(&self, _step: StepId) -> AsyncTask<()> {
        let delay = self.delay;
        AsyncTask::from_future(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        })
    }
}

/// No wall-clock delay; increments are emitted back to back
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediatePacer;

impl ProgressPacer for ImmediatePacer {
    fn pause(&self, _step: StepId) -> AsyncTask<()> {
        AsyncTask::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_channel_disables_sink() {
        let (tx, rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);
        drop(rx);

        sink.send(ProvisionEvent::Finished);
        assert!(sink.disabled.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn full_channel_drops_without_disabling() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);

        sink.send(ProvisionEvent::Finished);
        sink.send(ProvisionEvent::Cancelled { index: 2 });

        assert!(!sink.disabled.load(Ordering::Relaxed));
        assert_eq!(rx.recv().await, Some(ProvisionEvent::Finished));
        assert!(rx.try_recv().is_err());
    }
}
