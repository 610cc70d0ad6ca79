use crate::reconciler::SyncCore;
use crate::remote::BridgeApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Drives [`SyncCore::reconcile_pass`] on a fixed period. The first pass runs
/// as soon as the scheduler starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollScheduler {
    period: Duration,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Must be called from inside a tokio runtime.
    pub fn start<B: BridgeApi>(&self, core: Arc<SyncCore<B>>) -> PollHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let period = self.period;
        let task = tokio::spawn(run_ticks(core, period, shutdown_rx));
        info!(event = "poller_started", period_ms = period.as_millis() as u64);
        PollHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn run_ticks<B: BridgeApi>(
    core: Arc<SyncCore<B>>,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                // Passes are not serialized; a slow bridge can leave several in flight.
                let core = Arc::clone(&core);
                tokio::spawn(async move {
                    core.reconcile_pass().await;
                });
            }
        }
    }
    debug!(event = "poller_loop_exit");
}

/// Owned handle for a running scheduler. Dropping it stops ticking too.
#[derive(Debug)]
pub struct PollHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Ends ticking and waits for the loop to exit. Passes already in flight
    /// still finish and apply their results.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(event = "poller_join_failed", error = %err);
            }
        }
        info!(event = "poller_stopped");
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
