//! Scheduler: drives registry ticks on a fixed interval

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use stagehand_config::{Config, SchedulerConfig};
use stagehand_errors::{ConfigError, EngineError, Error};
use stagehand_events::{AppEvent, EventEmitter, SchedulerEvent};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::registry::OperationRegistry;

#[derive(Debug, Clone, Copy)]
struct Settings {
    interval: Duration,
    stop_when_idle: bool,
    history_limit: Option<usize>,
}

#[derive(Debug)]
struct SchedulerTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

/// One global interval ticking every running operation in a registry
///
/// `start` spawns a Tokio task; `stop` shuts it down and reports how many
/// passes ran. Dropping the scheduler also ends the task. With
/// `stop_when_idle` the task parks while nothing is running and wakes when an
/// operation is triggered.
#[derive(Debug)]
pub struct Scheduler {
    registry: Arc<OperationRegistry>,
    settings: Settings,
    task: Mutex<Option<SchedulerTask>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>, config: &SchedulerConfig) -> Self {
        Self {
            registry,
            settings: Settings {
                interval: config.tick_interval(),
                stop_when_idle: config.stop_when_idle,
                history_limit: None,
            },
            task: Mutex::new(None),
        }
    }

    /// Scheduler settings plus the engine history limit
    #[must_use]
    pub fn from_config(registry: Arc<OperationRegistry>, config: &Config) -> Self {
        Self::new(registry, &config.scheduler).with_history_limit(config.engine.history_capacity())
    }

    /// Terminal operations kept after each pass; `None` keeps everything
    #[must_use]
    pub fn with_history_limit(mut self, keep: Option<usize>) -> Self {
        self.settings.history_limit = keep;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.settings.interval
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_task().is_ok_and(|task| task.is_some())
    }

    /// Spawn the ticking task on the current Tokio runtime
    ///
    /// # Errors
    ///
    /// Returns `SchedulerAlreadyRunning` if started twice and
    /// `ConfigError::InvalidValue` for a zero interval.
    pub fn start(&self) -> Result<(), Error> {
        let mut task = self.lock_task()?;
        if task.is_some() {
            return Err(EngineError::SchedulerAlreadyRunning.into());
        }
        if self.settings.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.tick_interval_ms".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(Arc::clone(&self.registry), self.settings, shutdown_rx));
        *task = Some(SchedulerTask { shutdown, handle });
        drop(task);

        let interval_ms = u64::try_from(self.settings.interval.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, "scheduler started");
        self.registry
            .emit(AppEvent::Scheduler(SchedulerEvent::Started { interval_ms }));
        Ok(())
    }

    /// Stop the task and wait for it to finish its current pass
    ///
    /// # Errors
    ///
    /// Returns `SchedulerNotRunning` if it was never started, or an internal
    /// error if the task panicked.
    pub async fn stop(&self) -> Result<u64, Error> {
        let task = self
            .lock_task()?
            .take()
            .ok_or(EngineError::SchedulerNotRunning)?;

        // The task may already be gone if it panicked
        let _ = task.shutdown.send(());
        let passes = task
            .handle
            .await
            .map_err(|e| Error::internal(format!("scheduler task failed: {e}")))?;

        info!(passes, "scheduler stopped");
        self.registry
            .emit(AppEvent::Scheduler(SchedulerEvent::Stopped { passes }));
        Ok(passes)
    }

    fn lock_task(&self) -> Result<MutexGuard<'_, Option<SchedulerTask>>, Error> {
        self.task
            .lock()
            .map_err(|_| Error::internal("scheduler lock poisoned"))
    }
}

async fn run(
    registry: Arc<OperationRegistry>,
    settings: Settings,
    mut shutdown: oneshot::Receiver<()>,
) -> u64 {
    let period = settings.interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut passes = 0u64;

    loop {
        if settings.stop_when_idle && !registry.has_running() {
            debug!("scheduler parked");
            registry.emit(AppEvent::Scheduler(SchedulerEvent::Parked));
            tokio::select! {
                _ = &mut shutdown => break,
                () = registry.activity().notified() => {}
            }
            if registry.has_running() {
                debug!("scheduler resumed");
                registry.emit(AppEvent::Scheduler(SchedulerEvent::Resumed));
                ticker.reset();
            }
            continue;
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        passes += 1;
        match registry.tick_all() {
            Ok(summary) => {
                debug!(pass = passes, ticked = summary.ticked, finished = summary.finished, "scheduler pass");
                registry.emit(AppEvent::Scheduler(SchedulerEvent::PassCompleted {
                    pass: passes,
                    ticked: summary.ticked,
                    finished: summary.finished,
                }));
            }
            Err(e) => {
                warn!(error = %e, "scheduler pass failed");
                registry.emit_error(format!("scheduler pass {passes} failed: {e}"));
            }
        }

        if let Some(keep) = settings.history_limit {
            if let Err(e) = registry.prune_history(keep) {
                warn!(error = %e, "history pruning failed");
                registry.emit_warning(format!("history pruning failed: {e}"));
            }
        }
    }

    passes
}
