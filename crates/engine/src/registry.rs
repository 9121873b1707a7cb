//! Operation registry: the single owner of operation state
//!
//! All mutations go through one lock, so each operation's stage sequence is
//! serialized. Each mutation bumps a generation counter under that lock;
//! events and subscriber callbacks are delivered after it is released, and
//! the subscriber side uses the generation to deliver lists in mutation
//! order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use stagehand_config::{Config, EngineConfig};
use stagehand_errors::{EngineError, Error};
use stagehand_events::{
    AppEvent, EventEmitter, EventSender, FailureContext, OperationEvent, StageEvent,
};
use stagehand_types::{Metadata, Operation, OperationFilter, OperationId, OperationStatus};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::advance::{self, StageChange, TickOutcome};
use crate::catalog::TemplateCatalog;
use crate::policy::{AdvancePolicy, RandomPolicy};
use crate::snapshot::RegistrySnapshot;
use crate::subscription::{Listing, Subscribers, SubscriptionId};

/// Counts from one pass over every running operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub ticked: usize,
    pub finished: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    operations: HashMap<OperationId, Operation>,
    /// Most recent first
    order: VecDeque<OperationId>,
    /// Bumped on every published mutation
    generation: u64,
}

impl RegistryState {
    fn ordered(&self) -> impl Iterator<Item = &Operation> {
        self.order.iter().filter_map(|id| self.operations.get(id))
    }

    fn all(&self) -> Vec<Operation> {
        self.ordered().cloned().collect()
    }

    fn get_mut(&mut self, operation_id: OperationId) -> Result<&mut Operation, EngineError> {
        self.operations
            .get_mut(&operation_id)
            .ok_or(EngineError::NotFound { operation_id })
    }
}

/// Creates, stores and mutates operations
pub struct OperationRegistry {
    state: Mutex<RegistryState>,
    catalog: TemplateCatalog,
    policy: Arc<dyn AdvancePolicy>,
    log_capacity: Option<usize>,
    subscribers: Subscribers,
    events: Option<EventSender>,
    activity: Notify,
}

impl OperationRegistry {
    /// Registry over `catalog` with the default random policy
    #[must_use]
    pub fn new(catalog: TemplateCatalog) -> Self {
        let engine = EngineConfig::default();
        Self {
            state: Mutex::new(RegistryState::default()),
            catalog,
            policy: Arc::new(RandomPolicy::from_config(&engine)),
            log_capacity: engine.log_capacity(),
            subscribers: Subscribers::new(),
            events: None,
            activity: Notify::new(),
        }
    }

    /// Registry wired from configuration: built-in plus configured templates,
    /// configured probabilities and log cap
    ///
    /// # Errors
    ///
    /// Returns an error if a configured template is invalid or duplicated.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let catalog = TemplateCatalog::from_config(config)?;
        Ok(Self::new(catalog)
            .with_policy(RandomPolicy::from_config(&config.engine))
            .with_log_capacity(config.engine.log_capacity()))
    }

    #[must_use]
    pub fn with_policy(self, policy: impl AdvancePolicy + 'static) -> Self {
        self.with_shared_policy(Arc::new(policy))
    }

    /// Use a policy the caller keeps a handle to (e.g. a `ScriptedPolicy`)
    #[must_use]
    pub fn with_shared_policy(mut self, policy: Arc<dyn AdvancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_log_capacity(mut self, log_capacity: Option<usize>) -> Self {
        self.log_capacity = log_capacity;
        self
    }

    #[must_use]
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Materialize a pending operation from a template
    ///
    /// # Errors
    ///
    /// Returns `UnknownTemplate` if the catalog has no such template.
    pub fn create(&self, template_id: &str, metadata: Metadata) -> Result<Operation, Error> {
        let template = self.catalog.get(template_id)?;
        let operation =
            Operation::from_template(template, metadata, self.log_capacity, Utc::now());
        let operation_id = operation.id();

        let listing = {
            let mut state = self.lock_state()?;
            state.order.push_front(operation_id);
            state.operations.insert(operation_id, operation.clone());
            self.listing(&mut state)
        };

        info!(%operation_id, template_id, "operation created");
        self.emit_operation_created(operation_id, template_id, operation.stages().len());
        self.publish(listing);
        Ok(operation)
    }

    /// Start a pending operation: it and its first stage become running
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `InvalidState` unless the
    /// operation is pending. Triggering twice is an error, not a no-op.
    pub fn trigger(&self, operation_id: OperationId) -> Result<(), Error> {
        let (events, listing) = {
            let mut state = self.lock_state()?;
            let operation = state.get_mut(operation_id)?;
            let changes = advance::begin(operation, Utc::now())?;
            let events = stage_events(operation, &changes);
            (events, self.listing(&mut state))
        };

        self.activity.notify_one();
        info!(%operation_id, "operation triggered");
        self.emit_operation_started(operation_id);
        self.emit_all(events);
        self.publish(listing);
        Ok(())
    }

    /// Force a running operation into `Cancelled`
    ///
    /// The running stage is cancelled; pending stages stay pending.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `InvalidState` unless the
    /// operation is running.
    pub fn cancel(&self, operation_id: OperationId) -> Result<(), Error> {
        let (events, listing) = {
            let mut state = self.lock_state()?;
            let operation = state.get_mut(operation_id)?;
            let changes = advance::cancel(operation, Utc::now())?;

            let stage_id = changes
                .first()
                .and_then(|change| operation.stage(change.index()))
                .map(|stage| stage.id().to_string());
            let mut events = stage_events(operation, &changes);
            events.push(AppEvent::Operation(OperationEvent::Cancelled {
                operation_id,
                stage_id,
            }));
            (events, self.listing(&mut state))
        };

        info!(%operation_id, "operation cancelled");
        self.emit_all(events);
        self.publish(listing);
        Ok(())
    }

    /// Apply one advancement step to an operation
    ///
    /// Pending and terminal operations are left exactly as they were. A tick
    /// whose stage held only bumps the tick counter and publishes nothing, so
    /// `Operation::ticks` in subscriber copies can lag behind `get`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn tick(&self, operation_id: OperationId) -> Result<TickOutcome, Error> {
        let (outcome, events, finished, listing) = {
            let mut state = self.lock_state()?;
            let operation = state.get_mut(operation_id)?;
            let report = advance::tick(operation, self.policy.as_ref(), Utc::now())?;
            if report.changes.is_empty() && !matches!(report.outcome, TickOutcome::Finished(_)) {
                return Ok(report.outcome);
            }

            for change in &report.changes {
                if let StageChange::Failed { index, reason } = change {
                    warn!(%operation_id, stage = index, reason = %reason, "stage failed");
                }
            }

            let events = stage_events(operation, &report.changes);
            let finished = match report.outcome {
                TickOutcome::Finished(status) => Some((status, operation.total_duration())),
                _ => None,
            };
            (report.outcome, events, finished, self.listing(&mut state))
        };

        match outcome {
            TickOutcome::Finished(status) => info!(%operation_id, %status, "operation finished"),
            _ => debug!(%operation_id, ?outcome, "operation ticked"),
        }
        self.emit_all(events);
        if let Some((status, duration)) = finished {
            self.emit_operation_finished(operation_id, status, duration);
        }
        self.publish(listing);
        Ok(outcome)
    }

    /// Tick every running operation once, oldest first
    ///
    /// Operations evicted or cancelled while the pass runs are skipped or
    /// left idle; cancellation always wins over a pending tick.
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry lock is poisoned.
    pub fn tick_all(&self) -> Result<PassSummary, Error> {
        let running: Vec<OperationId> = {
            let state = self.lock_state()?;
            state
                .ordered()
                .filter(|op| op.status() == OperationStatus::Running)
                .map(Operation::id)
                .collect()
        };

        let mut summary = PassSummary::default();
        for operation_id in running.into_iter().rev() {
            match self.tick(operation_id) {
                Ok(outcome) => {
                    summary.ticked += 1;
                    if matches!(outcome, TickOutcome::Finished(_)) {
                        summary.finished += 1;
                    }
                }
                Err(Error::Engine(EngineError::NotFound { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }

    /// Whether any operation is currently running
    #[must_use]
    pub fn has_running(&self) -> bool {
        self.lock_state().is_ok_and(|state| {
            state
                .operations
                .values()
                .any(|op| op.status() == OperationStatus::Running)
        })
    }

    /// Read snapshot of one operation
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, operation_id: OperationId) -> Result<Operation, Error> {
        let state = self.lock_state()?;
        state
            .operations
            .get(&operation_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound { operation_id }.into())
    }

    /// Operations matching `filter`, most recently created first
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry lock is poisoned.
    pub fn list(&self, filter: &OperationFilter) -> Result<Vec<Operation>, Error> {
        let state = self.lock_state()?;
        let matching = state.ordered().filter(|op| filter.matches(op)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    /// Number of operations held, terminal ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().map_or(0, |state| state.operations.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `callback` with the full operation list after every mutation
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[Operation]) + Send + Sync + 'static,
    {
        self.subscribers.add(Arc::new(callback))
    }

    /// Returns `false` if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    /// Change feed as a `watch` channel, primed with the current list
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry lock is poisoned.
    pub fn watch(&self) -> Result<watch::Receiver<Vec<Operation>>, Error> {
        let current = {
            let state = self.lock_state()?;
            Listing {
                generation: state.generation,
                operations: state.all(),
            }
        };
        self.subscribers.refresh(current);
        Ok(self.subscribers.watch())
    }

    /// Evict the oldest terminal operations beyond `keep`
    ///
    /// Pending and running operations are never evicted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry lock is poisoned.
    pub fn prune_history(&self, keep: usize) -> Result<Vec<OperationId>, Error> {
        let (evicted, listing) = {
            let mut guard = self.lock_state()?;
            let state = &mut *guard;

            let evicted: Vec<OperationId> = state
                .order
                .iter()
                .filter(|id| state.operations.get(*id).is_some_and(Operation::is_terminal))
                .skip(keep)
                .copied()
                .collect();
            if evicted.is_empty() {
                return Ok(evicted);
            }

            let gone: HashSet<OperationId> = evicted.iter().copied().collect();
            state.order.retain(|id| !gone.contains(id));
            state.operations.retain(|id, _| !gone.contains(id));
            (evicted, self.listing(state))
        };

        debug!(evicted = evicted.len(), keep, "pruned operation history");
        for operation_id in &evicted {
            self.emit(AppEvent::Operation(OperationEvent::Evicted {
                operation_id: *operation_id,
            }));
        }
        self.publish(listing);
        Ok(evicted)
    }

    /// Copy every operation into a snapshot
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry lock is poisoned.
    pub fn snapshot(&self) -> Result<RegistrySnapshot, Error> {
        Ok(RegistrySnapshot::new(self.lock_state()?.all()))
    }

    /// Replace the registry contents with a snapshot
    ///
    /// Running operations in the snapshot keep running once a scheduler is
    /// ticking.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` for a snapshot of another version and
    /// `CorruptedSnapshot` if an operation id appears twice or an operation's
    /// stages could not have been reached by advancing it. Nothing is
    /// replaced on error.
    pub fn restore(&self, snapshot: RegistrySnapshot) -> Result<usize, Error> {
        snapshot.verify("<memory>")?;

        let mut restored = RegistryState::default();
        for operation in snapshot.operations {
            let operation_id = operation.id();
            restored.operations.insert(operation_id, operation);
            restored.order.push_back(operation_id);
        }
        let count = restored.order.len();

        let listing = {
            let mut state = self.lock_state()?;
            restored.generation = state.generation;
            *state = restored;
            self.listing(&mut state)
        };

        if self.has_running() {
            self.activity.notify_one();
        }
        info!(operations = count, "registry restored from snapshot");
        self.emit(AppEvent::Operation(OperationEvent::Restored { operations: count }));
        self.publish(listing);
        Ok(count)
    }

    /// Woken whenever an operation starts running
    pub(crate) fn activity(&self) -> &Notify {
        &self.activity
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, RegistryState>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::internal("operation registry lock poisoned"))
    }

    /// Record a mutation and copy the list if anyone will receive it
    fn listing(&self, state: &mut RegistryState) -> Option<Listing> {
        state.generation += 1;
        self.subscribers.is_listening().then(|| Listing {
            generation: state.generation,
            operations: state.all(),
        })
    }

    fn publish(&self, listing: Option<Listing>) {
        if let Some(listing) = listing {
            self.subscribers.publish(listing);
        }
    }

    fn emit_all(&self, events: Vec<AppEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

impl EventEmitter for OperationRegistry {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("templates", &self.catalog.len())
            .field("operations", &self.len())
            .field("log_capacity", &self.log_capacity)
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

fn stage_events(operation: &Operation, changes: &[StageChange]) -> Vec<AppEvent> {
    let operation_id = operation.id();
    changes
        .iter()
        .filter_map(|change| {
            let stage = operation.stage(change.index())?;
            let stage_id = stage.id().to_string();
            let event = match change {
                StageChange::Started { index } => StageEvent::Started {
                    operation_id,
                    stage_id,
                    index: *index,
                    name: stage.name().to_string(),
                },
                StageChange::Progressed { checkpoint, .. } => StageEvent::Progressed {
                    operation_id,
                    stage_id,
                    progress: checkpoint.progress,
                    message: checkpoint.message.clone(),
                },
                StageChange::Succeeded { .. } => StageEvent::Succeeded {
                    operation_id,
                    stage_id,
                    duration: stage.duration(),
                },
                StageChange::Failed { reason, .. } => StageEvent::Failed {
                    operation_id,
                    stage_id,
                    failure: FailureContext::stage_failure(reason.clone()),
                },
                StageChange::Cancelled { .. } => StageEvent::Cancelled {
                    operation_id,
                    stage_id,
                },
                StageChange::Skipped { .. } => StageEvent::Skipped {
                    operation_id,
                    stage_id,
                },
            };
            Some(AppEvent::Stage(event))
        })
        .collect()
}
