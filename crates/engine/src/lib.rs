#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Staged operation engine for stagehand
//!
//! An operation is an ordered list of stages materialized from a template.
//! The [`OperationRegistry`] owns every operation and exposes the command and
//! query API (`create`, `trigger`, `cancel`, `tick`, `get`, `list`) plus a
//! change feed. A [`Scheduler`] ticks running operations on a fixed interval,
//! and an [`AdvancePolicy`] decides how the running stage moves on each tick.
//!
//! ```no_run
//! # async fn demo() -> Result<(), stagehand_errors::Error> {
//! use std::sync::Arc;
//! use stagehand_config::Config;
//! use stagehand_engine::{OperationRegistry, Scheduler};
//!
//! let config = Config::default();
//! let registry = Arc::new(OperationRegistry::from_config(&config)?);
//! let scheduler = Scheduler::from_config(Arc::clone(&registry), &config);
//! scheduler.start()?;
//!
//! let op = registry.create("react-app", Default::default())?;
//! registry.trigger(op.id())?;
//! # Ok(())
//! # }
//! ```

pub mod advance;
pub mod catalog;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod subscription;

pub use advance::{derive_operation_status, StageChange, TickOutcome, TickReport};
pub use catalog::TemplateCatalog;
pub use policy::{AdvancePolicy, AlwaysAdvance, RandomPolicy, ScriptedPolicy, StageDecision, TickContext};
pub use registry::{OperationRegistry, PassSummary};
pub use scheduler::Scheduler;
pub use snapshot::{RegistrySnapshot, SNAPSHOT_FORMAT_VERSION};
pub use subscription::{Subscriber, SubscriptionId};
