use serde::{Deserialize, Serialize};

/// Scheduler lifecycle and pass events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchedulerEvent {
    Started { interval_ms: u64 },

    Stopped { passes: u64 },

    /// No running operations; waiting for a trigger
    Parked,

    /// Woken by a trigger after being parked
    Resumed,

    /// One pass over every running operation finished
    PassCompleted {
        pass: u64,
        ticked: usize,
        finished: usize,
    },
}
