//! Execution context for one claimed task
//!
//! Everything a pipeline execution needs travels in this value instead of
//! living on the poller:
//! - The task as claimed
//! - The local working set for its artifacts
//! - The lease deadline

use forge_client::Task;
use std::path::PathBuf;

use crate::scheduler::lease::LeaseClock;
use crate::workspace::WorkingSet;

/// Per-task context passed through the pipeline
pub struct TaskContext {
    pub task: Task,
    pub working_set: WorkingSet,
    pub lease: LeaseClock,
}

impl TaskContext {
    pub fn new(task: Task, working_set: WorkingSet, lease: LeaseClock) -> Self {
        Self {
            task,
            working_set,
            lease,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task.item_id
    }

    /// Local destination of the input artifact
    pub fn input_path(&self) -> PathBuf {
        self.working_set.input_path(&self.task.source_reference)
    }

    /// Local path the compute routine writes to
    pub fn output_path(&self) -> PathBuf {
        self.working_set.output_path()
    }

    /// Releases the working set, consuming the context
    pub fn release(self) -> std::io::Result<()> {
        self.working_set.release()
    }
}
