//! In-process table of asynchronous manager jobs.
//!
//! Each manager call that runs in the background gets a UUID. Readers poll
//! by id; a job in a terminal state is handed out once and then evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use notevault_core::SaveResult;

/// The state of one background job.
#[derive(Clone, Debug)]
pub enum JobState {
    /// Still working.
    Running,
    /// Finished successfully.
    Done(Box<SaveResult>),
    /// Finished with an error.
    Failed(String),
}

impl JobState {
    /// Whether this state ends the job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// Shared job table.
#[derive(Clone, Default)]
pub struct JobTable {
    inner: Arc<Mutex<HashMap<Uuid, JobState>>>,
}

impl JobTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running job.
    pub fn insert(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().insert(id, JobState::Running);
        id
    }

    /// Mark a job done.
    pub fn complete(&self, id: Uuid, result: SaveResult) {
        self.inner
            .lock()
            .unwrap()
            .insert(id, JobState::Done(Box::new(result)));
    }

    /// Mark a job failed.
    pub fn fail(&self, id: Uuid, message: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .insert(id, JobState::Failed(message.into()));
    }

    /// Poll a job. Terminal states are returned once and evicted.
    pub fn poll(&self, id: Uuid) -> Option<JobState> {
        let mut table = self.inner.lock().unwrap();
        let state = table.get(&id)?.clone();
        if state.is_terminal() {
            table.remove(&id);
        }
        Some(state)
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether no jobs are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_polls_repeatedly() {
        let table = JobTable::new();
        let id = table.insert();
        assert!(matches!(table.poll(id), Some(JobState::Running)));
        assert!(matches!(table.poll(id), Some(JobState::Running)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_terminal_state_evicted_after_poll() {
        let table = JobTable::new();
        let id = table.insert();
        table.fail(id, "boom");

        assert!(matches!(table.poll(id), Some(JobState::Failed(_))));
        assert!(table.poll(id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_job() {
        let table = JobTable::new();
        assert!(table.poll(Uuid::new_v4()).is_none());
    }
}
