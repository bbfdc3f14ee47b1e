//! Tasks: a batch of requests scheduled and executed as one unit.
//!
//! # Design
//! A `Task` is a shared handle compared by identity, so the caller and the
//! pool can both hold it and the pool can find "this task" in its
//! collections no matter what the requests contain. The status lives behind
//! its own mutex and condition variable; that lock is always the innermost
//! one taken, never held while acquiring a pool lock.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ERR_OK;
use crate::lock;
use crate::request::Request;

/// Lifecycle of a task.
///
/// ```text
/// created -> queued -> running -> completed
///              |          |
///              +----------+----> canceled
/// ```
/// `completed` and `canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum TaskStatus {
    Created = 0,
    Queued = 1,
    Running = 2,
    Canceled = 3,
    Completed = 4,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Canceled | TaskStatus::Completed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Created, Queued)
                | (Queued, Running)
                | (Queued, Canceled)
                | (Running, Completed)
                | (Running, Canceled)
        )
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    error_code: i32,
}

struct TaskInner {
    id: Uuid,
    requests: Mutex<Vec<Request>>,
    state: Mutex<TaskState>,
    changed: Condvar,
}

/// Shared handle to a task. Equality and hashing are by identity.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .field("requests", &self.request_count())
            .finish()
    }
}

impl Task {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: Uuid::new_v4(),
                requests: Mutex::new(Vec::new()),
                state: Mutex::new(TaskState {
                    status: TaskStatus::Created,
                    error_code: ERR_OK,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn with_requests(requests: impl IntoIterator<Item = Request>) -> Self {
        let task = Self::new();
        lock(&task.inner.requests).extend(requests);
        task
    }

    /// Identifier used in log events.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Requests added after the task has been admitted are not transferred.
    pub fn add_request(&self, request: Request) {
        lock(&self.inner.requests).push(request);
    }

    pub fn request(&self, index: usize) -> Option<Request> {
        lock(&self.inner.requests).get(index).cloned()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.inner.requests).len()
    }

    pub fn requests(&self) -> Vec<Request> {
        lock(&self.inner.requests).clone()
    }

    pub fn status(&self) -> TaskStatus {
        lock(&self.inner.state).status
    }

    /// Aggregate error of the task; nonzero only when admission failed.
    pub fn error_code(&self) -> i32 {
        lock(&self.inner.state).error_code
    }

    /// Block until the task is terminal or `timeout` elapses, returning the
    /// status observed last.
    pub fn wait(&self, timeout: Duration) -> TaskStatus {
        let state = lock(&self.inner.state);
        let (state, _) = self
            .inner
            .changed
            .wait_timeout_while(state, timeout, |s| !s.status.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        state.status
    }

    /// Apply `next` if the lifecycle allows it. Returns whether it did.
    pub(crate) fn transition(&self, next: TaskStatus) -> bool {
        let mut state = lock(&self.inner.state);
        if !state.status.can_transition_to(next) {
            return false;
        }
        tracing::debug!(task = %self.inner.id, from = ?state.status, to = ?next, "task status");
        state.status = next;
        self.inner.changed.notify_all();
        true
    }

    /// Record an aggregate error and complete the running task.
    pub(crate) fn fail(&self, code: i32) {
        lock(&self.inner.state).error_code = code;
        self.transition(TaskStatus::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn lifecycle_table() {
        use TaskStatus::*;
        assert!(Created.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Canceled));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Canceled));

        assert!(!Created.can_transition_to(Running));
        assert!(!Queued.can_transition_to(Queued));
        for terminal in [Completed, Canceled] {
            assert!(terminal.is_terminal());
            for next in [Created, Queued, Running, Canceled, Completed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn transition_rejects_illegal_moves() {
        let task = Task::new();
        assert!(!task.transition(TaskStatus::Running));
        assert!(task.transition(TaskStatus::Queued));
        assert!(task.transition(TaskStatus::Canceled));
        assert!(!task.transition(TaskStatus::Canceled));
        assert_eq!(task.status(), TaskStatus::Canceled);
    }

    #[test]
    fn identity_semantics() {
        let a = Task::new();
        let b = Task::new();
        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(a.clone());
        set.insert(b.clone());
        assert_eq!(set.len(), 2);
        assert!(a != b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn requests_are_ordered() {
        let first = Request::get("http://one/");
        let second = Request::get("http://two/");
        let task = Task::with_requests([first.clone(), second.clone()]);
        assert_eq!(task.request_count(), 2);
        assert!(task.request(0).unwrap() == first);
        assert!(task.request(1).unwrap() == second);
        assert!(task.request(2).is_none());
    }

    #[test]
    fn wait_returns_on_terminal_status() {
        let task = Task::new();
        task.transition(TaskStatus::Queued);
        task.transition(TaskStatus::Running);

        let waiter = {
            let task = task.clone();
            thread::spawn(move || task.wait(Duration::from_secs(10)))
        };
        task.fail(crate::error::ERR_INIT);

        assert_eq!(waiter.join().unwrap(), TaskStatus::Completed);
        assert_eq!(task.error_code(), crate::error::ERR_INIT);
    }

    #[test]
    fn wait_times_out_on_live_task() {
        let task = Task::new();
        assert_eq!(task.wait(Duration::from_millis(10)), TaskStatus::Created);
    }
}
