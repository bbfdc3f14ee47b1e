//! The request pool: a queue of tasks drained by one coordinator thread.
//!
//! # Design
//! Three collections each sit behind their own mutex: the FIFO queue, the
//! running map (task → live session) and the finished list. Any operation
//! that touches more than one of them locks in the fixed order
//! running → queue → finished, which is what keeps `cancel`, `clear_all`,
//! `is_running_or_queued` and admission from deadlocking or observing a task
//! halfway between two collections.
//!
//! All network progress happens on the coordinator thread through
//! `Session::pump`, a non-blocking step, so the transport engine is never
//! driven from two threads at once. Admission is one task at a time: the
//! next task is admitted only when nothing is running. Requests inside that
//! task still progress concurrently.
//!
//! The coordinator loop is `tick` plus an adaptive sleep. `Pool::manual`
//! skips the thread so tests (or an embedding event loop) call `tick`
//! themselves.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::error::{Result, ERR_INIT};
use crate::lock;
use crate::task::{Task, TaskStatus};
use crate::transport::{Session, Transport};

/// A task whose session is live.
struct Running {
    session: Box<dyn Session>,
    active: usize,
}

/// Collection sizes, read under all three locks at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
}

/// What one coordinator iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    /// Tasks still running after the pump.
    pub running: usize,
    /// Tasks that completed during this iteration.
    pub retired: usize,
    /// Whether a queued task was admitted.
    pub admitted: bool,
}

impl Tick {
    pub fn is_idle(&self) -> bool {
        self.running == 0 && self.retired == 0 && !self.admitted
    }
}

struct Shared {
    transport: Box<dyn Transport>,
    running: Mutex<HashMap<Task, Running>>,
    queue: Mutex<VecDeque<Task>>,
    finished: Mutex<Vec<Task>>,
}

impl Shared {
    fn execute(&self, task: &Task) {
        let mut queue = lock(&self.queue);
        if !task.transition(TaskStatus::Queued) {
            tracing::debug!(task = %task.id(), status = ?task.status(), "execute ignored");
            return;
        }
        queue.push_back(task.clone());
    }

    fn cancel(&self, task: &Task) {
        let mut running = lock(&self.running);
        let mut queue = lock(&self.queue);
        if let Some(mut entry) = running.remove(task) {
            entry.session.close();
            task.transition(TaskStatus::Canceled);
            lock(&self.finished).push(task.clone());
            tracing::debug!(task = %task.id(), active = entry.active, "canceled running task");
        } else if let Some(pos) = queue.iter().position(|t| t == task) {
            queue.remove(pos);
            task.transition(TaskStatus::Canceled);
            tracing::debug!(task = %task.id(), "canceled queued task");
        }
    }

    fn is_running(&self, task: &Task) -> bool {
        lock(&self.running).contains_key(task)
    }

    fn is_queued(&self, task: &Task) -> bool {
        lock(&self.queue).contains(task)
    }

    fn is_running_or_queued(&self, task: &Task) -> bool {
        let running = lock(&self.running);
        let queue = lock(&self.queue);
        running.contains_key(task) || queue.contains(task)
    }

    fn is_finished(&self, task: &Task) -> bool {
        lock(&self.finished).contains(task)
    }

    fn stats(&self) -> PoolStats {
        let running = lock(&self.running);
        let queue = lock(&self.queue);
        let finished = lock(&self.finished);
        PoolStats {
            queued: queue.len(),
            running: running.len(),
            finished: finished.len(),
        }
    }

    fn take_finished(&self) -> Vec<Task> {
        std::mem::take(&mut *lock(&self.finished))
    }

    fn clear_all(&self) {
        let mut running = lock(&self.running);
        let mut queue = lock(&self.queue);
        for (task, mut entry) in running.drain() {
            entry.session.close();
            task.transition(TaskStatus::Canceled);
        }
        for task in queue.drain(..) {
            task.transition(TaskStatus::Canceled);
        }
        lock(&self.finished).clear();
    }

    fn tick(&self) -> Tick {
        let mut tick = Tick::default();
        let mut running = lock(&self.running);

        let mut done = Vec::new();
        for (task, entry) in running.iter_mut() {
            entry.active = entry.session.pump();
            if entry.active == 0 {
                done.push(task.clone());
            }
        }
        for task in done {
            if let Some(mut entry) = running.remove(&task) {
                entry.session.close();
                task.transition(TaskStatus::Completed);
                lock(&self.finished).push(task.clone());
                tick.retired += 1;
                tracing::debug!(task = %task.id(), "task completed");
            }
        }
        tick.running = running.len();

        if tick.running == 0 {
            let mut queue = lock(&self.queue);
            if let Some(task) = queue.pop_front() {
                self.admit(&mut running, task);
                tick.admitted = true;
            }
        }
        tick
    }

    /// Open a session for `task`. Called with the running and queue locks
    /// held, so no observer sees the task in neither collection.
    fn admit(&self, running: &mut HashMap<Task, Running>, task: Task) {
        match self.transport.open(&task) {
            Ok(session) => {
                task.transition(TaskStatus::Running);
                tracing::debug!(task = %task.id(), requests = task.request_count(), "task admitted");
                let active = task.request_count().max(1);
                running.insert(task, Running { session, active });
            }
            Err(err) => {
                tracing::warn!(task = %task.id(), error = %err, "transport failed to open task");
                for request in task.requests() {
                    request.set_response_errcode(ERR_INIT);
                }
                task.transition(TaskStatus::Running);
                task.fail(ERR_INIT);
                lock(&self.finished).push(task);
            }
        }
    }
}

/// Sleep policy of the coordinator: back to the minimum after any work,
/// doubling up to the maximum while idle.
#[derive(Debug)]
struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(config: &PoolConfig) -> Self {
        Self {
            min: config.min_interval(),
            max: config.max_interval(),
            current: config.min_interval(),
        }
    }

    fn next(&mut self, tick: &Tick) -> Duration {
        self.current = if tick.is_idle() {
            (self.current * 2).min(self.max)
        } else {
            self.min
        };
        self.current
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

fn coordinate(shared: &Shared, stop: &Receiver<()>, config: PoolConfig) {
    let mut backoff = Backoff::new(&config);
    let mut wait = backoff.current;
    loop {
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let tick = shared.tick();
        wait = backoff.next(&tick);
    }
}

/// Schedules tasks onto a transport from a single coordinator thread.
///
/// Every method may be called from any thread. None of them waits on the
/// network; `cancel` and `clear_all` close sessions synchronously, which is
/// bounded by how fast the engine releases its handles.
pub struct Pool {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Pool {
    /// Build a pool and start its coordinator thread.
    pub fn new(transport: impl Transport + 'static, config: PoolConfig) -> Result<Self> {
        let pool = Self::manual(transport);
        let (stop, stopped) = mpsc::channel();
        let shared = Arc::clone(&pool.shared);
        let handle = thread::Builder::new()
            .name("sinet-coordinator".to_string())
            .spawn(move || coordinate(&shared, &stopped, config))?;
        *lock(&pool.worker) = Some(Worker { stop, handle });
        tracing::info!(
            min_interval_ms = config.min_interval_ms,
            max_interval_ms = config.max_interval_ms,
            "pool started"
        );
        Ok(pool)
    }

    /// Build a pool without a coordinator thread; drive it with `tick`.
    pub fn manual(transport: impl Transport + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport: Box::new(transport),
                running: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                finished: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Queue `task` for execution. Only a freshly created task is accepted;
    /// anything else is ignored.
    pub fn execute(&self, task: &Task) {
        self.shared.execute(task);
    }

    /// Stop `task` wherever it is. A running task's session is closed and the
    /// task moves to the finished list; a queued task is simply dropped from
    /// the queue. Finished or unknown tasks are left alone.
    pub fn cancel(&self, task: &Task) {
        self.shared.cancel(task);
    }

    pub fn is_running(&self, task: &Task) -> bool {
        self.shared.is_running(task)
    }

    pub fn is_queued(&self, task: &Task) -> bool {
        self.shared.is_queued(task)
    }

    /// Both checks under one critical section, so a task moving from the
    /// queue into the running map is never reported as neither.
    pub fn is_running_or_queued(&self, task: &Task) -> bool {
        self.shared.is_running_or_queued(task)
    }

    pub fn is_finished(&self, task: &Task) -> bool {
        self.shared.is_finished(task)
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Drain the finished list, oldest first.
    pub fn take_finished(&self) -> Vec<Task> {
        self.shared.take_finished()
    }

    /// Cancel everything running, drop the queue and forget finished tasks.
    pub fn clear_all(&self) {
        self.shared.clear_all();
    }

    /// Run one coordinator iteration: pump running sessions, retire the ones
    /// that are done and admit the next task if nothing is running.
    pub fn tick(&self) -> Tick {
        self.shared.tick()
    }

    /// Stop and join the coordinator thread, then `clear_all`. Running
    /// tasks are canceled and queued ones never start.
    pub fn shutdown(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            if worker.handle.join().is_err() {
                tracing::warn!("coordinator thread panicked");
            }
            tracing::info!("pool stopped");
        }
        self.clear_all();
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
