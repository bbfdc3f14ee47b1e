//! Deterministic in-memory engine.
//!
//! Each URL is routed to a `Script`: how many pump steps the transfer takes,
//! which chunks it streams and how it ends. Nothing happens between pumps, so
//! a test that drives the pool with `Pool::tick` controls every step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::{Result, SinetError, ERR_CONNECT, ERR_OK};
use crate::http::Headers;
use crate::lock;
use crate::request::ResponseSink;
use crate::task::Task;
use crate::transport::{Session, Transport};

type OpenHook = Arc<dyn Fn(&Task) + Send + Sync>;

/// Canned response for one URL.
#[derive(Debug, Clone)]
pub struct Script {
    /// Pumps until the transfer finishes; 0 and 1 both finish on the first.
    pub steps: usize,
    /// Streamed one per pump; leftovers are flushed on the final step.
    pub chunks: Vec<Vec<u8>>,
    pub status: u16,
    pub headers: Headers,
    /// Error code recorded when the transfer finishes.
    pub error: i32,
}

impl Script {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            chunks: Vec::new(),
            status: 200,
            headers: Headers::new(),
            error: ERR_OK,
        }
    }

    pub fn chunk(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.chunks.push(bytes.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn error(mut self, code: i32) -> Self {
        self.error = code;
        self
    }
}

#[derive(Default)]
struct ScriptedState {
    routes: HashMap<String, Script>,
    fail_next_open: bool,
    opens: usize,
    closes: usize,
    open_log: Vec<Uuid>,
    finish_log: Vec<String>,
}

/// Transport that replays `Script`s and counts what the pool asked of it.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptedState>>,
    hook: Mutex<Option<OpenHook>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: impl Into<String>, script: Script) {
        lock(&self.state).routes.insert(url.into(), script);
    }

    /// Make the next `open` fail as if the engine could not initialize.
    pub fn fail_next_open(&self) {
        lock(&self.state).fail_next_open = true;
    }

    /// Run `hook` at the start of every `open`, while the pool is admitting.
    pub fn on_open(&self, hook: impl Fn(&Task) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Arc::new(hook));
    }

    /// Number of `open` calls, failed ones included.
    pub fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    /// Number of sessions closed; a session closed twice counts once.
    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    /// Ids of the tasks passed to `open`, in call order.
    pub fn open_log(&self) -> Vec<Uuid> {
        lock(&self.state).open_log.clone()
    }

    /// URLs of finished transfers, in completion order.
    pub fn finish_log(&self) -> Vec<String> {
        lock(&self.state).finish_log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, task: &Task) -> Result<Box<dyn Session>> {
        let hook = lock(&self.hook).clone();
        if let Some(hook) = hook {
            hook(task);
        }

        let mut state = lock(&self.state);
        state.opens += 1;
        state.open_log.push(task.id());
        if std::mem::take(&mut state.fail_next_open) {
            return Err(SinetError::TransportInit("scripted engine refused to open".to_string()));
        }

        let transfers = task
            .requests()
            .into_iter()
            .map(|request| {
                let url = request.url();
                ScriptedTransfer {
                    script: state.routes.get(&url).cloned(),
                    sink: ResponseSink::new(request),
                    url,
                    step: 0,
                    next_chunk: 0,
                    started: false,
                }
            })
            .collect();

        Ok(Box::new(ScriptedSession {
            state: Arc::clone(&self.state),
            transfers,
            closed: false,
        }))
    }
}

struct ScriptedTransfer {
    sink: ResponseSink,
    url: String,
    script: Option<Script>,
    step: usize,
    next_chunk: usize,
    started: bool,
}

impl ScriptedTransfer {
    /// One step. Returns `true` when this step finished the transfer.
    fn advance(&mut self) -> bool {
        if self.sink.is_finished() {
            return false;
        }
        let Some(script) = &self.script else {
            self.sink.finish(ERR_CONNECT);
            return true;
        };
        if !self.started {
            self.started = true;
            self.sink.headers(script.status, script.headers.clone());
        }

        self.step += 1;
        if let Some(chunk) = script.chunks.get(self.next_chunk) {
            self.sink.write(chunk);
            self.next_chunk += 1;
        }
        if self.step < script.steps {
            return false;
        }
        for chunk in &script.chunks[self.next_chunk..] {
            self.sink.write(chunk);
        }
        self.next_chunk = script.chunks.len();
        self.sink.finish(script.error);
        true
    }
}

struct ScriptedSession {
    state: Arc<Mutex<ScriptedState>>,
    transfers: Vec<ScriptedTransfer>,
    closed: bool,
}

impl Session for ScriptedSession {
    fn pump(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        let mut active = 0;
        for transfer in &mut self.transfers {
            if transfer.advance() {
                lock(&self.state).finish_log.push(transfer.url.clone());
            }
            if !transfer.sink.is_finished() {
                active += 1;
            }
        }
        active
    }

    fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        lock(&self.state).closes += 1;
    }
}
