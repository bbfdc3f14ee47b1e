//! Boundary between the pool and the engine that performs the I/O.
//!
//! # Design
//! The pool never looks inside a transfer. It opens one `Session` per
//! admitted task, pumps it from the coordinator thread until it reports no
//! active transfers, and closes it exactly once. Everything the engine
//! learns about a request goes through that request's `ResponseSink`.
//!
//! Two engines ship with the crate: [`http::HttpTransport`] performs real
//! HTTP through `ureq`, and [`scripted::ScriptedTransport`] replays canned
//! responses step by step for deterministic tests.

pub mod http;
pub mod scripted;

use std::sync::Arc;

use crate::error::Result;
use crate::task::Task;

/// Factory for sessions; shared between the pool and caller threads.
pub trait Transport: Send + Sync {
    /// Build the transfers for every request of `task`.
    ///
    /// Per-request problems (bad URL, unencodable body) are recorded on the
    /// request's sink and its transfer counts as already finished. `Err` is
    /// reserved for failures of the engine itself.
    fn open(&self, task: &Task) -> Result<Box<dyn Session>>;
}

/// Live transfers of one task, registered under one driving handle.
pub trait Session: Send {
    /// Advance every transfer by one non-blocking step and return how many
    /// are still active. Returns 0 once everything has finished.
    fn pump(&mut self) -> usize;

    /// Stop and release every transfer. Calling it again does nothing.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(&self, task: &Task) -> Result<Box<dyn Session>> {
        (**self).open(task)
    }
}
