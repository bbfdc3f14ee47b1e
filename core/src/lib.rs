//! Asynchronous request pool.
//!
//! # Overview
//! Callers bundle one or more `Request`s into a `Task` and hand it to a
//! `Pool`. A single coordinator thread admits queued tasks one at a time,
//! drives their transfers through a `Transport` and moves them to a finished
//! list. `execute`, `cancel` and the status checks return immediately from
//! any thread; none of them waits on the network.
//!
//! # Design
//! - `Task` and `Request` are shared handles compared by identity, so the
//!   caller keeps a valid handle after the pool lets go of it.
//! - The pool's queue, running map and finished list are locked
//!   independently and always acquired in the order running → queue →
//!   finished.
//! - Transports only see the pool through `open` / `pump` / `close`; the
//!   response of each request streams in through its own `ResponseSink`.
//! - Transfer failures are integer codes on the request (`ERR_*`), not Rust
//!   errors: sibling requests are unaffected and the caller inspects each
//!   request once its task is terminal.

pub mod config;
pub mod error;
pub mod http;
pub mod pool;
pub mod postdata;
pub mod request;
pub mod task;
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::{Config, PoolConfig};
pub use error::{Result, SinetError};
pub use http::{Headers, Method};
pub use pool::{Pool, PoolStats, Tick};
pub use postdata::{Body, PostData, PostDataElem, PostDataElemType, PostDataValue};
pub use request::{OutputMode, Request, ResponseSink};
pub use task::{Task, TaskStatus};
pub use transport::http::{HttpConfig, HttpTransport};
pub use transport::scripted::{Script, ScriptedTransport};
pub use transport::{Session, Transport};

/// Lock `mutex`, recovering the data if a previous holder panicked. Every
/// critical section in this crate leaves its data consistent between
/// statements, so a poisoned lock carries nothing half-written.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
