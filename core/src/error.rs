//! Error types and per-request error codes.
//!
//! # Design
//! Only failures that prevent the pool itself from doing its job surface as
//! `SinetError`. A transfer that fails on the wire is not an error of the
//! pool: its outcome is an integer code recorded on the `Request`, so sibling
//! requests in the same task keep running and callers inspect each request
//! once the task is terminal.

use thiserror::Error;

pub type Result<T, E = SinetError> = std::result::Result<T, E>;

/// Errors raised by pool construction, transports and post-data encoding.
#[derive(Debug, Error)]
pub enum SinetError {
    /// The transport engine could not build the session for a task.
    #[error("transport initialization failed: {0}")]
    TransportInit(String),

    /// A method name that does not map to a known HTTP verb.
    #[error("unknown request method: {0}")]
    InvalidMethod(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transfer finished normally.
pub const ERR_OK: i32 = 0;
/// The transport engine failed to initialize for the owning task.
pub const ERR_INIT: i32 = 1;
/// The URL, method or a header could not be turned into a request.
pub const ERR_URL: i32 = 2;
pub const ERR_DNS: i32 = 3;
pub const ERR_CONNECT: i32 = 4;
pub const ERR_TLS: i32 = 5;
pub const ERR_TIMEOUT: i32 = 6;
/// The peer answered with a status of 400 or above.
pub const ERR_HTTP: i32 = 7;
/// Reading the response or writing it to its destination failed.
pub const ERR_IO: i32 = 8;
/// The post data could not be encoded into a request body.
pub const ERR_BODY: i32 = 9;
/// Any other engine failure.
pub const ERR_TRANSPORT: i32 = 10;
