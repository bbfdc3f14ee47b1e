//! One network operation: its input and the response it accumulates.
//!
//! # Design
//! `Request` is a cheap shared handle. The caller fills in the input side
//! before submitting the owning task; once the task is admitted, only the
//! transport touches the response side, and only through a `ResponseSink`
//! bound to that request. The sink is what replaces a process-wide write
//! callback: each transfer owns the sink for exactly its own request.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;

use crate::error::{ERR_IO, ERR_OK};
use crate::http::{Headers, Method};
use crate::lock;
use crate::postdata::PostData;

/// Where streamed response bytes go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Accumulate in the request's response buffer.
    #[default]
    Buffer,
    /// Write to a file, created or truncated when the response starts.
    File(PathBuf),
}

#[derive(Debug, Default)]
struct RequestState {
    method: Option<Method>,
    url: String,
    headers: Headers,
    postdata: Option<PostData>,
    output: OutputMode,
    response_headers: Headers,
    response_status: u16,
    response_buffer: Vec<u8>,
    response_size: usize,
    response_errcode: i32,
}

/// Shared handle to a request. Equality is identity.
#[derive(Debug, Clone, Default)]
pub struct Request {
    inner: Arc<Mutex<RequestState>>,
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Request {}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(url: impl Into<String>) -> Self {
        let request = Self::new();
        request.set_url(url);
        request
    }

    pub fn set_method(&self, method: Method) {
        lock(&self.inner).method = Some(method);
    }

    /// The method that will be sent: the explicit one, otherwise `POST` when
    /// post data is attached and `GET` when it is not.
    pub fn method(&self) -> Method {
        let state = lock(&self.inner);
        match (state.method, &state.postdata) {
            (Some(method), _) => method,
            (None, Some(_)) => Method::Post,
            (None, None) => Method::Get,
        }
    }

    pub fn set_url(&self, url: impl Into<String>) {
        lock(&self.inner).url = url.into();
    }

    pub fn url(&self) -> String {
        lock(&self.inner).url.clone()
    }

    pub fn set_header(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.inner).headers.insert(key.into(), value.into());
    }

    pub fn set_headers(&self, headers: Headers) {
        lock(&self.inner).headers = headers;
    }

    pub fn headers(&self) -> Headers {
        lock(&self.inner).headers.clone()
    }

    pub fn set_postdata(&self, postdata: Option<PostData>) {
        lock(&self.inner).postdata = postdata;
    }

    pub fn postdata(&self) -> Option<PostData> {
        lock(&self.inner).postdata.clone()
    }

    pub fn set_output(&self, output: OutputMode) {
        lock(&self.inner).output = output;
    }

    pub fn output(&self) -> OutputMode {
        lock(&self.inner).output.clone()
    }

    pub fn set_response_headers(&self, headers: Headers) {
        lock(&self.inner).response_headers = headers;
    }

    pub fn response_headers(&self) -> Headers {
        lock(&self.inner).response_headers.clone()
    }

    /// HTTP status of the response, 0 until the head has arrived.
    pub fn response_status(&self) -> u16 {
        lock(&self.inner).response_status
    }

    pub fn set_response_buffer(&self, buffer: Vec<u8>) {
        let mut state = lock(&self.inner);
        state.response_size = buffer.len();
        state.response_buffer = buffer;
    }

    pub fn response_buffer(&self) -> Vec<u8> {
        lock(&self.inner).response_buffer.clone()
    }

    /// Bytes received so far, whichever `OutputMode` is in effect.
    pub fn response_size(&self) -> usize {
        lock(&self.inner).response_size
    }

    pub fn set_response_errcode(&self, code: i32) {
        lock(&self.inner).response_errcode = code;
    }

    pub fn response_errcode(&self) -> i32 {
        lock(&self.inner).response_errcode
    }

    pub fn response_text(&self) -> String {
        String::from_utf8_lossy(&lock(&self.inner).response_buffer).into_owned()
    }

    pub fn response_json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&lock(&self.inner).response_buffer)
    }

    /// Clear every response field so the request can run again.
    pub fn reset_response(&self) {
        let mut state = lock(&self.inner);
        state.response_headers.clear();
        state.response_status = 0;
        state.response_buffer.clear();
        state.response_size = 0;
        state.response_errcode = ERR_OK;
    }
}

/// Where a sink puts bytes. A file target is created on first use, so
/// building a sink never touches the disk.
#[derive(Debug)]
enum Destination {
    Buffer,
    Pending(PathBuf),
    File(File),
    Failed,
}

/// Streaming destination for one request's response.
///
/// Creating a sink starts a fresh response on its request. Bytes are applied
/// as they arrive; `finish` records the outcome once and later calls are
/// ignored.
#[derive(Debug)]
pub struct ResponseSink {
    request: Request,
    dest: Destination,
    finished: bool,
}

impl ResponseSink {
    pub fn new(request: Request) -> Self {
        request.reset_response();
        let dest = match request.output() {
            OutputMode::Buffer => Destination::Buffer,
            OutputMode::File(path) => Destination::Pending(path),
        };
        Self {
            request,
            dest,
            finished: false,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    fn open_pending(&mut self) {
        if !matches!(self.dest, Destination::Pending(_)) {
            return;
        }
        if let Destination::Pending(path) = std::mem::replace(&mut self.dest, Destination::Failed) {
            match File::create(&path) {
                Ok(file) => self.dest = Destination::File(file),
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "cannot create output file");
                }
            }
        }
    }

    pub fn headers(&mut self, status: u16, headers: Headers) {
        if self.finished {
            return;
        }
        self.open_pending();
        let mut state = lock(&self.request.inner);
        state.response_status = status;
        state.response_headers = headers;
    }

    /// Append a chunk. Returns the number of bytes accepted.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if self.finished {
            return 0;
        }
        self.open_pending();
        let written = match &mut self.dest {
            Destination::Buffer => {
                let mut state = lock(&self.request.inner);
                state.response_buffer.extend_from_slice(bytes);
                state.response_size += bytes.len();
                return bytes.len();
            }
            Destination::File(file) => file.write_all(bytes).is_ok(),
            Destination::Pending(_) | Destination::Failed => return 0,
        };
        if !written {
            self.dest = Destination::Failed;
            return 0;
        }
        lock(&self.request.inner).response_size += bytes.len();
        bytes.len()
    }

    /// Record the final error code. A clean finish after a failed write to
    /// the output file is reported as `ERR_IO`.
    pub fn finish(&mut self, code: i32) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.open_pending();
        let io_failed = match std::mem::replace(&mut self.dest, Destination::Failed) {
            Destination::File(mut file) => file.flush().is_err(),
            Destination::Failed => true,
            Destination::Buffer | Destination::Pending(_) => false,
        };
        let code = if code == ERR_OK && io_failed { ERR_IO } else { code };
        self.request.set_response_errcode(code);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
