//! HTTP engine built on `ureq`.
//!
//! # Design
//! `ureq` is blocking, so every request of an admitted task gets its own
//! transfer thread that encodes the body, performs the round-trip and
//! streams what it reads over a channel. The session is the multiplexing
//! handle: `pump` drains every channel without waiting and applies the
//! events to the request's sink on the coordinator thread, so request fields
//! are only ever written from one place.
//!
//! Each transfer runs on its own agent whose connections are wrapped in
//! `CancelTransport`. Socket waits are cut into `CANCEL_POLL` slices and the
//! cancel flag is checked between them, so `close` ends a transfer within
//! one slice even when the peer never answers. Connecting is bounded by the
//! connect timeout. The transport keeps every thread handle and joins them
//! when it is dropped.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use ureq::unversioned::resolver::DefaultResolver;
use ureq::unversioned::transport::time::Duration as WireDuration;
use ureq::unversioned::transport::{
    Buffers, ConnectionDetails, Connector, DefaultConnector, NextTimeout,
    Transport as WireTransport,
};

use crate::config::{Config, CFG_STR_AGENT, CFG_STR_PROXY, CFG_STR_TIMEOUT_SECS};
use crate::error::{
    Result, SinetError, ERR_BODY, ERR_CONNECT, ERR_DNS, ERR_HTTP, ERR_IO, ERR_OK, ERR_TIMEOUT,
    ERR_TLS, ERR_TRANSPORT, ERR_URL,
};
use crate::http::Headers;
use crate::lock;
use crate::request::{Request, ResponseSink};
use crate::task::Task;
use crate::transport::{Session, Transport};

const CHUNK_SIZE: usize = 16 * 1024;
/// Longest a transfer thread blocks on a socket before rechecking its
/// cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(50);
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Engine-level settings for `HttpTransport`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-transfer timeout. `None` leaves transfers unbounded.
    pub timeout_secs: Option<u64>,
    /// Connect timeout, 30 seconds when unset.
    pub connect_timeout_secs: Option<u64>,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

impl HttpConfig {
    /// Pick the known variables out of a string store.
    pub fn from_config(config: &Config) -> Self {
        let non_empty = |id| {
            config
                .get_strvar(id)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            timeout_secs: non_empty(CFG_STR_TIMEOUT_SECS).and_then(|v| v.parse().ok()),
            connect_timeout_secs: None,
            proxy: non_empty(CFG_STR_PROXY),
            user_agent: non_empty(CFG_STR_AGENT),
        }
    }
}

/// Handles of every transfer thread this transport started.
#[derive(Debug, Default)]
struct TransferThreads {
    live: AtomicUsize,
    handles: Mutex<Vec<(JoinHandle<()>, Arc<AtomicBool>)>>,
}

impl TransferThreads {
    fn track(&self, handle: JoinHandle<()>, cancel: Arc<AtomicBool>) {
        let mut handles = lock(&self.handles);
        handles.retain(|(handle, _)| !handle.is_finished());
        handles.push((handle, cancel));
    }

    /// Cancel every transfer still running, then wait for all of them.
    fn join_all(&self) {
        let handles = std::mem::take(&mut *lock(&self.handles));
        for (_, cancel) in &handles {
            cancel.store(true, Ordering::Release);
        }
        for (handle, _) in handles {
            if handle.join().is_err() {
                tracing::warn!("transfer thread panicked");
            }
        }
    }
}

/// Counts a transfer thread as live until the thread drops it.
struct Live(Arc<TransferThreads>);

impl Live {
    fn new(threads: &Arc<TransferThreads>) -> Self {
        threads.live.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(threads))
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Real network engine.
pub struct HttpTransport {
    config: ureq::config::Config,
    user_agent: Option<String>,
    threads: Arc<TransferThreads>,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let proxy = match config.proxy.as_deref() {
            Some(url) => Some(
                ureq::Proxy::new(url).map_err(|e| SinetError::TransportInit(e.to_string()))?,
            ),
            None => None,
        };
        let connect_secs = config
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        let wire = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout_secs.map(Duration::from_secs))
            .timeout_connect(Some(Duration::from_secs(connect_secs)))
            .proxy(proxy)
            .build();
        Ok(Self {
            config: wire,
            user_agent: config.user_agent,
            threads: Arc::default(),
        })
    }

    /// Transfer threads that have not exited yet.
    pub fn live_transfers(&self) -> usize {
        self.threads.live.load(Ordering::Acquire)
    }

    fn agent_for(&self, cancel: &Arc<AtomicBool>) -> ureq::Agent {
        let connector = DefaultConnector::new().chain(CancelConnector {
            cancel: Arc::clone(cancel),
        });
        ureq::Agent::with_parts(self.config.clone(), connector, DefaultResolver::default())
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.threads.join_all();
    }
}

/// Turn a request into its wire form, or the error code explaining why that
/// is impossible. Runs on the transfer thread, so reading file parts of the
/// body never holds up the pool.
fn prepare(
    user_agent: Option<&str>,
    request: &Request,
) -> Result<ureq::http::Request<Option<Vec<u8>>>, i32> {
    let headers = request.headers();
    let mut builder = ureq::http::Request::builder()
        .method(request.method().as_str())
        .uri(request.url());
    if let Some(agent) = user_agent {
        if !has_header(&headers, "user-agent") {
            builder = builder.header("user-agent", agent);
        }
    }
    let body = match request.postdata() {
        Some(postdata) => {
            let body = postdata.encode().map_err(|_| ERR_BODY)?;
            if let Some(content_type) = &body.content_type {
                if !has_header(&headers, "content-type") {
                    builder = builder.header("content-type", content_type.as_str());
                }
            }
            Some(body.bytes)
        }
        None => None,
    };
    for (key, value) in &headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder.body(body).map_err(|_| ERR_URL)
}

impl Transport for HttpTransport {
    fn open(&self, task: &Task) -> Result<Box<dyn Session>> {
        let mut session = HttpSession {
            transfers: Vec::new(),
            closed: false,
        };
        for request in task.requests() {
            let sink = ResponseSink::new(request.clone());
            let (events, receiver) = mpsc::channel();
            let cancel = Arc::new(AtomicBool::new(false));
            let agent = self.agent_for(&cancel);
            let user_agent = self.user_agent.clone();
            let flag = Arc::clone(&cancel);
            let live = Live::new(&self.threads);
            let spawned = thread::Builder::new()
                .name(format!("sinet-transfer-{}", task.id().simple()))
                .spawn(move || {
                    let _live = live;
                    let code = match prepare(user_agent.as_deref(), &request) {
                        Ok(prepared) => perform(&agent, prepared, &events, &flag),
                        Err(code) => code,
                    };
                    let _ = events.send(Event::Done(code));
                });
            let handle = match spawned {
                Ok(handle) => handle,
                Err(err) => {
                    session.close();
                    return Err(SinetError::TransportInit(err.to_string()));
                }
            };
            self.threads.track(handle, Arc::clone(&cancel));
            session.transfers.push(Transfer {
                sink,
                events: Some(receiver),
                cancel,
            });
        }
        Ok(Box::new(session))
    }
}

/// Last link of each transfer's connector chain. Wraps whatever the default
/// chain produced (plain TCP or TLS) in a `CancelTransport`.
#[derive(Debug)]
struct CancelConnector {
    cancel: Arc<AtomicBool>,
}

impl Connector<Box<dyn WireTransport>> for CancelConnector {
    type Out = CancelTransport;

    fn connect(
        &self,
        _details: &ConnectionDetails,
        chained: Option<Box<dyn WireTransport>>,
    ) -> std::result::Result<Option<Self::Out>, ureq::Error> {
        Ok(chained.map(|inner| CancelTransport {
            inner,
            cancel: Arc::clone(&self.cancel),
        }))
    }
}

#[derive(Debug)]
struct CancelTransport {
    inner: Box<dyn WireTransport>,
    cancel: Arc<AtomicBool>,
}

impl CancelTransport {
    fn check(&self) -> std::result::Result<(), ureq::Error> {
        if self.cancel.load(Ordering::Acquire) {
            return Err(ureq::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "transfer canceled",
            )));
        }
        Ok(())
    }
}

impl WireTransport for CancelTransport {
    fn buffers(&mut self) -> &mut dyn Buffers {
        self.inner.buffers()
    }

    // A write cannot be split without resending, so it is only gated.
    fn transmit_output(
        &mut self,
        amount: usize,
        timeout: NextTimeout,
    ) -> std::result::Result<(), ureq::Error> {
        self.check()?;
        self.inner.transmit_output(amount, timeout)
    }

    fn await_input(&mut self, timeout: NextTimeout) -> std::result::Result<bool, ureq::Error> {
        let deadline = Instant::now().checked_add(*timeout.after);
        loop {
            self.check()?;
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Err(ureq::Error::Timeout(timeout.reason));
            }
            let slice = remaining.map_or(CANCEL_POLL, |r| r.min(CANCEL_POLL));
            let sliced = NextTimeout {
                after: WireDuration::Exact(slice),
                reason: timeout.reason,
            };
            match self.inner.await_input(sliced) {
                Err(err) if is_timeout(&err) && remaining.map_or(true, |r| r > slice) => continue,
                other => return other,
            }
        }
    }

    fn is_open(&mut self) -> bool {
        self.inner.is_open()
    }

    fn is_tls(&self) -> bool {
        self.inner.is_tls()
    }
}

fn is_timeout(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Timeout(_) => true,
        ureq::Error::Io(io) => matches!(
            io.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        ),
        _ => false,
    }
}

enum Event {
    Head(u16, Headers),
    Data(Vec<u8>),
    Done(i32),
}

struct Transfer {
    sink: ResponseSink,
    events: Option<Receiver<Event>>,
    cancel: Arc<AtomicBool>,
}

impl Transfer {
    /// Apply every event that has already arrived.
    fn drain(&mut self) {
        let Some(events) = &self.events else {
            return;
        };
        loop {
            match events.try_recv() {
                Ok(Event::Head(status, headers)) => self.sink.headers(status, headers),
                Ok(Event::Data(bytes)) => {
                    self.sink.write(&bytes);
                }
                Ok(Event::Done(code)) => {
                    self.sink.finish(code);
                    break;
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.sink.finish(ERR_TRANSPORT);
                    break;
                }
            }
        }
        self.events = None;
    }

    fn stop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.events = None;
    }
}

struct HttpSession {
    transfers: Vec<Transfer>,
    closed: bool,
}

impl Session for HttpSession {
    fn pump(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.transfers
            .iter_mut()
            .map(|transfer| {
                transfer.drain();
                usize::from(!transfer.sink.is_finished())
            })
            .sum()
    }

    fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        for transfer in &mut self.transfers {
            transfer.stop();
        }
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Body of a transfer thread. Returns the code to finish the request with.
fn perform(
    agent: &ureq::Agent,
    request: ureq::http::Request<Option<Vec<u8>>>,
    events: &Sender<Event>,
    cancel: &AtomicBool,
) -> i32 {
    let (parts, body) = request.into_parts();
    let result = match body {
        Some(bytes) => agent.run(ureq::http::Request::from_parts(parts, bytes)),
        None => agent.run(ureq::http::Request::from_parts(parts, ())),
    };
    let response = match result {
        Ok(response) => response,
        Err(err) => return error_code(&err),
    };

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(key, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (key.as_str().to_string(), value.to_string()))
        })
        .collect();
    if events.send(Event::Head(status, headers)).is_err() {
        return ERR_OK;
    }

    let mut reader = response.into_body().into_reader();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.load(Ordering::Acquire) {
            return ERR_OK;
        }
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if events.send(Event::Data(chunk[..n].to_vec())).is_err() {
                    return ERR_OK;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return ERR_IO,
        }
    }
    if status >= 400 {
        ERR_HTTP
    } else {
        ERR_OK
    }
}

fn error_code(err: &ureq::Error) -> i32 {
    match err {
        ureq::Error::BadUri(_) => ERR_URL,
        ureq::Error::HostNotFound => ERR_DNS,
        ureq::Error::ConnectionFailed => ERR_CONNECT,
        ureq::Error::Timeout(_) => ERR_TIMEOUT,
        ureq::Error::Tls(_) => ERR_TLS,
        ureq::Error::Io(io) => match io.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => ERR_CONNECT,
            io::ErrorKind::TimedOut => ERR_TIMEOUT,
            _ => ERR_IO,
        },
        _ => ERR_TRANSPORT,
    }
}

fn has_header(headers: &Headers, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}
