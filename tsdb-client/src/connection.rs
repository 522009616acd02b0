//! # Connection
//!
//! Purpose: Own one TCP link to the server and drive its request pipeline
//! from a dedicated tokio task.
//!
//! ## Design Principles
//! 1. **Actor per Link**: One task owns the socket halves; callers never
//!    touch the socket directly.
//! 2. **Short Critical Sections**: The pipeline lock is held only for the
//!    synchronous enqueue/decode/dispatch steps, never across an `.await`.
//! 3. **Report, Don't Recover**: A dying link rejects its in-flight request
//!    and hands itself to the disconnect hook; redistribution is the owner's job.
//!
//! ## Structure Overview
//!
//! ```text
//! Connection (cloneable handle)
//!   └── inner: Arc<ConnectionInner>
//!         ├── state: Mutex<Pipeline>        <- submit / drain / close
//!         ├── outbound: mpsc::UnboundedSender<Bytes>
//!         └── task: run() ── TcpStream (read half + write half)
//! ```

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use tsdb_common::{Batch, Command};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::pipeline::{ConnectionEvent, PendingRequest, Pipeline, Step};
use crate::response::{Responder, ResponseFuture};

/// Read chunk reserved before each socket read.
const READ_CHUNK: usize = 8 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Called once, from the link's task, when the link dies with work queued.
pub(crate) type DisconnectHook = Arc<dyn Fn(Connection) + Send + Sync>;

struct ConnectionInner {
    id: u64,
    config: ClientConfig,
    state: Mutex<Pipeline>,
    outbound: mpsc::UnboundedSender<Bytes>,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
    on_disconnect: DisconnectHook,
}

/// Handle to one pipelined link.
///
/// Cloning the handle shares the link. The link lives until [`Connection::close`]
/// is called or the transport fails.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.config.addr())
            .field("pending", &self.pending_count())
            .field("dead", &self.is_dead())
            .finish()
    }
}

impl Connection {
    /// Opens a standalone link. Must be called inside a tokio runtime.
    ///
    /// Commands submitted before the transport connects are queued. If the
    /// link dies, queued commands are rejected with `ClientError::Disconnected`
    /// since there is no sibling to migrate them to.
    pub fn open(config: ClientConfig) -> Connection {
        let hook: DisconnectHook = Arc::new(|dead: Connection| {
            for request in dead.take_queued() {
                request.reject(ClientError::Disconnected);
            }
        });
        Connection::open_with_hook(config, hook)
    }

    pub(crate) fn open_with_hook(
        config: ClientConfig,
        on_disconnect: DisconnectHook,
    ) -> Connection {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ConnectionInner {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(Pipeline::new(config.max_frame_len)),
            config,
            outbound,
            shutdown: Notify::new(),
            task: Mutex::new(None),
            on_disconnect,
        });
        let task = tokio::spawn(run(inner.clone(), outbound_rx));
        *inner.task.lock() = Some(task);
        Connection { inner }
    }

    /// Process-unique link id, used in logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Requests written or waiting to be written on this link.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending_count()
    }

    /// True once the transport failed or the link was closed.
    pub fn is_dead(&self) -> bool {
        self.inner.state.lock().is_dead()
    }

    /// True once the transport has connected.
    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().is_initialized()
    }

    /// Queues one command and returns a future for its reply.
    pub fn submit(&self, command: Command) -> ResponseFuture {
        let (responder, future) = Responder::channel();
        self.enqueue_or_reject(vec![PendingRequest::new(command, responder)]);
        future
    }

    /// Queues every line of `batch` contiguously; the future resolves with the
    /// reply to the sentinel line.
    pub fn submit_batch(&self, batch: Batch) -> ResponseFuture {
        let (responder, future) = Responder::channel();
        self.enqueue_or_reject(PendingRequest::batch(batch.into_lines(), responder));
        future
    }

    /// Moves every queued (unwritten) request onto `target`, preserving order.
    ///
    /// Returns the number of requests moved. When `target` is dead the
    /// requests stay here and 0 is returned.
    pub fn drain_into(&self, target: &Connection) -> usize {
        let moved = self.take_queued();
        let count = moved.len();
        if count == 0 {
            return 0;
        }
        match target.enqueue(moved) {
            Ok(()) => {
                debug!(from = self.id(), to = target.id(), count, "drained queue");
                count
            }
            Err(back) => {
                let mut state = self.inner.state.lock();
                if let Some(bytes) = state.restore(back) {
                    let _ = self.inner.outbound.send(bytes);
                }
                0
            }
        }
    }

    /// Closes the link, rejecting everything outstanding with
    /// `ClientError::Closed`, and waits for its task to finish.
    pub async fn close(&self) {
        let rejected = self.inner.state.lock().close();
        if rejected > 0 {
            debug!(conn = self.id(), rejected, "closing with requests outstanding");
        }
        self.inner.shutdown.notify_one();
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(conn = self.id(), error = %err, "connection task ended abnormally");
            }
        }
    }

    /// Appends requests to this link, or hands them back if it is dead.
    pub(crate) fn enqueue(&self, requests: Vec<PendingRequest>) -> Result<(), Vec<PendingRequest>> {
        let mut state = self.inner.state.lock();
        if let Some(bytes) = state.submit(requests)? {
            // The task holds the receiver for as long as the pipeline is alive.
            let _ = self.inner.outbound.send(bytes);
        }
        Ok(())
    }

    pub(crate) fn take_queued(&self) -> Vec<PendingRequest> {
        self.inner.state.lock().take_queued()
    }

    fn enqueue_or_reject(&self, requests: Vec<PendingRequest>) {
        if let Err(rejected) = self.enqueue(requests) {
            for request in rejected {
                request.reject(ClientError::Disconnected);
            }
        }
    }
}

impl ConnectionInner {
    fn apply(&self, event: ConnectionEvent) -> Step {
        self.state.lock().handle(event)
    }
}

fn report_dead(inner: &Arc<ConnectionInner>) {
    let pending = inner.state.lock().pending_count();
    warn!(conn = inner.id, addr = %inner.config.addr(), pending, "connection lost");
    (inner.on_disconnect)(Connection {
        inner: inner.clone(),
    });
}

async fn connect(config: &ClientConfig) -> io::Result<TcpStream> {
    let addr = config.addr();
    let stream = match config.connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
        None => TcpStream::connect(&addr).await?,
    };
    if config.nodelay {
        stream.set_nodelay(true)?;
    }
    Ok(stream)
}

async fn write_all(writer: &mut OwnedWriteHalf, writes: &[Bytes]) -> io::Result<()> {
    for bytes in writes {
        writer.write_all(bytes).await?;
    }
    Ok(())
}

/// Link task: connect, then pump socket reads and queued writes through the
/// pipeline until the link dies or is closed.
async fn run(inner: Arc<ConnectionInner>, mut outbound: mpsc::UnboundedReceiver<Bytes>) {
    let connected = tokio::select! {
        _ = inner.shutdown.notified() => return,
        result = connect(&inner.config) => result,
    };

    let stream = match connected {
        Ok(stream) => stream,
        Err(err) => {
            warn!(conn = inner.id, addr = %inner.config.addr(), error = %err, "connect failed");
            if inner.apply(ConnectionEvent::Error(err)) == Step::Failed {
                // Bound the replacement rate while the server is unreachable.
                tokio::select! {
                    _ = inner.shutdown.notified() => return,
                    _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
                }
                report_dead(&inner);
            }
            return;
        }
    };

    debug!(conn = inner.id, addr = %inner.config.addr(), "connected");
    let (mut reader, mut writer) = stream.into_split();
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);
    let mut step = inner.apply(ConnectionEvent::Connected);

    loop {
        match step {
            Step::Continue(writes) => {
                if let Err(err) = write_all(&mut writer, &writes).await {
                    step = inner.apply(ConnectionEvent::Error(err));
                    continue;
                }
            }
            Step::Failed => {
                report_dead(&inner);
                return;
            }
            Step::Stopped => break,
        }

        read_buf.reserve(READ_CHUNK);
        let event = tokio::select! {
            _ = inner.shutdown.notified() => break,
            Some(bytes) = outbound.recv() => {
                trace!(conn = inner.id, len = bytes.len(), "write");
                step = Step::Continue(vec![bytes]);
                continue;
            }
            result = reader.read_buf(&mut read_buf) => match result {
                Ok(0) => ConnectionEvent::Closed,
                Ok(_) => ConnectionEvent::DataReceived(read_buf.split().freeze()),
                Err(err) => ConnectionEvent::Error(err),
            },
        };
        step = inner.apply(event);
    }

    if let Err(err) = writer.shutdown().await {
        trace!(conn = inner.id, error = %err, "shutdown after close");
    }
    debug!(conn = inner.id, "closed");
}
