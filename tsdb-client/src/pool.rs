//! # Connection Pool
//!
//! Purpose: Spread requests across a fixed set of pipelined links and keep
//! queued work alive when a link dies.
//!
//! ## Design Principles
//! 1. **Fixed Width**: Dead links are replaced in their slot, never removed,
//!    so there are always `pool_size` candidates.
//! 2. **Least-Loaded Routing**: Each request goes to the link with the fewest
//!    outstanding requests; ties go to the lowest slot.
//! 3. **Transparent Failover**: A dead link's queued requests are appended to
//!    the best live link in their original order.
//! 4. **Minimal Locking**: The slot lock is held only to pick or swap links.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info};

use tsdb_common::{Batch, Command};

use crate::config::ClientConfig;
use crate::connection::{Connection, DisconnectHook};
use crate::error::ClientError;
use crate::pipeline::PendingRequest;
use crate::response::{Responder, ResponseFuture};

/// Requests between two load summaries in the debug log.
const LOAD_LOG_INTERVAL: u64 = 100;

/// Returns the index of the first smallest count.
///
/// An empty slice yields 0.
pub fn select_least_loaded(counts: &[usize]) -> usize {
    let mut best = 0;
    for (idx, &count) in counts.iter().enumerate() {
        if count < counts[best] {
            best = idx;
        }
    }
    best
}

struct PoolInner {
    config: ClientConfig,
    slots: RwLock<Vec<Connection>>,
    requests: AtomicU64,
    closing: AtomicBool,
    me: Weak<PoolInner>,
}

/// Load-balancing pool of pipelined links.
///
/// Cloning the handle shares the pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Opens `config.pool_size` links. Must be called inside a tokio runtime.
    ///
    /// Links connect in the background; commands submitted meanwhile queue.
    pub fn new(config: ClientConfig) -> Pool {
        let width = config.effective_pool_size();
        let inner = Arc::new_cyclic(|me| PoolInner {
            config,
            slots: RwLock::new(Vec::with_capacity(width)),
            requests: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            me: me.clone(),
        });
        {
            // Hold the write lock so an early disconnect waits for a full pool.
            let mut slots = inner.slots.write();
            for _ in 0..width {
                slots.push(inner.spawn_connection());
            }
        }
        debug!(addr = %inner.config.addr(), width, "pool opened");
        Pool { inner }
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.inner.slots.read().len()
    }

    /// Outstanding requests per slot, in slot order.
    pub fn pending_counts(&self) -> Vec<usize> {
        self.inner
            .slots
            .read()
            .iter()
            .map(Connection::pending_count)
            .collect()
    }

    /// Snapshot of the current links, in slot order.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.slots.read().clone()
    }

    /// The least-loaded link right now.
    pub fn best_socket(&self) -> Connection {
        self.inner.best_socket()
    }

    /// Routes one command to the least-loaded link.
    pub fn submit(&self, command: Command) -> ResponseFuture {
        let (responder, future) = Responder::channel();
        self.inner.route(vec![PendingRequest::new(command, responder)]);
        future
    }

    /// Routes a whole batch, contiguously, to the least-loaded link.
    pub fn submit_batch(&self, batch: Batch) -> ResponseFuture {
        let (responder, future) = Responder::channel();
        self.inner
            .route(PendingRequest::batch(batch.into_lines(), responder));
        future
    }

    /// Closes every link and waits for their tasks to finish.
    ///
    /// Outstanding and later requests are rejected with `ClientError::Closed`.
    pub async fn exit(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        let connections = self.inner.slots.read().clone();
        for connection in &connections {
            connection.close().await;
        }
        debug!(addr = %self.inner.config.addr(), "pool closed");
    }
}

impl PoolInner {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn spawn_connection(&self) -> Connection {
        let pool = self.me.clone();
        let hook: DisconnectHook = Arc::new(move |dead: Connection| match pool.upgrade() {
            Some(pool) => pool.on_disconnect(dead),
            None => reject_all(dead.take_queued(), || ClientError::Disconnected),
        });
        Connection::open_with_hook(self.config.clone(), hook)
    }

    fn best_socket(&self) -> Connection {
        let slots = self.slots.read();
        let counts: Vec<usize> = slots.iter().map(Connection::pending_count).collect();
        slots[select_least_loaded(&counts)].clone()
    }

    fn route(&self, mut requests: Vec<PendingRequest>) {
        self.record_request();
        loop {
            if self.is_closing() {
                reject_all(requests, || ClientError::Closed);
                return;
            }
            match self.best_socket().enqueue(requests) {
                Ok(()) => return,
                Err(back) => {
                    // Picked a link whose death is not yet handled.
                    requests = back;
                    self.replace_dead();
                }
            }
        }
    }

    /// Swaps every dead link for a fresh one in the same slot.
    fn replace_dead(&self) -> usize {
        let mut slots = self.slots.write();
        if self.is_closing() {
            return 0;
        }
        let mut replaced = 0;
        for slot in slots.iter_mut() {
            if slot.is_dead() {
                *slot = self.spawn_connection();
                replaced += 1;
            }
        }
        replaced
    }

    fn on_disconnect(&self, dead: Connection) {
        let replaced = self.replace_dead();
        let orphaned = dead.pending_count();
        info!(conn = dead.id(), replaced, orphaned, "link lost; migrating queued requests");

        while dead.pending_count() > 0 {
            if self.is_closing() {
                reject_all(dead.take_queued(), || ClientError::Closed);
                return;
            }
            let target = self.best_socket();
            if dead.drain_into(&target) == 0 {
                self.replace_dead();
            }
        }
    }

    fn record_request(&self) {
        let count = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        if count % LOAD_LOG_INTERVAL == 0 {
            let slots = self.slots.read();
            let outstanding: usize = slots.iter().map(Connection::pending_count).sum();
            debug!(requests = count, outstanding, "pool load");
        }
    }
}

fn reject_all(requests: Vec<PendingRequest>, err: impl Fn() -> ClientError) {
    for request in requests {
        request.reject(err());
    }
}
