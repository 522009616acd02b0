#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use tsdb_client::{ClientConfig, Frame};
use tsdb_common::encode_frame;

/// What the mock server does with one received line.
pub enum Action {
    /// Write the frame in one piece.
    Reply(Frame),
    /// Write the frame in `n`-byte pieces with a flush between each.
    Chunked(Frame, usize),
    /// Never answer.
    Silent,
    /// Close the connection without answering.
    Drop,
}

pub fn ok(payload: &str) -> Action {
    Action::Reply(Frame::new(true, payload.as_bytes().to_vec()))
}

pub fn echo(line: &str) -> Action {
    ok(line)
}

type Handler = Arc<dyn Fn(&str) -> Action + Send + Sync>;

pub struct MockServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    gate: watch::Sender<bool>,
}

impl MockServer {
    /// Server that answers immediately.
    pub async fn start(handler: impl Fn(&str) -> Action + Send + Sync + 'static) -> MockServer {
        let server = MockServer::gated(handler).await;
        server.open_gate();
        server
    }

    /// Server that holds every reply until `open_gate` is called.
    pub async fn gated(handler: impl Fn(&str) -> Action + Send + Sync + 'static) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let (gate, gate_rx) = watch::channel(false);
        let handler: Handler = Arc::new(handler);

        let task_received = received.clone();
        let task_accepted = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                task_accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    handler.clone(),
                    task_received.clone(),
                    gate_rx.clone(),
                ));
            }
        });

        MockServer {
            addr,
            received,
            accepted,
            gate,
        }
    }

    pub fn open_gate(&self) {
        let _ = self.gate.send(true);
    }

    pub fn config(&self, pool_size: usize) -> ClientConfig {
        let mut config = ClientConfig::new(self.addr.ip().to_string(), self.addr.port());
        config.pool_size = pool_size;
        config.reconnect_delay = Duration::from_millis(10);
        config.connect_timeout = Some(Duration::from_secs(2));
        config
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().expect("received lock").clone()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

async fn serve(
    stream: TcpStream,
    handler: Handler,
    received: Arc<Mutex<Vec<String>>>,
    mut gate: watch::Receiver<bool>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        received.lock().expect("received lock").push(line.clone());
        let action = handler(&line);
        if matches!(action, Action::Reply(_) | Action::Chunked(_, _))
            && gate.wait_for(|open| *open).await.is_err()
        {
            return;
        }
        match action {
            Action::Reply(frame) => {
                let mut out = BytesMut::new();
                encode_frame(&frame, &mut out);
                if writer.write_all(&out).await.is_err() {
                    return;
                }
            }
            Action::Chunked(frame, size) => {
                let mut out = BytesMut::new();
                encode_frame(&frame, &mut out);
                for piece in out.chunks(size.max(1)) {
                    if writer.write_all(piece).await.is_err() || writer.flush().await.is_err() {
                        return;
                    }
                    tokio::task::yield_now().await;
                }
            }
            Action::Silent => {}
            Action::Drop => return,
        }
    }
}

/// Address with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
