mod common;

use std::time::Duration;

use common::{echo, eventually, init_tracing, ok, unused_addr, Action, MockServer};
use tsdb_client::{
    ClientConfig, ClientError, Commands, Connection, DbName, Frame, Response, Update,
};

fn sample() -> Update {
    Update {
        ts: 100,
        seq: 1,
        is_trade: true,
        is_bid: false,
        price: 5.0,
        size: 2.5,
    }
}

#[tokio::test]
async fn add_then_get_resolve_to_their_callers() {
    init_tracing();
    let server = MockServer::start(|line| {
        if line.starts_with("ADD ") {
            ok("OK")
        } else {
            ok(r#"[{"ts":0.1,"seq":1,"is_trade":true,"is_bid":false,"price":5,"size":2.5}]"#)
        }
    })
    .await;

    let conn = Connection::open(server.config(1));
    let added = conn.add(&sample());
    let fetched = conn.get(1);

    let fetched = fetched.await.expect("get");
    let added = added.await.expect("add");
    assert_eq!(
        added,
        Response {
            success: true,
            data: "OK".into()
        }
    );
    let rows: Vec<Update> = fetched.json().expect("json");
    assert_eq!(rows, vec![sample()]);

    assert_eq!(
        server.received(),
        vec!["ADD 100, 1, t, f, 5.0, 2.5;", "GET 1 AS JSON"]
    );
    conn.close().await;
}

#[tokio::test]
async fn one_byte_chunks_match_callers_in_order() {
    init_tracing();
    let server = MockServer::start(|line| {
        Action::Chunked(Frame::new(true, format!("{}\n\0", line).into_bytes()), 1)
    })
    .await;

    let conn = Connection::open(server.config(1));
    let futures: Vec<_> = (0..20).map(|idx| conn.get(idx)).collect();
    assert_eq!(conn.pending_count(), 20);

    for (idx, future) in futures.into_iter().enumerate() {
        let reply = future.await.expect("reply");
        assert_eq!(reply.data, format!("GET {} AS JSON\n\0", idx));
    }
    assert_eq!(conn.pending_count(), 0);
    conn.close().await;
}

#[tokio::test]
async fn failure_reply_is_a_normal_result() {
    let server = MockServer::start(|_| {
        Action::Reply(Frame::new(false, b"ERR: No db named missing".to_vec()))
    })
    .await;

    let conn = Connection::open(server.config(1));
    let db = DbName::new("missing").expect("name");
    let reply = conn.use_db(&db).await.expect("reply");
    assert!(!reply.success);
    assert_eq!(reply.data, "ERR: No db named missing");
    assert!(matches!(reply.json::<serde_json::Value>(), Err(ClientError::Server(_))));
    conn.close().await;
}

#[tokio::test]
async fn batch_resolves_with_sentinel_reply() {
    let server = MockServer::start(|line| {
        if line == "DDAKLUB" {
            ok("2")
        } else {
            echo(line)
        }
    })
    .await;

    let conn = Connection::open(server.config(1));
    let db = DbName::new("book").expect("name");
    let updates = [sample(), Update { seq: 2, ..sample() }];
    let batch = conn.bulk_add_into(&updates, &db);
    let after = conn.ping();

    assert_eq!(batch.await.expect("batch").data, "2");
    assert_eq!(after.await.expect("ping").data, "PING");
    assert_eq!(
        server.received(),
        vec![
            "BULKADD INTO book",
            "100, 1, t, f, 5.0, 2.5;",
            "100, 2, t, f, 5.0, 2.5;",
            "DDAKLUB",
            "PING",
        ]
    );
    conn.close().await;
}

#[tokio::test]
async fn peer_close_rejects_active_and_queued() {
    init_tracing();
    let server = MockServer::start(|line| {
        if line == "INFO" {
            Action::Drop
        } else {
            echo(line)
        }
    })
    .await;

    let conn = Connection::open(server.config(1));
    let info = conn.info();
    let ping = conn.ping();

    assert!(matches!(info.await, Err(ClientError::Transport(_))));
    assert!(matches!(ping.await, Err(ClientError::Disconnected)));
    assert!(conn.is_dead());
    assert!(matches!(conn.help().await, Err(ClientError::Disconnected)));
    assert_eq!(server.received(), vec!["INFO"]);
}

#[tokio::test]
async fn unreachable_server_fails_queued_requests() {
    let addr = unused_addr().await;
    let mut config = ClientConfig::new(addr.ip().to_string(), addr.port());
    config.reconnect_delay = Duration::from_millis(1);

    let conn = Connection::open(config);
    assert!(matches!(conn.ping().await, Err(ClientError::Disconnected)));
    assert!(!conn.is_initialized());
}

#[tokio::test]
async fn close_rejects_outstanding_requests() {
    let server = MockServer::start(|_| Action::Silent).await;

    let conn = Connection::open(server.config(1));
    let first = conn.ping();
    let second = conn.ping();
    assert!(eventually(|| server.received().len() == 1).await);

    conn.close().await;
    assert!(matches!(first.await, Err(ClientError::Closed)));
    assert!(matches!(second.await, Err(ClientError::Closed)));
    assert!(matches!(conn.ping().await, Err(ClientError::Disconnected)));
}

#[tokio::test]
async fn drain_moves_queue_in_order() {
    let server = MockServer::gated(echo).await;

    let source = Connection::open(server.config(1));
    let target = Connection::open(server.config(1));
    let held = source.info();
    let moved: Vec<_> = (0..3).map(|idx| source.get(idx)).collect();

    assert!(eventually(|| source.is_initialized() && target.is_initialized()).await);
    // The in-flight INFO stays; the three queued GETs move.
    assert_eq!(source.drain_into(&target), 3);
    assert_eq!(source.pending_count(), 1);
    assert_eq!(target.pending_count(), 3);

    server.open_gate();
    for (idx, future) in moved.into_iter().enumerate() {
        assert_eq!(future.await.expect("moved").data, format!("GET {} AS JSON", idx));
    }
    assert_eq!(held.await.expect("held").data, "INFO");
    source.close().await;
    target.close().await;
}
