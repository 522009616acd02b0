//! # Order-Book Database Client
//!
//! Purpose: Provide an async, pipelined client for the order-book
//! time-series server with a self-healing connection pool.
//!
//! ## Design Principles
//! 1. **Strict Pipelining**: Each link has one request on the wire and
//!    replies are matched to callers in write order.
//! 2. **Facade Pattern**: `Commands` hides framing and routing behind one
//!    method per server verb.
//! 3. **Least-Loaded Pool**: Requests go to the link with the shortest queue.
//! 4. **Transparent Failover**: Work queued on a dead link moves to a live one.
//!
//! ## Usage
//!
//! ```no_run
//! use tsdb_client::{ClientConfig, Commands, DbName, Pool};
//!
//! # async fn demo() -> tsdb_client::ClientResult<()> {
//! let pool = Pool::new(ClientConfig::default());
//! let db = DbName::new("bnc_btc_eth")?;
//! pool.create(&db).await?;
//! let reply = pool.get_all().await?;
//! let rows: Vec<serde_json::Value> = reply.json()?;
//! println!("{} rows", rows.len());
//! pool.exit().await;
//! # Ok(())
//! # }
//! ```

mod commands;
mod config;
mod connection;
mod error;
mod pipeline;
mod pool;
mod response;

pub use commands::Commands;
pub use config::{
    ClientConfig, DEFAULT_HOST, DEFAULT_POOL_SIZE, DEFAULT_PORT, ENV_HOSTNAME, ENV_POOL_SIZE,
    ENV_PORT,
};
pub use connection::Connection;
pub use error::{ClientError, ClientResult};
pub use pool::{select_least_loaded, Pool};
pub use response::{Response, ResponseFuture};
pub use tsdb_common::{
    Batch, Command, DbName, Frame, GetCount, GetFormat, GetQuery, ProtocolError, Update,
    BATCH_SENTINEL,
};
