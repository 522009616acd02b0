//! # Client Errors
//!
//! Transport failures and protocol violations are terminal for the link that
//! hit them; a server-side `success=false` reply is not an error at this layer.

use thiserror::Error;

use tsdb_common::ProtocolError;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level connect, read or write failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// The response stream was provably corrupt.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The connection went away before this request could be answered.
    #[error("connection lost before a reply arrived")]
    Disconnected,
    /// The connection or pool was closed by the caller.
    #[error("client closed")]
    Closed,
    /// The server answered with `success=false` where a value was required.
    #[error("server error: {0}")]
    Server(String),
    /// Payload was not the JSON the caller asked for.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}
