//! # Protocol Errors
//!
//! Purpose: Describe every way the wire vocabulary can be violated, either by
//! a corrupt response header or by a command that would break line framing.

use thiserror::Error;

/// Result type for protocol-level operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Protocol violations detected while framing responses or building commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The status byte of a response header was neither 0 nor 1.
    #[error("invalid status byte {0:#04x} in response header")]
    InvalidStatus(u8),
    /// The declared payload length exceeds the configured ceiling.
    #[error("declared frame length {len} exceeds limit {max}")]
    FrameTooLarge { len: u64, max: u64 },
    /// Command text contains a line break and would split into two requests.
    #[error("command text contains a line break")]
    EmbeddedNewline,
    /// A database name was empty.
    #[error("database name is empty")]
    EmptyName,
    /// A database name contained whitespace or a statement separator.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),
}
