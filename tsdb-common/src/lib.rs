// tsdb-common - Shared wire vocabulary for the order-book time-series client
//
// This crate defines the response framing and the textual command grammar

pub mod command;
pub mod error;
pub mod frame;
pub mod update;

// Re-export for convenience
pub use command::*;
pub use error::*;
pub use frame::*;
pub use update::*;
