//! SQLite execution and wire encoding for a replicated state machine.
//!
//! # Intention
//!
//! - Classify SQL as read-only or mutating without running it, so callers
//!   can route writes through the leader and serve reads anywhere.
//! - Execute SQL against one shared handle and encode the rows into a
//!   compact, length-prefixed byte stream.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - No transport, consensus or process lifecycle. Fatal errors are
//!   returned; terminating is the caller's decision.

pub mod buffer;
pub mod classify;
pub mod error;
mod raw;
pub mod service;
pub mod session;
pub mod sqlite;
pub mod wire;

pub use buffer::ResultBuffer;
pub use classify::{classify, Classification, Validator};
pub use error::{DecodeError, SqlError};
pub use service::{SqlService, StateMachine};
pub use session::{Routed, Session};
pub use sqlite::{Batch, BatchResponse, Database, SqliteConfig};
pub use wire::{decode, encode_scalar, ResultSet};
