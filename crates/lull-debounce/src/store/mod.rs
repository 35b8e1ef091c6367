//! Keyed-store abstraction for debounce state.
//!
//! The Store trait defines the persistence layer for the pointer and item
//! map. Correctness of the whole coordinator rests on one property of this
//! contract: a script evaluation is **atomic**, and no other store operation
//! observes its intermediate state. Redis-class backends get this from
//! server-side script execution; the in-memory backend holds a single lock
//! for the duration of the mutation.
//!
//! ## Design Principles
//!
//! - **Scripts are pure**: a script is a function of `(keys, args)` over the
//!   store's state; there is no hidden registry or shared manager
//! - **Nil is missing**: reads of absent keys or fields return `None`, never
//!   an error
//! - **Testability**: an in-memory implementation backs the test suite

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::scripts::Script;

/// The value returned by an atomic script evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    /// An integer status or TTL.
    Int(i64),
    /// A string status or id.
    Str(String),
}

impl ScriptReply {
    /// Returns the integer value, if this reply is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Str(_) => None,
        }
    }

    /// Returns the string value, if this reply is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Str(value) => Some(value),
        }
    }
}

/// Storage abstraction for debounce state.
///
/// Implementations must provide:
/// - Atomic evaluation of the named scripts with string keys and args
/// - Hash-map reads and writes with nil-is-missing semantics
/// - Key-level TTL honored by the scripts' pointer reads
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent producers debouncing
/// onto the same keys.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Evaluates a script atomically against `keys` and `args`.
    async fn eval(&self, script: &Script, keys: &[String], args: &[String])
        -> Result<ScriptReply>;

    /// Reads one hash field. Returns `None` for a missing key or field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Writes one hash field, creating the hash if needed.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Deletes one hash field. Deleting a missing field is a success.
    async fn hdel(&self, key: &str, field: &str) -> Result<()>;
}
