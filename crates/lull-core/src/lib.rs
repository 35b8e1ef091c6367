//! # lull-core
//!
//! Core abstractions for the Lull durable function-execution platform.
//!
//! This crate provides the foundational types used across all Lull components:
//!
//! - **Identifiers**: Strongly-typed IDs for accounts, workspaces, apps,
//!   functions, events, and debounces
//! - **Events**: The triggering event payload and the tracked-event capability
//! - **Functions**: The function definition slice the execution plane consumes
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `lull-core` is the **only** crate allowed to define shared primitives.
//! All cross-component interaction happens via contracts defined here.
//!
//! ## Example
//!
//! ```rust
//! use lull_core::prelude::*;
//!
//! let function_id = FunctionId::generate();
//! let debounce_id = DebounceId::generate();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod function;
pub mod id;

pub use error::{Error, Result};
pub use event::{Event, TrackedEvent};
pub use function::{Debounce, Function};
pub use id::{AccountId, AppId, DebounceId, EventId, FunctionId, WorkspaceId};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use lull_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, TrackedEvent};
    pub use crate::function::{Debounce, Function};
    pub use crate::id::{AccountId, AppId, DebounceId, EventId, FunctionId, WorkspaceId};
}
