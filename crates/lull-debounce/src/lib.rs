//! # lull-debounce
//!
//! Debounce coordinator for the Lull durable execution platform.
//!
//! Debouncing collapses a burst of events for one `(function, debounce key)`
//! pair into a single delayed invocation. Each matching event extends the
//! deadline; a hard timeout fixed at window creation caps the extension; and
//! every mutation race between concurrent producers and the executor is
//! resolved by the store's atomic scripted mutations; there is no in-process
//! lock anywhere in this crate.
//!
//! ## Core Concepts
//!
//! - **Pointer**: one store entry per `(function, key)` naming the active
//!   debounce id. At most one exists at any instant.
//! - **Item map**: one global hash from debounce id to the serialized
//!   [`DebounceItem`] carrying the latest triggering event.
//! - **Delay queue job**: one outstanding job per pointer, keyed by the
//!   debounce id, scheduled for the window's deadline and pushed out on each
//!   extension.
//! - **Rotation**: when the job fires, [`Debouncer::start_execution`] swaps
//!   the pointer to a fresh id so a new window can form while the claimed run
//!   executes.
//!
//! ## Guarantees
//!
//! - One delayed job per burst, carrying the latest event by timestamp
//! - Monotonic by event timestamp: an older event never overwrites a newer one
//! - Effective firing time never exceeds `created_at + timeout`
//!
//! ## Example
//!
//! ```rust,no_run
//! use lull_core::prelude::*;
//! use lull_debounce::prelude::*;
//!
//! # async fn example() -> std::result::Result<(), lull_debounce::Error> {
//! let store = InMemoryStore::new();
//! let queue = InMemoryQueue::attached(&store, &KeyGen::default());
//! let debouncer = StoreDebouncer::new(store, queue, DebouncerConfig::default())?;
//!
//! let function = Function::new(FunctionId::generate(), "send-digest", 1)
//!     .with_debounce(Debounce::new("30s"));
//!
//! let item = DebounceItem {
//!     account_id: AccountId::generate(),
//!     workspace_id: WorkspaceId::generate(),
//!     app_id: AppId::generate(),
//!     function_id: function.id,
//!     function_version: function.version,
//!     event_id: EventId::generate(),
//!     event: Event { name: "cart/item.added".into(), ..Event::default() },
//!     timeout_ms: None,
//!     function_paused_at: None,
//! };
//! debouncer.debounce(item, &function).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod debouncer;
pub mod error;
pub mod item;
pub mod key;
pub mod metrics;
pub mod queue;
pub mod scripts;
pub mod store;

pub use config::DebouncerConfig;
pub use debouncer::{Debouncer, StoreDebouncer};
pub use error::{Error, Result};
pub use item::{DebounceItem, DebouncePayload};
pub use key::KeyGen;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::DebouncerConfig;
    pub use crate::debouncer::{Debouncer, StoreDebouncer};
    pub use crate::error::{Error, Result};
    pub use crate::item::{DebounceItem, DebouncePayload};
    pub use crate::key::KeyGen;
    pub use crate::metrics::DebounceMetrics;
    pub use crate::queue::memory::InMemoryQueue;
    pub use crate::queue::{DelayQueue, EnqueueOpts, JobKind, QueueError, QueueItem, QueueShard};
    pub use crate::scripts::{Script, ScriptName, ScriptRegistry};
    pub use crate::store::memory::InMemoryStore;
    pub use crate::store::{ScriptReply, ScriptStore};
}
