//! Censor Store
//!
//! Persistence for review records.
//!
//! Three kinds of data live here:
//! - Review records: business reviews, resource reviews, provider tasks
//! - Current state: one binding per (business type, business ID, field)
//! - Audit trail: append-only binding history and write-once violation snapshots
//!
//! [`Store`] is the interface the client programs against; [`MemoryStore`]
//! is the bundled implementation.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{tx, BindingChange, Store, TxFn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::memory::MemoryStore;
    pub use crate::store::{tx, Store};
}
