//! Storage module for the job table
//!
//! This module owns the canonical in-memory copy of every job and persists it:
//! - A keyed table of jobs, each behind its own exclusive lock
//! - Run-only state (run guard, cancellation handle, dedup set) kept out of the file
//! - Atomic save through write-temp-then-rename
//! - Load with reconstruction of the runtime state

mod slot;
mod store;
mod traits;

pub use slot::{JobHandle, JobSlot};
pub use store::JobStore;
pub use traits::{StoreError, StoreResult};
