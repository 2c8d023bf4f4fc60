//! Offline sync: optimistic local writes, the pending-operation drain, and
//! the remote merge.

mod engine;
mod locks;
#[cfg(test)]
mod tests;

pub use engine::{SkipReason, SyncEngine, SyncOutcome, SyncReport};
