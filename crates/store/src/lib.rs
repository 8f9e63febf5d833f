//! Embedded, WAL-backed relational store for StackMemory.
//!
//! A single `Store` owns the on-disk database file and its WAL sidecar. It
//! exposes typed CRUD over frames, events, anchors, storage items, and
//! migration jobs; every other component (`FrameManager`, `RecoveryManager`,
//! `GCWorker`, `TierStore`, `ContextBuilder`) is built on top of it and
//! never touches the WAL or checkpoint files directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod checkpoint;
mod format;
mod store;
mod tables;
mod txn;
mod wal;

pub use store::Store;
pub use txn::WriteOp;
