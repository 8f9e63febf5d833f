//! `ContextBuilder`: read-only assembly of context bundles from frames,
//! anchors, and digests already on disk.
//!
//! Never writes; the active path, top anchors, relevant digests, and
//! remote-tier pointers it returns are a point-in-time read, not a
//! subscription.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod builder;
mod bundle;

pub use builder::ContextBuilder;
pub use bundle::{AnchorSummary, ContextBundle, DigestSummary, FrameSummary};
