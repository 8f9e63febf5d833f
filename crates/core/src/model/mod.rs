//! Domain entities: Frame, Event, Anchor, StorageItem, MigrationJob, Digest.

pub mod anchor;
pub mod digest;
pub mod event;
pub mod frame;
pub mod storage_item;

pub use anchor::{clamp_priority, Anchor, AnchorType};
pub use digest::{AiDigest, DeterministicDigest, DigestJson};
pub use event::{Event, EventType};
pub use frame::{Frame, FrameState, FrameType};
pub use storage_item::{Compression, JobStatus, MigrationJob, StorageItem, Tier};
