//! Index lifecycle: the writer, snapshots, readers and background merging
//!
//! - `IndexWriter`: buffers documents, commits segments, installs merges
//! - `Snapshot`: immutable view of one generation plus visible tombstones
//! - `IndexReader`: hands out snapshots, from a writer or from disk
//! - `MergeWorker`: thread pool running the merge policy in the background

mod merger;
mod reader;
mod snapshot;
mod writer;

pub use merger::{MergeHandle, MergeWorker};
pub use reader::IndexReader;
pub use snapshot::{SegmentHandle, SegmentView, Snapshot, SnapshotInner};
pub use writer::{IndexWriter, MergeOutcome};
