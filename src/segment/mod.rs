//! Segment-based inverted index storage
//!
//! This module implements immutable segment files with a mutable buffer
//! for documents added since the last commit.
//!
//! # Architecture
//!
//! - `MutableBuffer`: In-memory buffer for recent writes
//! - `SegmentWriter`: Flushes the buffer or merges segments into a new segment
//! - `SegmentReader`: Immutable segment, fully loaded in memory
//! - `SegmentManifest`: Tracks live segments, tombstones and schema
//! - `SegmentStore`: Files on disk, atomic manifest replacement
//! - `TieredMergePolicy`: Picks segments worth merging

mod types;
mod statistics;
mod buffer;
mod postings;
mod term_dict;
mod docvalues;
mod docno_map;
mod stored;
mod reader;
mod writer;
mod manifest;
mod store;
mod merge;

pub use types::*;
pub use statistics::*;
pub use buffer::*;
pub use postings::*;
pub use term_dict::*;
pub use docvalues::*;
pub use docno_map::*;
pub use stored::*;
pub use reader::*;
pub use writer::*;
pub use manifest::*;
pub use store::*;
pub use merge::*;
