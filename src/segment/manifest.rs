//! Segment manifest for tracking live segments
//!
//! The manifest is the only crash-consistency boundary of an index. A commit
//! or merge is durable exactly when a manifest naming its segment has been
//! renamed into place:
//! 1. Write new segment files → fsync files and segment directory
//! 2. Write manifest.json.tmp → fsync
//! 3. Atomic rename to manifest.json → fsync index directory
//! 4. Only then publish the new snapshot

use std::io;

use serde::{Deserialize, Serialize};

use crate::config::IndexSettings;
use crate::schema::Schema;

use super::reader::SegmentMeta;
use super::types::{SegmentId, Tombstones, Version};

/// Manifest entry for a segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Segment metadata
    pub meta: SegmentMeta,
    /// CRC32 of the segment files
    pub checksum: u64,
}

/// The segment manifest tracks all live segments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentManifest {
    /// Manifest format version
    pub version: u32,
    /// Generation number (incremented on each update); the snapshot version
    pub generation: u64,
    /// Next segment ID to allocate
    pub next_segment_id: SegmentId,
    /// Next document version to assign
    pub next_version: Version,
    /// Live segments, oldest first
    pub segments: Vec<ManifestEntry>,
    /// Deleted documents
    #[serde(default)]
    pub tombstones: Tombstones,
    pub schema: Schema,
    pub settings: IndexSettings,
    /// Timestamp of last update
    pub updated_at: u64,
}

impl SegmentManifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    /// Create an empty manifest for a new index
    pub fn new(schema: Schema, settings: IndexSettings) -> Self {
        Self {
            version: Self::VERSION,
            generation: 0,
            next_segment_id: SegmentId::new(0),
            next_version: Version::new(1),
            segments: Vec::new(),
            tombstones: Tombstones::new(),
            schema,
            settings,
            updated_at: 0,
        }
    }

    /// Allocate a new segment ID
    pub fn allocate_segment_id(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();
        id
    }

    /// Append a freshly committed segment
    pub fn add_segment(&mut self, meta: SegmentMeta, checksum: u64) {
        self.segments.push(ManifestEntry { meta, checksum });
    }

    /// Replace merged-away segments by their merge result
    ///
    /// The merged segment takes the slot of the first source. Returns false,
    /// leaving the manifest untouched, when any source is no longer listed.
    pub fn replace_segments(
        &mut self,
        sources: &[SegmentId],
        merged: Option<(SegmentMeta, u64)>,
    ) -> bool {
        if !sources.iter().all(|id| self.contains(*id)) {
            return false;
        }
        let slot = self
            .segments
            .iter()
            .position(|e| sources.contains(&e.meta.id))
            .unwrap_or(self.segments.len());
        self.segments.retain(|e| !sources.contains(&e.meta.id));
        if let Some((meta, checksum)) = merged {
            let slot = slot.min(self.segments.len());
            self.segments.insert(slot, ManifestEntry { meta, checksum });
        }
        true
    }

    /// Drop every segment and tombstone
    pub fn clear_segments(&mut self) -> Vec<ManifestEntry> {
        self.tombstones.clear();
        std::mem::take(&mut self.segments)
    }

    /// Advance the generation for a new on-disk state
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.updated_at = current_timestamp();
        self.generation
    }

    pub fn contains(&self, segment_id: SegmentId) -> bool {
        self.segments.iter().any(|e| e.meta.id == segment_id)
    }

    /// Get segment metadata by ID
    pub fn get_segment(&self, segment_id: SegmentId) -> Option<&ManifestEntry> {
        self.segments.iter().find(|e| e.meta.id == segment_id)
    }

    /// Get total document count across all segments, dead entries included
    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|e| e.meta.doc_count as u64).sum()
    }

    /// Get total size in bytes
    pub fn total_size_bytes(&self) -> u64 {
        self.segments.iter().map(|e| e.meta.size_bytes).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.segments.iter()
    }

    /// Serialize the manifest to JSON
    pub fn to_json(&self) -> io::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Deserialize manifest from JSON
    pub fn from_json(data: &[u8]) -> io::Result<Self> {
        serde_json::from_slice(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Default for SegmentManifest {
    fn default() -> Self {
        Self::new(Schema::default(), IndexSettings::default())
    }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
