//! Read-only access to committed snapshots

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::error::{Result, SearchError};
use crate::segment::SegmentStore;

use super::snapshot::{SegmentHandle, Snapshot, SnapshotInner};
use super::writer::IndexWriter;

enum ReaderSource {
    /// Follows the snapshots a writer in this process publishes
    Writer(IndexWriter),
    /// Loads committed generations from disk
    Directory {
        store: SegmentStore,
        current: ArcSwap<SnapshotInner>,
        reload_lock: Mutex<()>,
    },
}

/// Source of snapshots for searching
pub struct IndexReader {
    source: ReaderSource,
}

impl IndexReader {
    /// Open a committed index read-only
    ///
    /// Never creates, deletes or rewrites anything in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, config: &IndexConfig) -> Result<Self> {
        let store = SegmentStore::open_existing(dir.as_ref())?;
        let manifest = store.load_manifest()?.ok_or_else(|| {
            SearchError::Config(format!("no index found in {}", dir.as_ref().display()))
        })?;
        if manifest.settings != config.settings {
            return Err(SearchError::Config(format!(
                "analyzer settings {:?} conflict with persisted settings {:?}",
                config.settings.analyzer, manifest.settings.analyzer
            )));
        }

        let reader = Self {
            source: ReaderSource::Directory {
                store,
                current: ArcSwap::new(Snapshot::empty(manifest.schema.clone()).into_inner()),
                reload_lock: Mutex::new(()),
            },
        };
        reader.load_generation(true)?;
        Ok(reader)
    }

    pub(crate) fn from_writer(writer: IndexWriter) -> Self {
        Self {
            source: ReaderSource::Writer(writer),
        }
    }

    /// Latest snapshot this reader knows about
    pub fn snapshot(&self) -> Snapshot {
        match &self.source {
            ReaderSource::Writer(writer) => writer.snapshot(),
            ReaderSource::Directory { current, .. } => Snapshot::from_inner(current.load_full()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }

    /// Pick up a newer committed generation
    ///
    /// Returns whether the snapshot changed. Readers that follow a writer are
    /// always current.
    pub fn reload(&self) -> Result<bool> {
        self.load_generation(false)
    }

    fn load_generation(&self, initial: bool) -> Result<bool> {
        let ReaderSource::Directory {
            store,
            current,
            reload_lock,
        } = &self.source
        else {
            return Ok(false);
        };
        let _guard = reload_lock.lock();

        let manifest = store.load_manifest()?.ok_or_else(|| {
            SearchError::Corrupt(format!("manifest missing in {}", store.base_dir().display()))
        })?;
        let previous = Snapshot::from_inner(current.load_full());
        if !initial && manifest.generation == previous.generation() {
            return Ok(false);
        }

        let mut handles = Vec::with_capacity(manifest.segment_count());
        for entry in manifest.iter() {
            let handle = match previous.segment(entry.meta.id) {
                Some(view) => Arc::clone(view.handle()),
                None => Arc::new(SegmentHandle::new(store.read_segment(entry)?, None)),
            };
            handles.push(handle);
        }

        let snapshot = Snapshot::new(
            manifest.generation,
            &handles,
            manifest.tombstones,
            manifest.schema,
        );
        if initial {
            info!(
                dir = %store.base_dir().display(),
                generation = snapshot.generation(),
                docs = snapshot.num_docs(),
                "Opened index reader"
            );
        } else {
            debug!(
                from = previous.generation(),
                to = snapshot.generation(),
                "Reloaded index reader"
            );
        }
        current.store(snapshot.into_inner());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use tempfile::TempDir;

    #[test]
    fn test_reader_reload() {
        let dir = TempDir::new().unwrap();
        let writer = IndexWriter::open(dir.path(), IndexConfig::default()).unwrap();
        writer
            .add_document(&Document::new().number("id", 1.0).text("body", "first"))
            .unwrap();
        writer.commit().unwrap();

        let reader = IndexReader::open(dir.path(), &IndexConfig::default()).unwrap();
        assert_eq!(reader.generation(), 1);
        assert_eq!(reader.snapshot().num_docs(), 1);
        assert!(!reader.reload().unwrap());

        writer
            .add_document(&Document::new().number("id", 2.0).text("body", "second"))
            .unwrap();
        writer.commit().unwrap();

        let before = reader.snapshot();
        assert!(reader.reload().unwrap());
        assert_eq!(reader.snapshot().num_docs(), 2);
        assert_eq!(before.num_docs(), 1);
        // The unchanged segment is shared, not reloaded
        assert!(Arc::ptr_eq(
            before.segments()[0].handle(),
            reader.snapshot().segments()[0].handle()
        ));
    }

    #[test]
    fn test_writer_reader_tracks_publishes() {
        let dir = TempDir::new().unwrap();
        let writer = IndexWriter::open(dir.path(), IndexConfig::default()).unwrap();
        let reader = writer.reader();
        assert_eq!(reader.generation(), 0);

        writer
            .add_document(&Document::new().number("id", 1.0).text("body", "tracked"))
            .unwrap();
        writer.commit().unwrap();
        assert_eq!(reader.generation(), 1);
        assert!(!reader.reload().unwrap());
    }

    #[test]
    fn test_open_missing_index() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            IndexReader::open(dir.path(), &IndexConfig::default()),
            Err(SearchError::Config(_))
        ));
        assert!(IndexReader::open(dir.path().join("absent"), &IndexConfig::default()).is_err());
    }
}
