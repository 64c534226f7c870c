//! Persistent storage for segment files and the manifest

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, SearchError};

use super::manifest::{ManifestEntry, SegmentManifest};
use super::reader::{SegmentFiles, SegmentReader};
use super::types::SegmentId;
use super::writer::SegmentWriteResult;

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TMP_FILE: &str = "manifest.json.tmp";
const SEGMENT_DIR_PREFIX: &str = "segment_";

/// Persistent storage for segment files and manifest.
#[derive(Clone, Debug)]
pub struct SegmentStore {
    base_dir: PathBuf,
}

/// Flush a directory entry table to disk
fn sync_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(path)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

impl SegmentStore {
    /// Open a store, creating the directory when missing
    pub fn create<P: AsRef<Path>>(base_dir: P) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    /// Open an existing store without creating anything
    pub fn open_existing<P: AsRef<Path>>(base_dir: P) -> io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("index directory {} does not exist", base_dir.display()),
            ));
        }
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn segment_dir(&self, id: SegmentId) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    /// Write every segment file and fsync them along with the directories
    ///
    /// A failed write removes the partial segment directory, best effort.
    pub fn write_segment(&self, result: &SegmentWriteResult) -> io::Result<()> {
        let dir = self.segment_dir(result.reader.id());
        let written = self.write_segment_files(&dir, &result.files);
        if written.is_err() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to remove partial segment");
            }
        }
        written
    }

    fn write_segment_files(&self, dir: &Path, files: &SegmentFiles) -> io::Result<()> {
        // Leftover from an earlier failed attempt with the same id
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir(dir)?;
        for (name, data) in files.entries() {
            write_synced(&dir.join(name), data)?;
        }
        sync_dir(dir)?;
        sync_dir(&self.base_dir)
    }

    /// Load a segment listed in the manifest and verify its checksum
    pub fn read_segment(&self, entry: &ManifestEntry) -> Result<SegmentReader> {
        let dir = self.segment_dir(entry.meta.id);
        let mut files = SegmentFiles::default();
        let names: Vec<&'static str> = files.entries().iter().map(|(name, _)| *name).collect();
        for name in names {
            let data = fs::read(dir.join(name))?;
            if let Some(slot) = files.slot_mut(name) {
                *slot = data;
            }
        }

        let checksum = files.checksum();
        if checksum != entry.checksum {
            return Err(SearchError::Corrupt(format!(
                "{} checksum mismatch: manifest {:#x}, files {:#x}",
                entry.meta.id, entry.checksum, checksum
            )));
        }

        SegmentReader::from_files(entry.meta.clone(), files)
            .map_err(|e| SearchError::Corrupt(format!("{}: {}", entry.meta.id, e)))
    }

    /// Atomically replace the manifest: tmp file, fsync, rename, fsync dir
    pub fn save_manifest(&self, manifest: &SegmentManifest) -> io::Result<()> {
        let tmp = self.base_dir.join(MANIFEST_TMP_FILE);
        write_synced(&tmp, &manifest.to_json()?)?;
        fs::rename(&tmp, self.base_dir.join(MANIFEST_FILE))?;
        sync_dir(&self.base_dir)
    }

    /// Load the manifest, `None` for a fresh directory
    pub fn load_manifest(&self) -> Result<Option<SegmentManifest>> {
        let path = self.base_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        SegmentManifest::from_json(&bytes)
            .map(Some)
            .map_err(|e| SearchError::Corrupt(format!("{}: {}", MANIFEST_FILE, e)))
    }

    /// Delete segment directories and temp files the manifest does not reference
    ///
    /// Returns the removed paths.
    pub fn cleanup_orphans(&self, manifest: &SegmentManifest) -> io::Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for dir_entry in fs::read_dir(&self.base_dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let path = dir_entry.path();

            let orphan = if name.ends_with(".tmp") {
                true
            } else if let Some(id) = name.strip_prefix(SEGMENT_DIR_PREFIX) {
                match id.parse::<u64>() {
                    Ok(id) => !manifest.contains(SegmentId::new(id)),
                    Err(_) => false,
                }
            } else {
                false
            };
            if !orphan {
                continue;
            }

            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            info!(path = %path.display(), "Removed unreferenced index file");
            removed.push(path);
        }
        if !removed.is_empty() {
            sync_dir(&self.base_dir)?;
        }
        Ok(removed)
    }

    /// Physically delete a segment directory
    pub fn remove_segment_dir(&self, id: SegmentId) -> io::Result<()> {
        let dir = self.segment_dir(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(segment = %id, "Deleted obsolete segment directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::models::Document;
    use crate::schema::Schema;
    use crate::segment::{MutableBuffer, SegmentWriter, Version};
    use crate::tokenizer::Analyzer;
    use roaring::RoaringBitmap;
    use tempfile::TempDir;

    fn write_result(id: u64) -> SegmentWriteResult {
        let analyzer = Analyzer::new(&AnalyzerConfig::default()).unwrap();
        let mut buffer = MutableBuffer::new();
        let doc = Document::new().number("id", 1.0).text("body", "stored segment");
        let resolved = Schema::new().resolve(&doc).unwrap();
        buffer.index_document(&resolved, &analyzer, Version::new(1));
        SegmentWriter::new(SegmentId::new(id))
            .write_from_buffer(&buffer, &RoaringBitmap::new())
            .unwrap()
    }

    #[test]
    fn test_segment_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::create(dir.path()).unwrap();
        let result = write_result(4);
        store.write_segment(&result).unwrap();

        assert!(dir.path().join("segment_4").join("terms.fst").exists());

        let entry = ManifestEntry {
            meta: result.meta().clone(),
            checksum: result.checksum(),
        };
        let reader = store.read_segment(&entry).unwrap();
        assert_eq!(reader.doc_count(), 1);
        assert_eq!(reader.get_doc_id(crate::segment::DocNo(0)), Some(1));
    }

    #[test]
    fn test_checksum_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::create(dir.path()).unwrap();
        let result = write_result(0);
        store.write_segment(&result).unwrap();

        let entry = ManifestEntry {
            meta: result.meta().clone(),
            checksum: result.checksum() ^ 1,
        };
        assert!(matches!(store.read_segment(&entry), Err(SearchError::Corrupt(_))));
    }

    #[test]
    fn test_manifest_atomic_save() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::create(dir.path()).unwrap();
        assert!(store.load_manifest().unwrap().is_none());

        let mut manifest = SegmentManifest::default();
        manifest.bump_generation();
        store.save_manifest(&manifest).unwrap();

        assert!(!dir.path().join(MANIFEST_TMP_FILE).exists());
        assert_eq!(store.load_manifest().unwrap(), Some(manifest));
    }

    #[test]
    fn test_cleanup_orphans() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::create(dir.path()).unwrap();

        let kept = write_result(0);
        store.write_segment(&kept).unwrap();
        store.write_segment(&write_result(1)).unwrap();
        fs::write(dir.path().join("manifest.json.tmp"), b"partial").unwrap();
        fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();

        let mut manifest = SegmentManifest::default();
        manifest.add_segment(kept.meta().clone(), kept.checksum());

        let removed = store.cleanup_orphans(&manifest).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(dir.path().join("segment_0").exists());
        assert!(!dir.path().join("segment_1").exists());
        assert!(!dir.path().join("manifest.json.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());

        store.remove_segment_dir(SegmentId::new(0)).unwrap();
        assert!(!dir.path().join("segment_0").exists());
        // Already gone is fine
        store.remove_segment_dir(SegmentId::new(0)).unwrap();
    }
}
