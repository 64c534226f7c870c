//! Dense document number mapping
//!
//! Each segment allocates a dense `docno: u32` in `[0..max_doc)` space and
//! stores `docno -> (doc_id, version)`. Deletions are not part of the segment:
//! they are derived per snapshot from the tombstone set.

use std::io;

use roaring::RoaringBitmap;

use super::postings::{decode_vbyte, encode_vbyte};
use super::types::{DocNo, DocNoEntry, DocumentId, Tombstones, Version};

/// Dense document number mapping for a segment
#[derive(Clone, Debug, Default)]
pub struct DocNoMap {
    /// Dense array: docno -> (doc_id, version)
    entries: Vec<DocNoEntry>,
    /// `(doc_id, docno)` pairs sorted by doc id, for id lookups
    by_doc_id: Vec<(DocumentId, DocNo)>,
}

impl DocNoMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            by_doc_id: Vec::with_capacity(capacity),
        }
    }

    /// Build a map from entries in docno order
    pub fn from_entries(entries: Vec<DocNoEntry>) -> Self {
        let mut by_doc_id: Vec<_> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.doc_id, DocNo::new(i as u32)))
            .collect();
        by_doc_id.sort_unstable();
        Self { entries, by_doc_id }
    }

    /// Add a new document and return its docno
    pub fn add(&mut self, doc_id: DocumentId, version: Version) -> DocNo {
        let docno = DocNo::new(self.entries.len() as u32);
        self.entries.push(DocNoEntry::new(doc_id, version));
        let idx = self.by_doc_id.partition_point(|&(id, no)| (id, no) < (doc_id, docno));
        self.by_doc_id.insert(idx, (doc_id, docno));
        docno
    }

    pub fn get(&self, docno: DocNo) -> Option<&DocNoEntry> {
        self.entries.get(docno.as_usize())
    }

    pub fn get_doc_id(&self, docno: DocNo) -> Option<DocumentId> {
        self.entries.get(docno.as_usize()).map(|e| e.doc_id)
    }

    pub fn get_version(&self, docno: DocNo) -> Option<Version> {
        self.entries.get(docno.as_usize()).map(|e| e.version)
    }

    /// All docnos holding an entry for `doc_id`
    pub fn docnos_of(&self, doc_id: DocumentId) -> impl Iterator<Item = DocNo> + '_ {
        let start = self.by_doc_id.partition_point(|&(id, _)| id < doc_id);
        self.by_doc_id[start..]
            .iter()
            .take_while(move |&&(id, _)| id == doc_id)
            .map(|&(_, docno)| docno)
    }

    /// Whether any entry for `doc_id` has a version at or below `cutoff`
    pub fn has_version_at_most(&self, doc_id: DocumentId, cutoff: Version) -> bool {
        self.docnos_of(doc_id)
            .filter_map(|docno| self.get_version(docno))
            .any(|version| version <= cutoff)
    }

    /// Docnos killed by the tombstone set
    pub fn deleted_by(&self, tombstones: &Tombstones) -> RoaringBitmap {
        let mut deleted = RoaringBitmap::new();
        if tombstones.is_empty() {
            return deleted;
        }
        if tombstones.len() < self.entries.len() {
            for (doc_id, cutoff) in tombstones.iter() {
                for docno in self.docnos_of(doc_id) {
                    if self.get_version(docno).map_or(false, |v| v <= cutoff) {
                        deleted.insert(docno.as_u32());
                    }
                }
            }
        } else {
            for (i, entry) in self.entries.iter().enumerate() {
                if tombstones.is_dead(entry) {
                    deleted.insert(i as u32);
                }
            }
        }
        deleted
    }

    /// Get the number of documents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DocNoEntry] {
        &self.entries
    }

    /// Highest version stored in this map
    pub fn max_version(&self) -> Option<Version> {
        self.entries.iter().map(|e| e.version).max()
    }

    /// Iterate over documents not in `deleted`
    pub fn live_docs<'a>(
        &'a self,
        deleted: &'a RoaringBitmap,
    ) -> impl Iterator<Item = (DocNo, &'a DocNoEntry)> + 'a {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(i, _)| !deleted.contains(*i as u32))
            .map(|(i, entry)| (DocNo::new(i as u32), entry))
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(5 + self.entries.len() * 16);

        encode_vbyte(self.entries.len() as u32, &mut output);

        for entry in &self.entries {
            output.extend_from_slice(&entry.doc_id.to_le_bytes());
            output.extend_from_slice(&entry.version.0.to_le_bytes());
        }

        output
    }

    /// Deserialize from bytes
    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut pos = 0;

        let count = decode_vbyte(data, &mut pos)? as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            if pos + 16 > data.len() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Not enough data for docno entry",
                ));
            }

            let mut doc_id_bytes = [0u8; 8];
            doc_id_bytes.copy_from_slice(&data[pos..pos + 8]);
            pos += 8;
            let doc_id = u64::from_le_bytes(doc_id_bytes);

            let mut version_bytes = [0u8; 8];
            version_bytes.copy_from_slice(&data[pos..pos + 8]);
            pos += 8;
            let version = Version::new(u64::from_le_bytes(version_bytes));

            entries.push(DocNoEntry::new(doc_id, version));
        }

        Ok(Self::from_entries(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docno_map_basic() {
        let mut map = DocNoMap::new();

        let docno1 = map.add(100, Version::new(1));
        let docno2 = map.add(200, Version::new(2));
        let docno3 = map.add(300, Version::new(1));

        assert_eq!(docno1, DocNo::new(0));
        assert_eq!(docno2, DocNo::new(1));
        assert_eq!(docno3, DocNo::new(2));

        assert_eq!(map.get_doc_id(docno1), Some(100));
        assert_eq!(map.get_version(docno2), Some(Version::new(2)));
        assert_eq!(map.len(), 3);
        assert_eq!(map.max_version(), Some(Version::new(2)));
    }

    #[test]
    fn test_docnos_of_repeated_id() {
        let mut map = DocNoMap::new();
        map.add(5, Version::new(1));
        map.add(9, Version::new(2));
        map.add(5, Version::new(3));

        let docnos: Vec<_> = map.docnos_of(5).collect();
        assert_eq!(docnos, vec![DocNo(0), DocNo(2)]);
        assert!(map.has_version_at_most(5, Version::new(1)));
        assert!(!map.has_version_at_most(9, Version::new(1)));
        assert_eq!(map.docnos_of(42).count(), 0);
    }

    #[test]
    fn test_deleted_by_tombstones() {
        let mut map = DocNoMap::new();
        map.add(1, Version::new(1));
        map.add(2, Version::new(2));
        map.add(1, Version::new(3));

        let mut tombstones = Tombstones::new();
        tombstones.insert(1, Version::new(2));
        let deleted = map.deleted_by(&tombstones);
        assert_eq!(deleted.iter().collect::<Vec<_>>(), vec![0]);

        let live: Vec<_> = map.live_docs(&deleted).map(|(d, _)| d).collect();
        assert_eq!(live, vec![DocNo(1), DocNo(2)]);

        // Dense path: more tombstones than entries
        for id in 10..20 {
            tombstones.insert(id, Version::new(100));
        }
        tombstones.insert(2, Version::new(2));
        let deleted = map.deleted_by(&tombstones);
        assert_eq!(deleted.iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_docno_map_serialization() {
        let mut map = DocNoMap::new();

        map.add(100, Version::new(1));
        map.add(200, Version::new(2));
        map.add(300, Version::new(3));

        let data = map.serialize();
        let restored = DocNoMap::deserialize(&data).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.get_doc_id(DocNo::new(0)), Some(100));
        assert_eq!(restored.get_version(DocNo::new(1)), Some(Version::new(2)));
        assert_eq!(restored.docnos_of(300).collect::<Vec<_>>(), vec![DocNo(2)]);

        assert!(DocNoMap::deserialize(&data[..data.len() - 3]).is_err());
    }
}
