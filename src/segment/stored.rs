//! Stored field values, one entry per docno

use std::io;

use crate::models::StoredFields;

use super::types::DocNo;

/// Stored fields of a segment, indexed by docno
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoredFieldsTable {
    docs: Vec<StoredFields>,
}

impl StoredFieldsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            docs: Vec::with_capacity(capacity),
        }
    }

    /// Append the stored fields of the next docno
    pub fn push(&mut self, fields: StoredFields) -> DocNo {
        let docno = DocNo::new(self.docs.len() as u32);
        self.docs.push(fields);
        docno
    }

    pub fn get(&self, docno: DocNo) -> Option<&StoredFields> {
        self.docs.get(docno.as_usize())
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        bincode::serialize(&self.docs).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let docs = bincode::deserialize(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self { docs })
    }
}
