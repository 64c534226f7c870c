//! DocValues for numeric fields
//!
//! One column per numeric field, indexed by docno:
//! - values: f64, little-endian
//! - nulls: explicit roaring bitmap
//! - global min/max to short-circuit range queries

use std::collections::BTreeMap;
use std::io;
use std::ops::Bound;

use roaring::RoaringBitmap;

use super::postings::{decode_vbyte, encode_vbyte};
use super::types::DocNo;

/// Numeric column
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumericColumn {
    /// Values indexed by docno (0.0 for nulls)
    values: Vec<f64>,
    nulls: RoaringBitmap,
    min_value: Option<f64>,
    max_value: Option<f64>,
}

fn in_bounds(value: f64, lower: Bound<f64>, upper: Bound<f64>) -> bool {
    let above = match lower {
        Bound::Included(l) => value >= l,
        Bound::Excluded(l) => value > l,
        Bound::Unbounded => true,
    };
    let below = match upper {
        Bound::Included(u) => value <= u,
        Bound::Excluded(u) => value < u,
        Bound::Unbounded => true,
    };
    above && below
}

impl NumericColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of `docno`, padding skipped docnos with nulls
    pub fn set(&mut self, docno: DocNo, value: Option<f64>) {
        while self.values.len() < docno.as_usize() {
            let pad = self.values.len() as u32;
            self.nulls.insert(pad);
            self.values.push(0.0);
        }
        self.push(value);
    }

    /// Add a value for the next docno
    pub fn push(&mut self, value: Option<f64>) {
        let docno = self.values.len() as u32;
        match value {
            Some(v) => {
                self.min_value = Some(self.min_value.map_or(v, |m| m.min(v)));
                self.max_value = Some(self.max_value.map_or(v, |m| m.max(v)));
                self.values.push(v);
            }
            None => {
                self.nulls.insert(docno);
                self.values.push(0.0);
            }
        }
    }

    pub fn get(&self, docno: DocNo) -> Option<f64> {
        if self.nulls.contains(docno.as_u32()) {
            return None;
        }
        self.values.get(docno.as_usize()).copied()
    }

    /// Docnos whose value lies within the bounds
    pub fn range_query(&self, lower: Bound<f64>, upper: Bound<f64>) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        let (Some(min), Some(max)) = (self.min_value, self.max_value) else {
            return result;
        };
        // Nothing in this column can match
        let overlaps = match (lower, upper) {
            (Bound::Included(l), _) if l > max => false,
            (Bound::Excluded(l), _) if l >= max => false,
            (_, Bound::Included(u)) if u < min => false,
            (_, Bound::Excluded(u)) if u <= min => false,
            _ => true,
        };
        if !overlaps {
            return result;
        }
        for (docno, &value) in self.values.iter().enumerate() {
            if !self.nulls.contains(docno as u32) && in_bounds(value, lower, upper) {
                result.insert(docno as u32);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> io::Result<()> {
        encode_vbyte(self.values.len() as u32, output);
        for value in &self.values {
            output.extend_from_slice(&value.to_le_bytes());
        }
        let mut null_bytes = Vec::new();
        self.nulls.serialize_into(&mut null_bytes)?;
        encode_vbyte(null_bytes.len() as u32, output);
        output.extend(null_bytes);
        Ok(())
    }

    pub fn deserialize(data: &[u8], pos: &mut usize) -> io::Result<Self> {
        let count = decode_vbyte(data, pos)? as usize;
        let mut column = NumericColumn::new();

        let end = *pos + count * 8;
        if end > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough data for numeric column",
            ));
        }
        let mut values = Vec::with_capacity(count);
        for chunk in data[*pos..end].chunks_exact(8) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            values.push(f64::from_le_bytes(bytes));
        }
        *pos = end;

        let null_len = decode_vbyte(data, pos)? as usize;
        let null_bytes = data.get(*pos..*pos + null_len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "Not enough data for null bitmap")
        })?;
        let nulls = RoaringBitmap::deserialize_from(null_bytes)?;
        *pos += null_len;

        for (docno, value) in values.into_iter().enumerate() {
            if nulls.contains(docno as u32) {
                column.push(None);
            } else {
                column.push(Some(value));
            }
        }
        Ok(column)
    }
}

/// Numeric columns of a segment, by field name
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocValues {
    columns: BTreeMap<String, NumericColumn>,
}

impl DocValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `field` on `docno`
    pub fn set(&mut self, field: &str, docno: DocNo, value: f64) {
        self.columns
            .entry(field.to_string())
            .or_default()
            .set(docno, Some(value));
    }

    pub fn get(&self, field: &str, docno: DocNo) -> Option<f64> {
        self.columns.get(field).and_then(|c| c.get(docno))
    }

    pub fn column(&self, field: &str) -> Option<&NumericColumn> {
        self.columns.get(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut output = Vec::new();
        encode_vbyte(self.columns.len() as u32, &mut output);
        for (name, column) in &self.columns {
            encode_vbyte(name.len() as u32, &mut output);
            output.extend_from_slice(name.as_bytes());
            column.serialize(&mut output)?;
        }
        Ok(output)
    }

    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut pos = 0;
        let count = decode_vbyte(data, &mut pos)? as usize;
        let mut columns = BTreeMap::new();
        for _ in 0..count {
            let name_len = decode_vbyte(data, &mut pos)? as usize;
            let name_bytes = data.get(pos..pos + name_len).ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated column name")
            })?;
            let name = String::from_utf8(name_bytes.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            pos += name_len;
            let column = NumericColumn::deserialize(data, &mut pos)?;
            columns.insert(name, column);
        }
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_column_nulls() {
        let mut column = NumericColumn::new();
        column.push(Some(42.0));
        column.push(None);
        column.push(Some(-7.5));

        assert_eq!(column.get(DocNo(0)), Some(42.0));
        assert_eq!(column.get(DocNo(1)), None);
        assert_eq!(column.get(DocNo(2)), Some(-7.5));
        assert_eq!(column.get(DocNo(9)), None);
    }

    #[test]
    fn test_set_pads_with_nulls() {
        let mut column = NumericColumn::new();
        column.set(DocNo(3), Some(1.0));
        assert_eq!(column.len(), 4);
        assert_eq!(column.get(DocNo(0)), None);
        assert_eq!(column.get(DocNo(3)), Some(1.0));
    }

    #[test]
    fn test_range_query_bounds() {
        let mut column = NumericColumn::new();
        for v in [1.0, 5.0, 10.0] {
            column.push(Some(v));
        }
        column.push(None);

        let ids = |b: RoaringBitmap| b.iter().collect::<Vec<_>>();
        assert_eq!(ids(column.range_query(Bound::Included(5.0), Bound::Included(10.0))), vec![1, 2]);
        assert_eq!(ids(column.range_query(Bound::Excluded(5.0), Bound::Unbounded)), vec![2]);
        assert_eq!(ids(column.range_query(Bound::Unbounded, Bound::Excluded(5.0))), vec![0]);
        assert!(column.range_query(Bound::Included(11.0), Bound::Unbounded).is_empty());
        // Null doc (value stored as 0.0) never matches
        assert!(column.range_query(Bound::Included(-1.0), Bound::Included(0.5)).is_empty());
    }

    #[test]
    fn test_docvalues_serialization() {
        let mut dv = DocValues::new();
        dv.set("rank", DocNo(0), 3.0);
        dv.set("rank", DocNo(2), 9.0);
        dv.set("price", DocNo(1), 0.25);

        let bytes = dv.serialize().unwrap();
        let restored = DocValues::deserialize(&bytes).unwrap();

        assert_eq!(restored, dv);
        assert_eq!(restored.get("rank", DocNo(2)), Some(9.0));
        assert_eq!(restored.get("rank", DocNo(1)), None);
        assert_eq!(restored.get("price", DocNo(1)), Some(0.25));
        assert_eq!(restored.field_names().collect::<Vec<_>>(), vec!["price", "rank"]);
    }
}
