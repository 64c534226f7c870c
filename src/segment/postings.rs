//! Postings format with block-based compression
//!
//! Postings are stored in fixed-size blocks of 128 docs:
//! - docno deltas: bitpacked
//! - term frequencies: bitpacked
//! - positions: separate vbyte stream per block, delta-coded per doc
//! - skip data per block

use std::io;

use super::types::{DocNo, Posting, PostingBlock, PostingListMeta};

/// Variable-byte encoding for integers (commonly used in search engines)
pub fn encode_vbyte(value: u32, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80); // Set high bit to indicate last byte
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode a variable-byte encoded integer
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> io::Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;

    loop {
        if *pos >= input.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected end of vbyte",
            ));
        }

        let byte = input[*pos];
        *pos += 1;

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 28 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "VByte value too large",
            ));
        }
    }
}

/// Simple bitpacking for a block of integers
/// Uses the minimum number of bits needed to represent the max value
pub fn bitpack_encode(values: &[u32], output: &mut Vec<u8>) {
    if values.is_empty() {
        output.push(0); // 0 bits needed
        return;
    }

    let max_val = values.iter().copied().max().unwrap_or(0);
    let bits_needed = if max_val == 0 {
        1
    } else {
        32 - max_val.leading_zeros()
    } as u8;

    output.push(bits_needed);

    let mut current_byte: u64 = 0;
    let mut bits_in_current = 0;

    for &value in values {
        current_byte |= (value as u64) << bits_in_current;
        bits_in_current += bits_needed as u32;

        while bits_in_current >= 8 {
            output.push(current_byte as u8);
            current_byte >>= 8;
            bits_in_current -= 8;
        }
    }

    if bits_in_current > 0 {
        output.push(current_byte as u8);
    }
}

/// Decode bitpacked integers
pub fn bitpack_decode(input: &[u8], pos: &mut usize, count: usize) -> io::Result<Vec<u32>> {
    if *pos >= input.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Unexpected end of bitpack",
        ));
    }

    let bits_needed = input[*pos] as u32;
    *pos += 1;

    if bits_needed == 0 {
        return Ok(vec![0; count]);
    }

    let total_bits = count as u32 * bits_needed;
    let bytes_needed = ((total_bits + 7) / 8) as usize;

    if *pos + bytes_needed > input.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Not enough bytes for bitpack",
        ));
    }

    let mut values = Vec::with_capacity(count);
    let mut current: u64 = 0;
    let mut bits_available = 0;
    let mask = (1u64 << bits_needed) - 1;

    for _ in 0..count {
        while bits_available < bits_needed {
            if *pos < input.len() {
                current |= (input[*pos] as u64) << bits_available;
                *pos += 1;
            }
            bits_available += 8;
        }

        values.push((current & mask) as u32);
        current >>= bits_needed;
        bits_available -= bits_needed;
    }

    Ok(values)
}

fn read_u64(data: &[u8], pos: &mut usize) -> io::Result<u64> {
    let bytes = data.get(*pos..*pos + 8).ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated skip entry")
    })?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    *pos += 8;
    Ok(u64::from_le_bytes(buf))
}

/// Skip data for fast block skipping during query processing
#[derive(Clone, Debug, Default)]
pub struct SkipEntry {
    /// Maximum docno in this block
    pub max_docno: DocNo,
    /// Offset to this block in the postings data
    pub block_offset: u64,
}

/// Writer for posting lists
pub struct PostingsWriter {
    /// Accumulated blocks for current posting list
    block_data: Vec<u8>,
    /// Skip entries for the current term
    skip_entries: Vec<SkipEntry>,
    /// Current block being built
    current_block: PostingBlock,
    /// Final output data
    data: Vec<u8>,
}

impl PostingsWriter {
    pub fn new() -> Self {
        Self {
            block_data: Vec::new(),
            skip_entries: Vec::new(),
            current_block: PostingBlock::new(),
            data: Vec::new(),
        }
    }

    /// Start writing a new posting list
    pub fn start_posting_list(&mut self) {
        self.block_data.clear();
        self.skip_entries.clear();
        self.current_block = PostingBlock::new();
    }

    /// Add a posting to the current list; docnos must ascend
    pub fn add_posting(&mut self, posting: Posting) {
        self.current_block.push(posting);

        if self.current_block.is_full() {
            self.flush_block();
        }
    }

    /// Finish writing a posting list and return metadata
    pub fn finish_posting_list(&mut self, doc_frequency: u32, total_term_frequency: u64) -> PostingListMeta {
        if !self.current_block.is_empty() {
            self.flush_block();
        }

        let offset = self.data.len() as u64;

        encode_vbyte(self.skip_entries.len() as u32, &mut self.data);

        for skip in &self.skip_entries {
            encode_vbyte(skip.max_docno.0, &mut self.data);
            self.data.extend_from_slice(&skip.block_offset.to_le_bytes());
        }

        self.data.extend_from_slice(&self.block_data);

        let length = self.data.len() as u64 - offset;

        PostingListMeta {
            offset,
            length,
            doc_frequency,
            total_term_frequency,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    fn flush_block(&mut self) {
        if self.current_block.is_empty() {
            return;
        }

        let block = std::mem::take(&mut self.current_block);
        let block_start = self.block_data.len() as u64;

        self.skip_entries.push(SkipEntry {
            max_docno: block.max_docno,
            block_offset: block_start,
        });

        encode_vbyte(block.len() as u32, &mut self.block_data);

        let mut deltas = Vec::with_capacity(block.len());
        let mut prev = match self.skip_entries.len() {
            1 => 0,
            n => self.skip_entries[n - 2].max_docno.0,
        };
        for docno in &block.docnos {
            deltas.push(docno.0 - prev);
            prev = docno.0;
        }
        bitpack_encode(&deltas, &mut self.block_data);
        bitpack_encode(&block.term_frequencies, &mut self.block_data);

        // Positions restart their delta chain at every doc
        let mut positions = Vec::new();
        let mut cursor = 0;
        for &tf in &block.term_frequencies {
            let mut last = 0;
            for &position in &block.positions[cursor..cursor + tf as usize] {
                encode_vbyte(position - last, &mut positions);
                last = position;
            }
            cursor += tf as usize;
        }
        encode_vbyte(positions.len() as u32, &mut self.block_data);
        self.block_data.extend_from_slice(&positions);

        self.current_block = PostingBlock::new();
    }
}

impl Default for PostingsWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader for posting lists
pub struct PostingsReader {
    data: Vec<u8>,
}

impl PostingsReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Get an iterator over postings for a term
    pub fn get_postings(&self, meta: &PostingListMeta) -> io::Result<PostingIterator<'_>> {
        let start = meta.offset as usize;
        let end = (meta.offset + meta.length) as usize;

        if end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Posting list extends beyond data",
            ));
        }

        PostingIterator::new(&self.data[start..end])
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Iterator over the `(docno, term frequency)` pairs of a posting list
///
/// Positions of the posting last returned are decoded on demand through
/// [`PostingIterator::positions`].
pub struct PostingIterator<'a> {
    data: &'a [u8],
    /// Position in data where blocks start (after skip entries)
    blocks_start: usize,
    /// Current position in data
    pos: usize,
    skip_entries: Vec<SkipEntry>,
    /// Index of the next block to load
    current_block_idx: usize,
    current_block: Vec<(DocNo, u32)>,
    /// Index of the next posting to return within the current block
    block_pos: usize,
    /// Last docno seen (for delta decoding)
    last_docno: u32,
    /// Byte range of the current block's position stream
    positions_range: (usize, usize),
    /// Decoded positions of the current block, with per-posting start offsets
    block_positions: Option<(Vec<u32>, Vec<usize>)>,
}

impl<'a> PostingIterator<'a> {
    pub fn new(data: &'a [u8]) -> io::Result<Self> {
        let mut pos = 0;
        let block_count = decode_vbyte(data, &mut pos)? as usize;

        let mut skip_entries = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let max_docno = decode_vbyte(data, &mut pos)?;
            let block_offset = read_u64(data, &mut pos)?;
            skip_entries.push(SkipEntry {
                max_docno: DocNo(max_docno),
                block_offset,
            });
        }

        Ok(Self {
            data,
            blocks_start: pos,
            pos,
            skip_entries,
            current_block_idx: 0,
            current_block: Vec::new(),
            block_pos: 0,
            last_docno: 0,
            positions_range: (0, 0),
            block_positions: None,
        })
    }

    /// Skip to the first posting with docno >= target
    pub fn skip_to(&mut self, target: DocNo) -> Option<(DocNo, u32)> {
        while self.current_block_idx < self.skip_entries.len() {
            let skip = &self.skip_entries[self.current_block_idx];
            if skip.max_docno >= target {
                break;
            }
            // Whole block is below target
            self.current_block_idx += 1;
            if self.current_block_idx < self.skip_entries.len() {
                self.pos = self.blocks_start
                    + self.skip_entries[self.current_block_idx].block_offset as usize;
                self.last_docno = self.skip_entries[self.current_block_idx - 1].max_docno.0;
            }
            self.current_block.clear();
            self.block_pos = 0;
        }

        while let Some((docno, tf)) = self.next() {
            if docno >= target {
                return Some((docno, tf));
            }
        }
        None
    }

    /// Positions of the posting most recently returned
    pub fn positions(&mut self) -> io::Result<&[u32]> {
        if self.block_pos == 0 {
            return Ok(&[]);
        }
        if self.block_positions.is_none() {
            self.block_positions = Some(self.decode_block_positions()?);
        }
        let idx = self.block_pos - 1;
        match &self.block_positions {
            Some((positions, offsets)) => {
                let start = offsets[idx];
                let end = offsets.get(idx + 1).copied().unwrap_or(positions.len());
                Ok(&positions[start..end])
            }
            None => Ok(&[]),
        }
    }

    fn decode_block_positions(&self) -> io::Result<(Vec<u32>, Vec<usize>)> {
        let (start, end) = self.positions_range;
        let stream = self.data.get(start..end).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "Position stream out of bounds")
        })?;
        let mut pos = 0;
        let mut positions = Vec::new();
        let mut offsets = Vec::with_capacity(self.current_block.len());
        for &(_, tf) in &self.current_block {
            offsets.push(positions.len());
            let mut last = 0;
            for _ in 0..tf {
                last += decode_vbyte(stream, &mut pos)?;
                positions.push(last);
            }
        }
        Ok((positions, offsets))
    }

    fn load_next_block(&mut self) -> io::Result<bool> {
        if self.current_block_idx >= self.skip_entries.len() || self.pos >= self.data.len() {
            return Ok(false);
        }

        let count = decode_vbyte(self.data, &mut self.pos)? as usize;
        if count == 0 {
            return Ok(false);
        }

        let deltas = bitpack_decode(self.data, &mut self.pos, count)?;
        let tfs = bitpack_decode(self.data, &mut self.pos, count)?;

        let positions_len = decode_vbyte(self.data, &mut self.pos)? as usize;
        self.positions_range = (self.pos, self.pos + positions_len);
        self.pos += positions_len;
        self.block_positions = None;

        self.current_block.clear();
        let mut docno = self.last_docno;
        for (delta, tf) in deltas.into_iter().zip(tfs) {
            docno += delta;
            self.current_block.push((DocNo(docno), tf));
        }
        self.last_docno = docno;

        self.block_pos = 0;
        self.current_block_idx += 1;
        Ok(true)
    }
}

impl<'a> Iterator for PostingIterator<'a> {
    type Item = (DocNo, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.block_pos >= self.current_block.len() {
            // A corrupt block ends the list; checksums guard the files on open
            if !self.load_next_block().unwrap_or(false) {
                return None;
            }
        }

        let result = self.current_block.get(self.block_pos).copied();
        self.block_pos += 1;
        result
    }
}
