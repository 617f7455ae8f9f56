//! Numeric offset index: a paged on-disk map from entity id to the byte
//! offset of the entity's record in its data file.
//!
//! Layout (fixed header fields little-endian):
//!
//!   page_size:    u32
//!   entry_count:  u32
//!   root_offset:  u64
//!   -- zero padding up to page_size --
//!   data pages, each exactly page_size bytes, zero padded:
//!     entries_in_page  number u32
//!     first_id         number u64   (absolute)
//!     first_offset     number u64   (absolute)
//!     per further entry: id delta number u64, offset delta number u64
//!   root directory at root_offset:
//!     page_count  number u32
//!     per page:   first_id delta number u64
//!
//! Page `p` starts at byte `page_size * (p + 1)`. Ids and offsets must be
//! strictly ascending, which keeps every delta unsigned and lets a reader
//! resolve an ascending id set in a single forward walk.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::io::{FileOffset, FileScanner, FileWriter};

const MIN_PAGE_SIZE: u32 = 64;

/// Streams ascending `(id, offset)` pairs into an index file.
pub struct NumericIndexWriter {
    writer: FileWriter,
    page_size: u32,
    entries: Vec<(u64, FileOffset)>,
    page_bytes: usize,
    first_ids: Vec<u64>,
    last_id: Option<u64>,
    last_offset: FileOffset,
    count: u32,
}

impl NumericIndexWriter {
    pub fn create<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        if page_size < MIN_PAGE_SIZE {
            bail!("Index page size {} is below the minimum {}", page_size, MIN_PAGE_SIZE);
        }

        let mut writer = FileWriter::create(path)?;
        writer.write_u32(page_size)?;
        writer.write_u32(0)?; // entry count, patched in finish()
        writer.write_u64(0)?; // root offset, patched in finish()
        writer.flush_block_with_zeros(page_size as usize)?;

        Ok(NumericIndexWriter {
            writer,
            page_size,
            entries: Vec::new(),
            page_bytes: 0,
            first_ids: Vec::new(),
            last_id: None,
            last_offset: 0,
            count: 0,
        })
    }

    pub fn push(&mut self, id: u64, offset: FileOffset) -> Result<()> {
        if let Some(last) = self.last_id {
            if id <= last || offset <= self.last_offset {
                bail!(
                    "Index entries must be strictly ascending: ({}, {}) after ({}, {})",
                    id,
                    offset,
                    last,
                    self.last_offset
                );
            }
        }

        let mut cost = self.entry_cost(id, offset);
        let count_cost = number_len((self.entries.len() + 1) as u64);
        if !self.entries.is_empty()
            && self.page_bytes + cost + count_cost > self.page_size as usize
        {
            self.flush_page()?;
            cost = self.entry_cost(id, offset);
        }

        self.entries.push((id, offset));
        self.page_bytes += cost;
        self.last_id = Some(id);
        self.last_offset = offset;
        self.count += 1;
        Ok(())
    }

    fn entry_cost(&self, id: u64, offset: FileOffset) -> usize {
        match self.entries.last() {
            Some(&(last_id, last_offset)) => {
                number_len(id - last_id) + number_len(offset - last_offset)
            }
            None => number_len(id) + number_len(offset),
        }
    }

    fn flush_page(&mut self) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }

        self.writer.write_number_u32(self.entries.len() as u32)?;
        self.writer.write_number_u64(self.entries[0].0)?;
        self.writer.write_number_u64(self.entries[0].1)?;
        for window in self.entries.windows(2) {
            self.writer.write_number_u64(window[1].0 - window[0].0)?;
            self.writer.write_number_u64(window[1].1 - window[0].1)?;
        }
        self.writer.flush_block_with_zeros(self.page_size as usize)?;

        self.first_ids.push(self.entries[0].0);
        self.entries.clear();
        self.page_bytes = 0;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.flush_page()?;

        let root_offset = self.writer.pos()?;
        self.writer.write_number_u32(self.first_ids.len() as u32)?;
        let mut last = 0u64;
        for &first_id in &self.first_ids {
            self.writer.write_number_u64(first_id - last)?;
            last = first_id;
        }

        self.writer.set_pos(4)?;
        self.writer.write_u32(self.count)?;
        self.writer.write_u64(root_offset)?;
        self.writer.close()
    }
}

struct PageCache {
    pages: HashMap<usize, Vec<(u64, FileOffset)>>,
    recency: VecDeque<usize>,
    capacity: usize,
}

impl PageCache {
    fn new(capacity: usize) -> Self {
        PageCache {
            pages: HashMap::new(),
            recency: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, page: usize) -> bool {
        self.pages.contains_key(&page)
    }

    fn get(&mut self, page: usize) -> Option<&Vec<(u64, FileOffset)>> {
        if !self.pages.contains_key(&page) {
            return None;
        }

        if let Some(position) = self.recency.iter().position(|&p| p == page) {
            self.recency.remove(position);
        }
        self.recency.push_back(page);
        self.pages.get(&page)
    }

    fn insert(&mut self, page: usize, entries: Vec<(u64, FileOffset)>) {
        while self.pages.len() >= self.capacity {
            match self.recency.pop_front() {
                Some(evicted) => {
                    self.pages.remove(&evicted);
                }
                None => break,
            }
        }
        self.pages.insert(page, entries);
        self.recency.push_back(page);
    }
}

/// Read-only random-access view of an index file with a bounded cache of
/// decoded pages.
pub struct NumericIndex {
    scanner: FileScanner,
    page_size: u32,
    entry_count: u32,
    first_ids: Vec<u64>,
    cache: PageCache,
}

impl NumericIndex {
    pub fn open<P: AsRef<Path>>(path: P, memory_mapped: bool, cache_size: usize) -> Result<Self> {
        let mut scanner = FileScanner::open(path.as_ref(), memory_mapped)
            .with_context(|| format!("Cannot open index '{}'", path.as_ref().display()))?;

        let page_size = scanner.read_u32()?;
        if page_size < MIN_PAGE_SIZE {
            bail!(
                "{}: corrupt index header (page size {})",
                path.as_ref().display(),
                page_size
            );
        }
        let entry_count = scanner.read_u32()?;
        let root_offset = scanner.read_u64()?;

        scanner.set_pos(root_offset)?;
        let page_count = scanner.read_number_u32()? as usize;
        let mut first_ids = Vec::with_capacity(page_count);
        let mut last = 0u64;
        for _ in 0..page_count {
            last += scanner.read_number_u64()?;
            first_ids.push(last);
        }

        Ok(NumericIndex {
            scanner,
            page_size,
            entry_count,
            first_ids,
            cache: PageCache::new(cache_size),
        })
    }

    pub fn len(&self) -> usize {
        self.entry_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Resolves an ascending id set in one forward walk. Ids absent from
    /// the index are skipped; present ids yield their offsets in input
    /// order.
    pub fn get_offsets(&mut self, ids: &BTreeSet<u64>) -> Result<Vec<FileOffset>> {
        let mut offsets = Vec::with_capacity(ids.len());
        for &id in ids {
            let page = match self.locate_page(id) {
                Some(page) => page,
                None => continue,
            };
            if let Some(offset) = self.lookup_in_page(page, id)? {
                offsets.push(offset);
            }
        }
        Ok(offsets)
    }

    fn locate_page(&self, id: u64) -> Option<usize> {
        let upper = self.first_ids.partition_point(|&first| first <= id);
        upper.checked_sub(1)
    }

    fn lookup_in_page(&mut self, page: usize, id: u64) -> Result<Option<FileOffset>> {
        if !self.cache.contains(page) {
            let entries = self.load_page(page)?;
            self.cache.insert(page, entries);
        }

        let entries = self.cache.get(page).expect("page was just inserted");
        Ok(entries
            .binary_search_by_key(&id, |entry| entry.0)
            .ok()
            .map(|position| entries[position].1))
    }

    fn load_page(&mut self, page: usize) -> Result<Vec<(u64, FileOffset)>> {
        let start = u64::from(self.page_size) * (page as u64 + 1);
        self.scanner.set_pos(start)?;

        let count = self.scanner.read_number_u32()? as usize;
        let mut entries = Vec::with_capacity(count);

        let mut id = self.scanner.read_number_u64()?;
        let mut offset = self.scanner.read_number_u64()?;
        entries.push((id, offset));

        for _ in 1..count {
            id += self.scanner.read_number_u64()?;
            offset += self.scanner.read_number_u64()?;
            entries.push((id, offset));
        }
        Ok(entries)
    }
}

fn number_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_index(path: &Path, pairs: &[(u64, u64)], page_size: u32) {
        let mut writer = NumericIndexWriter::create(path, page_size).unwrap();
        for &(id, offset) in pairs {
            writer.push(id, offset).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn resolves_ids_across_many_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");

        let pairs: Vec<(u64, u64)> = (0..1000).map(|i| (i * 3 + 1, 16 + i * 7)).collect();
        build_index(&path, &pairs, 64);

        let mut index = NumericIndex::open(&path, false, 2).unwrap();
        assert_eq!(index.len(), 1000);

        // A scattered subset, plus ids that do not exist.
        let ids: BTreeSet<u64> = [1u64, 2, 4, 100, 1501, 1502, 2998, 3000]
            .into_iter()
            .collect();
        let offsets = index.get_offsets(&ids).unwrap();

        let expected: Vec<u64> = [1u64, 4, 100, 1501, 2998]
            .iter()
            .map(|id| 16 + (id - 1) / 3 * 7)
            .collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn full_scan_matches_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");

        let pairs: Vec<(u64, u64)> = (0..257).map(|i| (i + 10, 100 + i * 13)).collect();
        build_index(&path, &pairs, 128);

        let mut index = NumericIndex::open(&path, false, 1).unwrap();
        let ids: BTreeSet<u64> = pairs.iter().map(|&(id, _)| id).collect();
        let offsets = index.get_offsets(&ids).unwrap();
        let expected: Vec<u64> = pairs.iter().map(|&(_, offset)| offset).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn ids_below_the_first_entry_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        build_index(&path, &[(50, 20), (60, 40)], 64);

        let mut index = NumericIndex::open(&path, false, 4).unwrap();
        let ids: BTreeSet<u64> = [10u64, 50].into_iter().collect();
        assert_eq!(index.get_offsets(&ids).unwrap(), vec![20]);
    }

    #[test]
    fn descending_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");

        let mut writer = NumericIndexWriter::create(&path, 64).unwrap();
        writer.push(10, 20).unwrap();
        assert!(writer.push(10, 30).is_err());
        assert!(writer.push(11, 20).is_err());
    }

    #[test]
    fn tiny_page_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NumericIndexWriter::create(dir.path().join("t.idx"), 32).is_err());
    }
}
