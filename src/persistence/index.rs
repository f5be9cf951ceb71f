//! Index snapshots (`index.bin`).
//!
//! Only the structure is stored: keys, permutation tables and orderings. Signature bytes live
//! in the engine snapshot, so a loaded index answers queries only after
//! [`NeighborIndex::realign`].

use std::io::{Read, Write};

use tracing::info;

use crate::persistence::directory::Directory;
use crate::persistence::error::{PersistenceError, PersistenceResult};
use crate::persistence::format::{
    expect_eof, read_magic, read_u32, read_u8, write_u32, FORMAT_VERSION, INDEX_FILE,
    INDEX_MAGIC,
};
use crate::pleb::{NeighborIndex, SortOrder};

/// Writes a [`NeighborIndex`] into a directory.
pub struct IndexWriter {
    directory: Box<dyn Directory>,
}

impl IndexWriter {
    pub fn new(directory: Box<dyn Directory>) -> Self {
        Self { directory }
    }

    pub fn write_index(&mut self, index: &NeighborIndex) -> PersistenceResult<()> {
        let n = index.len();
        let mut buf = Vec::with_capacity(
            21 + n * 8 + index.num_permutations() * (index.num_bytes() + n) * 4,
        );
        buf.extend_from_slice(&INDEX_MAGIC);
        write_u32(&mut buf, FORMAT_VERSION)?;
        buf.push(index.order().tag());
        write_u32(&mut buf, to_u32(index.num_bytes(), "signature bytes")?)?;
        write_u32(&mut buf, to_u32(n, "key count")?)?;
        write_u32(&mut buf, to_u32(index.num_permutations(), "permutation count")?)?;

        for key in index.keys() {
            write_u32(&mut buf, to_u32(key.len(), "key length")?)?;
            buf.write_all(key.as_bytes())?;
        }
        for perm in index.permutations() {
            for &p in perm {
                write_u32(&mut buf, p)?;
            }
        }
        for ordering in index.orderings() {
            for &id in ordering {
                write_u32(&mut buf, id)?;
            }
        }

        self.directory.atomic_write(INDEX_FILE, &buf)?;
        info!(
            keys = n,
            permutations = index.num_permutations(),
            bytes = buf.len(),
            "index snapshot written"
        );
        Ok(())
    }
}

/// Loads a [`NeighborIndex`] written by [`IndexWriter`].
pub struct IndexReader;

impl IndexReader {
    /// Load the index structure. The result is not aligned with any signatures yet.
    pub fn load(directory: &dyn Directory) -> PersistenceResult<NeighborIndex> {
        let mut r = directory.open_file(INDEX_FILE)?;
        read_magic(&mut r, INDEX_MAGIC)?;

        let tag = read_u8(&mut r, "sort order")?;
        let order = SortOrder::from_tag(tag)
            .ok_or_else(|| PersistenceError::Format(format!("unknown sort order tag {tag}")))?;
        let num_bytes = read_u32(&mut r, "signature bytes")? as usize;
        let n = read_u32(&mut r, "key count")? as usize;
        let num_perms = read_u32(&mut r, "permutation count")? as usize;

        let mut keys = Vec::with_capacity(n.min(1 << 20));
        for i in 0..n {
            let len = read_u32(&mut r, "key length")? as usize;
            let mut raw = Vec::new();
            (&mut r).take(len as u64).read_to_end(&mut raw)?;
            if raw.len() != len {
                return Err(PersistenceError::Format(format!(
                    "truncated while reading key {i}"
                )));
            }
            let key = String::from_utf8(raw)
                .map_err(|_| PersistenceError::Format(format!("key {i} is not UTF-8")))?;
            keys.push(key);
        }

        let mut permutations = Vec::with_capacity(num_perms.min(1 << 16));
        for _ in 0..num_perms {
            permutations.push(read_u32_vec(&mut r, num_bytes, "permutation table")?);
        }
        let mut orderings = Vec::with_capacity(num_perms.min(1 << 16));
        for _ in 0..num_perms {
            orderings.push(read_u32_vec(&mut r, n, "ordering")?);
        }
        expect_eof(&mut r, INDEX_FILE)?;

        let index = NeighborIndex::from_parts(keys, num_bytes, order, permutations, orderings)
            .map_err(|e| PersistenceError::Format(e.to_string()))?;
        info!(keys = n, permutations = num_perms, "index snapshot loaded");
        Ok(index)
    }
}

fn read_u32_vec<R: Read + ?Sized>(r: &mut R, len: usize, what: &str) -> PersistenceResult<Vec<u32>> {
    (0..len).map(|_| read_u32(r, what)).collect()
}

fn to_u32(v: usize, what: &str) -> PersistenceResult<u32> {
    u32::try_from(v)
        .map_err(|_| PersistenceError::InvalidState(format!("{what} {v} does not fit in u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::directory::MemoryDirectory;
    use crate::pleb::IndexConfig;

    fn sample() -> NeighborIndex {
        let entries = vec![
            ("alpha", vec![0x00u8, 0x0F]),
            ("beta", vec![0x01, 0x0F]),
            ("gamma", vec![0xF0, 0xFF]),
            ("delta", vec![0xF1, 0xFE]),
        ];
        NeighborIndex::build(entries, &IndexConfig::new(3).with_order(SortOrder::Gray)).unwrap()
    }

    #[test]
    fn structure_survives_round_trip() {
        let index = sample();
        let dir = MemoryDirectory::new();
        IndexWriter::new(Box::new(dir.clone()))
            .write_index(&index)
            .unwrap();

        let loaded = IndexReader::load(&dir).unwrap();
        assert_eq!(loaded.keys(), index.keys());
        assert_eq!(loaded.order(), SortOrder::Gray);
        assert_eq!(loaded.num_bytes(), 2);
        assert_eq!(loaded.permutations(), index.permutations());
        assert_eq!(loaded.orderings(), index.orderings());
        assert!(!loaded.is_aligned());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let dir = MemoryDirectory::new();
        IndexWriter::new(Box::new(dir.clone()))
            .write_index(&sample())
            .unwrap();
        let mut data = dir.read_all(INDEX_FILE).unwrap();
        data.push(0);
        dir.put(INDEX_FILE, data);
        assert!(matches!(
            IndexReader::load(&dir),
            Err(PersistenceError::Format(_))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = MemoryDirectory::new();
        IndexWriter::new(Box::new(dir.clone()))
            .write_index(&sample())
            .unwrap();
        let mut data = dir.read_all(INDEX_FILE).unwrap();
        data.truncate(data.len() - 3);
        dir.put(INDEX_FILE, data);
        assert!(matches!(
            IndexReader::load(&dir),
            Err(PersistenceError::Format(_))
        ));
    }

    #[test]
    fn corrupted_ordering_is_rejected() {
        let dir = MemoryDirectory::new();
        IndexWriter::new(Box::new(dir.clone()))
            .write_index(&sample())
            .unwrap();
        let mut data = dir.read_all(INDEX_FILE).unwrap();
        // Last u32 is an id in the final ordering; point it out of range.
        let end = data.len();
        data[end - 4..].copy_from_slice(&99u32.to_le_bytes());
        dir.put(INDEX_FILE, data);
        assert!(matches!(
            IndexReader::load(&dir),
            Err(PersistenceError::Format(_))
        ));
    }

    #[test]
    fn oversized_key_length_is_a_format_error() {
        let mut data = Vec::new();
        data.extend_from_slice(&INDEX_MAGIC);
        write_u32(&mut data, FORMAT_VERSION).unwrap();
        data.push(SortOrder::Lexicographic.tag());
        write_u32(&mut data, 2).unwrap();
        write_u32(&mut data, 1).unwrap();
        write_u32(&mut data, 1).unwrap();
        // Key length claims ~4 GiB but only three bytes follow.
        write_u32(&mut data, u32::MAX).unwrap();
        data.extend_from_slice(b"abc");

        let dir = MemoryDirectory::new();
        dir.put(INDEX_FILE, data);
        assert!(matches!(
            IndexReader::load(&dir),
            Err(PersistenceError::Format(_))
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = MemoryDirectory::new();
        assert!(matches!(
            IndexReader::load(&dir),
            Err(PersistenceError::NotFound(_))
        ));
    }
}
