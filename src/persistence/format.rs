//! On-disk layout of engine and index snapshots.
//!
//! # Engine snapshot
//!
//! ```text
//! <dir>/
//! ├── config.json       # EngineManifest; written last, so its presence marks a complete snapshot
//! ├── pool.bin          # optional: projection pool + salts
//! ├── keys.txt          # one key per line
//! ├── signatures.bin    # num_bits/8 bytes per key, key-file order
//! ├── sums.bin          # optional: num_bits LE f32 per key (resumable accumulation)
//! └── strength.txt      # optional: one integer per line
//! ```
//!
//! All per-key files are positionally aligned with `keys.txt`; any length mismatch fails the
//! load before an engine is returned.
//!
//! # `pool.bin`
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Magic (4B): "PLBP"           │
//! │ Version (4B LE)              │
//! │ Pool length (8B LE)          │
//! │ Salt count (4B LE)           │
//! │ Pool: f64 LE × pool length   │
//! │ Salts: u64 LE × salt count   │
//! └──────────────────────────────┘
//! ```
//!
//! # `index.bin`
//!
//! Signature bytes are *not* stored; a loaded index must be realigned with an engine.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Magic (4B): "PLBX"                       │
//! │ Version (4B LE)                          │
//! │ Sort order tag (1B)                      │
//! │ Signature bytes (4B LE)                  │
//! │ Key count n (4B LE)                      │
//! │ Permutation count P (4B LE)              │
//! │ Keys: (len u32 LE, UTF-8 bytes) × n      │
//! │ Permutation tables: u32 LE × bytes × P   │
//! │ Orderings: u32 LE × n × P                │
//! └──────────────────────────────────────────┘
//! ```

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::hash::SimHashConfig;
use crate::persistence::error::{PersistenceError, PersistenceResult};

/// Magic bytes for pool files.
pub const POOL_MAGIC: [u8; 4] = *b"PLBP";

/// Magic bytes for index files.
pub const INDEX_MAGIC: [u8; 4] = *b"PLBX";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

pub const CONFIG_FILE: &str = "config.json";
pub const POOL_FILE: &str = "pool.bin";
pub const KEYS_FILE: &str = "keys.txt";
pub const SIGNATURES_FILE: &str = "signatures.bin";
pub const SUMS_FILE: &str = "sums.bin";
pub const STRENGTH_FILE: &str = "strength.txt";
pub const INDEX_FILE: &str = "index.bin";

/// Engine configuration record (`config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineManifest {
    /// Format version
    pub version: u32,
    /// Engine parameters; `seed` is the one actually used
    pub config: SimHashConfig,
    /// Number of keys in `keys.txt`
    pub num_keys: u64,
    /// `pool.bin` present
    pub pool_embedded: bool,
    /// `sums.bin` present
    pub has_sums: bool,
    /// `strength.txt` present
    pub has_strength: bool,
}

impl EngineManifest {
    pub fn check_version(&self) -> PersistenceResult<()> {
        if self.version != FORMAT_VERSION {
            return Err(PersistenceError::Format(format!(
                "unsupported engine snapshot version {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }
}

pub(crate) fn write_u32<W: Write + ?Sized>(w: &mut W, v: u32) -> PersistenceResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u64<W: Write + ?Sized>(w: &mut W, v: u64) -> PersistenceResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Read exactly `N` bytes, reporting truncation as a format error.
fn read_array<R: Read + ?Sized, const N: usize>(r: &mut R, what: &str) -> PersistenceResult<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            PersistenceError::Format(format!("truncated while reading {what}"))
        }
        _ => PersistenceError::Io(e),
    })?;
    Ok(buf)
}

pub(crate) fn read_u8<R: Read + ?Sized>(r: &mut R, what: &str) -> PersistenceResult<u8> {
    Ok(read_array::<R, 1>(r, what)?[0])
}

pub(crate) fn read_u32<R: Read + ?Sized>(r: &mut R, what: &str) -> PersistenceResult<u32> {
    Ok(u32::from_le_bytes(read_array(r, what)?))
}

pub(crate) fn read_u64<R: Read + ?Sized>(r: &mut R, what: &str) -> PersistenceResult<u64> {
    Ok(u64::from_le_bytes(read_array(r, what)?))
}

pub(crate) fn read_magic<R: Read + ?Sized>(r: &mut R, expected: [u8; 4]) -> PersistenceResult<()> {
    let magic: [u8; 4] = read_array(r, "magic bytes")?;
    if magic != expected {
        return Err(PersistenceError::Format(format!(
            "bad magic bytes {:?} (expected {:?})",
            magic, expected
        )));
    }
    let version = read_u32(r, "format version")?;
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Format(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }
    Ok(())
}

/// Fail unless the reader is exhausted.
pub(crate) fn expect_eof<R: Read + ?Sized>(r: &mut R, what: &str) -> PersistenceResult<()> {
    let mut probe = [0u8; 1];
    if r.read(&mut probe)? != 0 {
        return Err(PersistenceError::Format(format!("trailing bytes after {what}")));
    }
    Ok(())
}

/// Split newline-delimited text into lines; a single trailing newline is optional.
pub(crate) fn split_lines(data: &[u8], what: &str) -> PersistenceResult<Vec<String>> {
    let text = std::str::from_utf8(data)
        .map_err(|e| PersistenceError::Format(format!("{what} is not UTF-8: {e}")))?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let text = text.strip_suffix('\n').unwrap_or(text);
    Ok(text.split('\n').map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn manifest_serde() {
        let manifest = EngineManifest {
            version: FORMAT_VERSION,
            config: SimHashConfig::new(64).with_seed(9),
            num_keys: 3,
            pool_embedded: true,
            has_sums: false,
            has_strength: true,
        };
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let parsed: EngineManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn magic_and_version_are_checked() {
        let mut good = Vec::new();
        good.extend_from_slice(&INDEX_MAGIC);
        write_u32(&mut good, FORMAT_VERSION).unwrap();
        assert!(read_magic(&mut Cursor::new(&good), INDEX_MAGIC).is_ok());
        assert!(read_magic(&mut Cursor::new(&good), POOL_MAGIC).is_err());

        let mut future = Vec::new();
        future.extend_from_slice(&INDEX_MAGIC);
        write_u32(&mut future, FORMAT_VERSION + 1).unwrap();
        assert!(read_magic(&mut Cursor::new(&future), INDEX_MAGIC).is_err());
    }

    #[test]
    fn truncation_is_a_format_error() {
        let mut r = Cursor::new(vec![1u8, 2]);
        assert!(matches!(
            read_u32(&mut r, "count"),
            Err(PersistenceError::Format(_))
        ));
    }

    #[test]
    fn lines_with_and_without_trailing_newline() {
        assert_eq!(split_lines(b"a\nb\n", "keys").unwrap(), vec!["a", "b"]);
        assert_eq!(split_lines(b"a\nb", "keys").unwrap(), vec!["a", "b"]);
        assert_eq!(split_lines(b"\n", "keys").unwrap(), vec![""]);
        assert!(split_lines(b"", "keys").unwrap().is_empty());
        assert!(split_lines(&[0xFF], "keys").is_err());
    }
}
