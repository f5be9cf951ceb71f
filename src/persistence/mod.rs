//! Snapshot persistence for engines and indexes.
//!
//! An engine snapshot is a directory of positionally aligned files (keys, packed signatures,
//! optional accumulators and strengths) plus a `config.json` record and an optional
//! `pool.bin`. An index snapshot is a single versioned `index.bin` holding keys, permutation
//! tables and orderings; it is realigned with an engine after loading.
//!
//! Writers stream through the [`Directory`] trait, so snapshots can target the filesystem
//! ([`FsDirectory`]) or memory ([`MemoryDirectory`]).
//!
//! ```rust
//! use pleb_lsh::hash::{SimHashConfig, SimHashEngine};
//! use pleb_lsh::persistence::{EngineReader, EngineWriter, MemoryDirectory, SaveOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = SimHashEngine::new(SimHashConfig::new(64).with_pool_size(1_000).with_seed(7))?;
//! engine.update("doc", "token", 1.0)?;
//! engine.finalize();
//!
//! let dir = MemoryDirectory::new();
//! EngineWriter::new(Box::new(dir.clone()), SaveOptions::default()).write_engine(&engine)?;
//! let loaded = EngineReader::open(Box::new(dir))?.load()?;
//! assert_eq!(loaded.bits("doc"), engine.bits("doc"));
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod engine;
pub mod error;
pub mod format;
pub mod index;

pub use directory::{Directory, FsDirectory, MemoryDirectory};
pub use engine::{EngineReader, EngineWriter, SaveOptions};
pub use error::{PersistenceError, PersistenceResult};
pub use format::EngineManifest;
pub use index::{IndexReader, IndexWriter};
