//! Engine snapshots: configuration record plus the positionally aligned signature files.

use std::collections::HashMap;
use std::io::{Read, Write};

use tracing::{debug, info};

use crate::hash::signature::pack_signs;
use crate::hash::{ProjectionPool, Signature, SimHashEngine};
use crate::persistence::directory::Directory;
use crate::persistence::error::{PersistenceError, PersistenceResult};
use crate::persistence::format::{
    read_magic, read_u32, read_u64, split_lines, write_u32, write_u64,
    EngineManifest, CONFIG_FILE, FORMAT_VERSION, KEYS_FILE, POOL_FILE, POOL_MAGIC,
    SIGNATURES_FILE, STRENGTH_FILE, SUMS_FILE,
};

/// What to include in an engine snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Write `pool.bin`. Disable when the pool is shared across a deployment.
    pub embed_pool: bool,
    /// Write raw accumulators so accumulation can resume after loading.
    pub write_sums: bool,
    pub write_strength: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            embed_pool: true,
            write_sums: false,
            write_strength: true,
        }
    }
}

/// Writes an engine snapshot into a directory.
pub struct EngineWriter {
    directory: Box<dyn Directory>,
    options: SaveOptions,
}

impl EngineWriter {
    pub fn new(directory: Box<dyn Directory>, options: SaveOptions) -> Self {
        Self { directory, options }
    }

    /// Write `engine`. Keys are written in sorted order.
    ///
    /// Signatures that were never built are packed from their accumulators on the way out.
    /// Every file is encoded before anything on disk changes, so a rejected engine leaves an
    /// existing snapshot untouched. `config.json` is removed before the first data file is
    /// replaced and written again last, so a write that fails part way leaves no loadable
    /// snapshot behind.
    pub fn write_engine(&mut self, engine: &SimHashEngine) -> PersistenceResult<()> {
        let num_bytes = engine.num_bits() / 8;
        let mut entries: Vec<(&str, &Signature)> = engine.signatures().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut keys = Vec::new();
        let mut bits = Vec::with_capacity(entries.len() * num_bytes);
        for (key, signature) in &entries {
            if key.contains('\n') {
                return Err(PersistenceError::InvalidState(format!(
                    "key {key:?} contains a newline and cannot be written to {KEYS_FILE}"
                )));
            }
            keys.extend_from_slice(key.as_bytes());
            keys.push(b'\n');
            match (signature.bits(), signature.sums()) {
                (Some(packed), _) => bits.extend_from_slice(packed),
                (None, Some(sums)) => bits.extend_from_slice(&pack_signs(sums)),
                (None, None) => {
                    return Err(PersistenceError::InvalidState(format!(
                        "signature for {key:?} has neither bits nor accumulators"
                    )))
                }
            }
        }

        let sums = if self.options.write_sums {
            let mut buf = Vec::with_capacity(entries.len() * engine.num_bits() * 4);
            for (key, signature) in &entries {
                let sums = signature.sums().ok_or_else(|| {
                    PersistenceError::InvalidState(format!(
                        "accumulators for {key:?} were discarded; cannot write {SUMS_FILE}"
                    ))
                })?;
                for s in sums {
                    buf.extend_from_slice(&s.to_le_bytes());
                }
            }
            Some(buf)
        } else {
            None
        };

        let strength = self.options.write_strength.then(|| {
            entries
                .iter()
                .map(|(_, signature)| format!("{}\n", signature.strength()))
                .collect::<String>()
                .into_bytes()
        });

        let manifest = EngineManifest {
            version: FORMAT_VERSION,
            config: engine.config().clone(),
            num_keys: entries.len() as u64,
            pool_embedded: self.options.embed_pool,
            has_sums: sums.is_some(),
            has_strength: strength.is_some(),
        };
        let json = serde_json::to_vec_pretty(&manifest)?;

        self.directory.delete(CONFIG_FILE)?;

        if self.options.embed_pool {
            self.write_pool(engine.pool())?;
        } else {
            self.directory.delete(POOL_FILE)?;
        }
        self.write_file(KEYS_FILE, &keys)?;
        self.write_file(SIGNATURES_FILE, &bits)?;
        match &sums {
            Some(buf) => self.write_file(SUMS_FILE, buf)?,
            None => self.directory.delete(SUMS_FILE)?,
        }
        match &strength {
            Some(buf) => self.write_file(STRENGTH_FILE, buf)?,
            None => self.directory.delete(STRENGTH_FILE)?,
        }

        self.directory.atomic_write(CONFIG_FILE, &json)?;

        info!(
            keys = entries.len(),
            num_bytes,
            pool = self.options.embed_pool,
            sums = manifest.has_sums,
            "engine snapshot written"
        );
        Ok(())
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        let mut file = self.directory.create_file(path)?;
        file.write_all(data)?;
        file.flush()?;
        debug!(path, bytes = data.len(), "snapshot file written");
        Ok(())
    }

    fn write_pool(&mut self, pool: &ProjectionPool) -> PersistenceResult<()> {
        let mut buf = Vec::with_capacity(20 + pool.pool().len() * 8 + pool.salts().len() * 8);
        buf.extend_from_slice(&POOL_MAGIC);
        write_u32(&mut buf, FORMAT_VERSION)?;
        write_u64(&mut buf, pool.pool().len() as u64)?;
        write_u32(&mut buf, pool.salts().len() as u32)?;
        for v in pool.pool() {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for s in pool.salts() {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        self.directory.atomic_write(POOL_FILE, &buf)?;
        debug!(pool_len = pool.pool().len(), salts = pool.salts().len(), "pool written");
        Ok(())
    }
}

/// Loads an engine snapshot.
pub struct EngineReader {
    directory: Box<dyn Directory>,
    manifest: EngineManifest,
}

impl EngineReader {
    /// Open a snapshot and read its configuration record.
    pub fn open(directory: Box<dyn Directory>) -> PersistenceResult<Self> {
        let data = directory.read_all(CONFIG_FILE)?;
        let manifest: EngineManifest = serde_json::from_slice(&data)?;
        manifest.check_version()?;
        manifest
            .config
            .validate()
            .map_err(|e| PersistenceError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            directory,
            manifest,
        })
    }

    pub fn manifest(&self) -> &EngineManifest {
        &self.manifest
    }

    /// Load the embedded pool, if the snapshot has one.
    pub fn load_pool(&self) -> PersistenceResult<ProjectionPool> {
        if !self.manifest.pool_embedded {
            return Err(PersistenceError::NotFound(format!(
                "{POOL_FILE} (snapshot was written without its pool; supply the shared pool)"
            )));
        }
        let mut r = self.directory.open_file(POOL_FILE)?;
        read_magic(&mut r, POOL_MAGIC)?;
        let pool_len = read_u64(&mut r, "pool length")? as usize;
        let num_salts = read_u32(&mut r, "salt count")? as usize;
        if num_salts != self.manifest.config.num_bits {
            return Err(PersistenceError::Format(format!(
                "{POOL_FILE} has {num_salts} salts for {} bits",
                self.manifest.config.num_bits
            )));
        }
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        let expected = pool_len
            .checked_mul(8)
            .and_then(|p| p.checked_add(num_salts * 8))
            .ok_or_else(|| PersistenceError::Format("pool length overflows".to_string()))?;
        if data.len() != expected {
            return Err(PersistenceError::Format(format!(
                "{POOL_FILE} body is {} bytes, expected {expected}",
                data.len()
            )));
        }
        let (pool_bytes, salt_bytes) = data.split_at(pool_len * 8);
        let pool = pool_bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        let salts = salt_bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        let seed = self.manifest.config.seed.unwrap_or(0);
        ProjectionPool::from_parts(pool, salts, seed)
            .map_err(|e| PersistenceError::Format(e.to_string()))
    }

    /// Load the engine with its embedded pool.
    pub fn load(&self) -> PersistenceResult<SimHashEngine> {
        let pool = self.load_pool()?;
        self.load_with_pool(pool)
    }

    /// Load the engine around a caller-supplied (shared) pool.
    pub fn load_with_pool(&self, pool: ProjectionPool) -> PersistenceResult<SimHashEngine> {
        let config = self.manifest.config.clone();
        if pool.num_bits() != config.num_bits {
            return Err(PersistenceError::InvalidConfig(format!(
                "pool has {} salts, snapshot has {} bits",
                pool.num_bits(),
                config.num_bits
            )));
        }
        let num_bits = config.num_bits;
        let num_bytes = num_bits / 8;

        let keys = split_lines(&self.directory.read_all(KEYS_FILE)?, KEYS_FILE)?;
        let n = keys.len();
        if n as u64 != self.manifest.num_keys {
            return Err(PersistenceError::Format(format!(
                "{KEYS_FILE} has {n} keys, config records {}",
                self.manifest.num_keys
            )));
        }

        let bits = self.directory.read_all(SIGNATURES_FILE)?;
        check_len(SIGNATURES_FILE, bits.len(), n * num_bytes)?;

        let sums = if self.manifest.has_sums {
            let raw = self.directory.read_all(SUMS_FILE)?;
            check_len(SUMS_FILE, raw.len(), n * num_bits * 4)?;
            Some(raw)
        } else {
            None
        };

        let strengths = if self.manifest.has_strength {
            let lines = split_lines(&self.directory.read_all(STRENGTH_FILE)?, STRENGTH_FILE)?;
            check_len(STRENGTH_FILE, lines.len(), n)?;
            let parsed = lines
                .iter()
                .map(|l| {
                    l.trim().parse::<u64>().map_err(|_| {
                        PersistenceError::Format(format!("bad strength value {l:?}"))
                    })
                })
                .collect::<PersistenceResult<Vec<u64>>>()?;
            Some(parsed)
        } else {
            None
        };

        let mut signatures = HashMap::with_capacity(n);
        for (i, key) in keys.into_iter().enumerate() {
            let sig_bits = bits[i * num_bytes..(i + 1) * num_bytes].to_vec();
            let sig_sums = sums.as_ref().map(|raw| {
                raw[i * num_bits * 4..(i + 1) * num_bits * 4]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            });
            let strength = strengths.as_ref().map_or(0, |s| s[i]);
            if signatures
                .insert(key, Signature::from_parts(Some(sig_bits), sig_sums, strength))
                .is_some()
            {
                return Err(PersistenceError::Format(format!(
                    "duplicate key at line {} of {KEYS_FILE}",
                    i + 1
                )));
            }
        }

        info!(keys = n, num_bits, sums = sums.is_some(), "engine snapshot loaded");
        Ok(SimHashEngine::from_parts(config, pool, signatures))
    }
}

fn check_len(file: &str, actual: usize, expected: usize) -> PersistenceResult<()> {
    if actual != expected {
        return Err(PersistenceError::Format(format!(
            "{file} is misaligned with {KEYS_FILE}: {actual} entries/bytes, expected {expected}"
        )));
    }
    Ok(())
}
