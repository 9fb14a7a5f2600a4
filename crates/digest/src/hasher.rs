//! Streaming hasher producing [`Digest`] values

use crate::{Algorithm, Digest, Error, Result};
use sha2::Digest as _;
use std::fs;
use std::io::Read;
use std::path::Path;

const READ_BUF_SIZE: usize = 64 * 1024;

enum State {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
}

/// Incremental hasher for a single [`Algorithm`]
pub struct Hasher {
    state: State,
    bytes_hashed: u64,
}

impl Hasher {
    /// Create a hasher for `algorithm`
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        let state = match algorithm {
            Algorithm::Sha256 => State::Sha256(sha2::Sha256::new()),
            Algorithm::Sha384 => State::Sha384(sha2::Sha384::new()),
        };
        Self {
            state,
            bytes_hashed: 0,
        }
    }

    /// Feed bytes into the hasher
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        match &mut self.state {
            State::Sha256(h) => h.update(data),
            State::Sha384(h) => h.update(data),
        }
        self.bytes_hashed += data.len() as u64;
        self
    }

    /// Stream the contents of `path` into the hasher.
    ///
    /// Returns the number of content bytes read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or read.
    pub fn update_file(&mut self, path: &Path) -> Result<u64> {
        let _span = tracing::trace_span!("hash_file", path = %path.display()).entered();
        let mut file = fs::File::open(path).map_err(|e| Error::io(e, path, "open"))?;
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = file.read(&mut buf).map_err(|e| Error::io(e, path, "read"))?;
            if n == 0 {
                break;
            }
            self.update(&buf[..n]);
            total += n as u64;
        }
        tracing::trace!(path = %path.display(), size = total, "Hashed file");
        Ok(total)
    }

    /// Total number of bytes fed so far
    #[must_use]
    pub const fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// Consume the hasher and produce the digest
    #[must_use]
    pub fn finalize(self) -> Digest {
        match self.state {
            State::Sha256(h) => Digest::from_hasher_output(Algorithm::Sha256, h.finalize().as_slice()),
            State::Sha384(h) => Digest::from_hasher_output(Algorithm::Sha384, h.finalize().as_slice()),
        }
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(Algorithm::DEFAULT)
    }
}
