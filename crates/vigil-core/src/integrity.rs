//! Pinned SHA-256 digests for model files.
//!
//! A deployment pins the face-mesh model by digest; [`ModelDigest::verify`]
//! runs before the file is handed to the inference runtime.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("pinned digest must be 64 hex characters, got {0:?}")]
    MalformedDigest(String),

    #[error("cannot hash {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} does not match its pinned digest (pinned {pinned}, actual {actual})")]
    Mismatch {
        path: PathBuf,
        pinned: ModelDigest,
        actual: ModelDigest,
    },
}

/// A SHA-256 digest. Parses from hex in either case; displays as lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDigest([u8; 32]);

impl ModelDigest {
    /// Hash a file by streaming it through the hasher.
    pub fn of_file(path: &Path) -> Result<Self, ModelIntegrityError> {
        let io_err = |source| ModelIntegrityError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(io_err)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(io_err)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Ok(Self(bytes))
    }

    /// Check that the file at `path` hashes to this digest.
    pub fn verify(&self, path: &Path) -> Result<(), ModelIntegrityError> {
        let actual = Self::of_file(path)?;
        if actual != *self {
            return Err(ModelIntegrityError::Mismatch {
                path: path.to_path_buf(),
                pinned: *self,
                actual,
            });
        }
        tracing::debug!(path = %path.display(), digest = %actual, "model digest verified");
        Ok(())
    }
}

impl FromStr for ModelDigest {
    type Err = ModelIntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim();
        let malformed = || ModelIntegrityError::MalformedDigest(s.to_string());
        if hex.len() != 64 || !hex.is_ascii() {
            return Err(malformed());
        }

        let mut bytes = [0u8; 32];
        for (byte, pair) in bytes.iter_mut().zip(hex.as_bytes().chunks(2)) {
            let pair = std::str::from_utf8(pair).map_err(|_| malformed())?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| malformed())?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ModelDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}
