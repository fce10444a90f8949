//! Loading and authenticating upgrade inputs.
//!
//! Every input file carries a DFU suffix and is verified against the
//! expected device identity at load time, so a bad or mismatched image
//! never produces wire traffic.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::device::DeviceId;
use crate::suffix::{self, SuffixError};

/// Errors raised while loading an input file.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("problem reading file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed DFU suffix verification of {} (code {code})", .path.display(), code = .source.code())]
    Suffix {
        path: PathBuf,
        #[source]
        source: SuffixError,
    },
}

impl ImageError {
    /// Process exit code for this failure: suffix verification failures
    /// keep their stable codec codes, everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ImageError::Io { .. } => 1,
            ImageError::Suffix { source, .. } => i32::from(source.code()),
        }
    }
}

/// An upgrade input with its suffix verified and stripped.
#[derive(Debug, Clone)]
pub struct UpgradeImage {
    bytes: Vec<u8>,
}

impl UpgradeImage {
    /// Read `path`, verify its suffix against `expected` and strip it.
    pub fn load(path: impl AsRef<Path>, expected: &DeviceId) -> Result<UpgradeImage, ImageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_owned(),
            source,
        })?;

        tracing::info!("opened {}, {} bytes", path.display(), bytes.len());

        Self::from_file_bytes(bytes, expected).map_err(|source| ImageError::Suffix {
            path: path.to_owned(),
            source,
        })
    }

    /// Verify and strip the suffix of an in-memory file image.
    pub fn from_file_bytes(
        mut bytes: Vec<u8>,
        expected: &DeviceId,
    ) -> Result<UpgradeImage, SuffixError> {
        let payload_length = suffix::verify(&bytes, expected)?;
        bytes.truncate(payload_length);
        tracing::info!("no problem found with suffix");
        Ok(UpgradeImage { bytes })
    }

    /// The image payload, without the suffix.
    pub fn payload(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
