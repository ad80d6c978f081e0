//! JSON sidecar read/write shared by file and group descriptors.

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};
use snafu::prelude::*;

use crate::{
    error::ErrorClass,
    storage::{self, StorageError},
};

/// Errors raised while loading or persisting a descriptor.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DescriptorError {
    /// The descriptor file could not be read or written.
    #[snafu(display("Descriptor I/O failed: {source}"))]
    Storage {
        /// Underlying storage error carrying the path.
        source: StorageError,
    },

    /// The descriptor file is not valid JSON for the expected type.
    #[snafu(display("Failed to parse descriptor {path}: {source}"))]
    Decode {
        /// Path of the descriptor.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The descriptor could not be serialized.
    #[snafu(display("Failed to serialize descriptor {path}: {source}"))]
    Encode {
        /// Path of the descriptor.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl DescriptorError {
    /// Classify this error for caller-side handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            DescriptorError::Storage { .. } | DescriptorError::Encode { .. } => ErrorClass::Io,
            DescriptorError::Decode { .. } => ErrorClass::Parse,
        }
    }
}

pub(crate) fn read_descriptor<T: DeserializeOwned>(path: &Path) -> Result<T, DescriptorError> {
    let json = storage::read_to_string(path).context(StorageSnafu)?;
    serde_json::from_str(&json).context(DecodeSnafu {
        path: path.display().to_string(),
    })
}

pub(crate) fn write_descriptor<T: Serialize>(path: &Path, value: &T) -> Result<(), DescriptorError> {
    let json = serde_json::to_vec_pretty(value).context(EncodeSnafu {
        path: path.display().to_string(),
    })?;
    storage::write_atomic(path, &json).context(StorageSnafu)
}
