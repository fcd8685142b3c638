//! Asset pipeline errors.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Asset index not found at {} (was the asset pipeline run?)", .0.display())]
    IndexMissing(PathBuf),

    #[error("Invalid magic {found:?} in binary mesh (expected \"CGMF\")")]
    InvalidMagic { found: [u8; 4] },

    #[error("Unsupported binary mesh version {0} (only version 1 is supported)")]
    UnsupportedVersion(u32),

    #[error("Binary mesh truncated while reading {0}")]
    Truncated(&'static str),

    #[error("Mesh has no geometry: {positions} positions, {faces} faces")]
    ZeroGeometry { positions: usize, faces: usize },

    #[error("Malformed line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("Index {index} out of range (count={count})")]
    IndexOutOfRange { index: i64, count: usize },

    #[error("Failed to allocate {count} {what}")]
    Allocation { what: &'static str, count: usize },

    #[error("No free {kind} slot (capacity {capacity})")]
    RegistryFull { kind: &'static str, capacity: usize },

    #[error("Invalid mesh name '{name}' (must be 1 to {max} characters)")]
    InvalidName { name: String, max: usize },

    #[error("Texture data is {len} bytes, expected {width}x{height} RGBA8")]
    InvalidTexture { width: u32, height: u32, len: usize },

    #[error("An asset named '{0}' is already loaded")]
    DuplicateName(String),

    #[error("Metadata {} is missing required field '{field}'", .path.display())]
    MissingField { path: PathBuf, field: &'static str },

    #[error("Mesh '{0}' would create zero-sized GPU buffers")]
    ZeroSizedBuffer(String),

    #[error("GPU backend failed to create {what} for '{label}'")]
    BackendFailure { what: &'static str, label: String },

    #[error("Asset '{0}' has no valid GPU resources")]
    NoGpuResources(String),

    #[error("Unknown asset '{0}'")]
    UnknownAsset(String),

    #[error("Failed to decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl AssetError {
    /// Wrap an `io::Error`, mapping `NotFound` to [`AssetError::NotFound`].
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            AssetError::NotFound(path)
        } else {
            AssetError::Io { path, source }
        }
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        AssetError::MalformedLine {
            line,
            reason: reason.into(),
        }
    }
}

pub type AssetResult<T> = Result<T, AssetError>;
