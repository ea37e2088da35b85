//! # Volume Error Types
//!
//! All errors that can occur while paging, generating or persisting chunks.

use thiserror::Error;

use crate::chunk::ChunkCoord;
use crate::math::WorldPos;

/// The generation collaborator could not produce a chunk.
///
/// `Clone` because every caller waiting on the same coordinate receives the
/// first caller's outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The generator cannot work with the supplied world context.
    #[error("generator cannot bootstrap: {0}")]
    Bootstrap(String),

    /// Generation failed for a single chunk.
    #[error("generation failed for chunk {coord}: {reason}")]
    Failed {
        /// The chunk that could not be generated.
        coord: ChunkCoord,
        /// Collaborator supplied reason.
        reason: String,
    },

    /// The persistence collaborator failed while loading the chunk.
    #[error("loading chunk {coord} failed: {reason}")]
    Load {
        /// The chunk that could not be loaded.
        coord: ChunkCoord,
        /// Underlying persistence error, rendered.
        reason: String,
    },
}

/// The persistence collaborator failed.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Filesystem error.
    #[error("i/o error for chunk {coord}: {source}")]
    Io {
        /// Chunk being read or written.
        coord: ChunkCoord,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored payload cannot be decoded.
    #[error("corrupt payload for chunk {coord}: {reason}")]
    Corrupt {
        /// Chunk being read.
        coord: ChunkCoord,
        /// What was wrong.
        reason: String,
    },
}

/// World context could not be parsed or is out of range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// TOML text could not be parsed.
    #[error("cannot parse world context: {0}")]
    Parse(String),

    /// A parameter is out of its valid range.
    #[error("invalid world context parameter `{name}`: {reason}")]
    Invalid {
        /// Parameter name.
        name: &'static str,
        /// What was wrong.
        reason: String,
    },
}

/// Errors surfaced by `VoxelVolume` writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// The position lies outside the configured volume bounds.
    #[error("position {0} is outside the volume")]
    OutOfBounds(WorldPos),

    /// The owning chunk could not be generated.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Result type for volume operations.
pub type VolumeResult<T> = Result<T, VolumeError>;
