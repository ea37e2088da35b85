//! # World Error Types

use std::path::PathBuf;

use stratum_meshing::SchedulerError;
use stratum_volume::{ContextError, GenerationError, PersistenceError, VolumeError, WorldPos};
use thiserror::Error;

/// Errors surfaced by the world facade.
#[derive(Error, Debug)]
pub enum WorldError {
    /// Configuration value out of range.
    #[error("invalid world configuration `{field}`: {reason}")]
    Config {
        /// Offending field.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// Configuration file could not be read.
    #[error("cannot read world configuration {path}: {source}")]
    ConfigIo {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration text could not be parsed.
    #[error("cannot parse world configuration: {0}")]
    ConfigParse(String),

    /// Generation parameters rejected.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The generator could not bootstrap, or a chunk could not be produced.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// A voxel write failed.
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// Chunks could not be saved or the persistence directory opened.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The persistence directory could not be prepared.
    #[error("cannot open chunk directory {path}: {source}")]
    PersistenceDir {
        /// Directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The extraction worker pool could not be started.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The world was used before `init` or after `shutdown`.
    #[error("world is not initialized")]
    NotInitialized,

    /// `init` was called on a running world.
    #[error("world is already initialized")]
    AlreadyInitialized,
}

/// Why a path search failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    /// The open set ran dry: the goal is unreachable.
    #[error("no path from {start} to {goal}")]
    NoPath {
        /// Search start.
        start: WorldPos,
        /// Search goal.
        goal: WorldPos,
    },

    /// The expansion budget ran out before reaching the goal.
    #[error("path search from {start} to {goal} gave up after {iterations} expansions")]
    BudgetExhausted {
        /// Search start.
        start: WorldPos,
        /// Search goal.
        goal: WorldPos,
        /// Expansions performed.
        iterations: usize,
    },

    /// Start or goal is blocked.
    #[error("endpoint {0} is blocked")]
    BlockedEndpoint(WorldPos),

    /// The world was not initialized.
    #[error("world is not initialized")]
    NotInitialized,
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
