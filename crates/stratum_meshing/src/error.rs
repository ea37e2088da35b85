//! # Meshing Error Types

use stratum_volume::{Region, VolumeError};
use thiserror::Error;

/// A single extraction pass failed. The worker keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// A chunk inside (or bordering) the region could not be paged in.
    #[error("sampling region {region} failed: {source}")]
    Volume {
        /// Region being extracted.
        region: Region,
        /// Underlying volume error.
        #[source]
        source: VolumeError,
    },

    /// A custom extractor gave up.
    #[error("extractor failed on region {region}: {reason}")]
    Extractor {
        /// Region being extracted.
        region: Region,
        /// Extractor supplied reason.
        reason: String,
    },

    /// The extractor panicked.
    #[error("extractor panicked on region {region}: {message}")]
    Panicked {
        /// Region being extracted.
        region: Region,
        /// Panic payload, if it was a string.
        message: String,
    },
}

/// The scheduler could not be started.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Configuration rejected before any thread was started.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// The OS refused to start a worker thread.
    #[error("failed to spawn extraction worker: {0}")]
    Spawn(#[from] std::io::Error),
}
