//! Error types for the worker binary.

use kinquest_types::enums::PeriodBucket;
use thiserror::Error;

/// Errors surfaced by worker startup and the scheduling loop.
///
/// Store failures never appear here: a failed reset is retried and then
/// abandoned until the next boundary rather than crashing the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Configuration could not be loaded or parsed.
    #[error("config error: {source}")]
    Config {
        /// Underlying configuration error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// No upcoming boundary instant exists for a bucket.
    #[error("schedule error: no next boundary for {bucket:?}")]
    Schedule {
        /// Bucket whose boundary could not be computed.
        bucket: PeriodBucket,
    },
}
