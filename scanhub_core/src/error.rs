use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the fleet coordination core. None of these are fatal
/// to the control-plane process; callers report them and carry on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown scanner type: {0}")]
    UnknownScanner(String),

    #[error("failed to launch scanner {key}: {source}")]
    LaunchFailed {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("snapshot walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("log store error: {0}")]
    Store(String),

    #[error("aggregation task failed: {0}")]
    Aggregation(String),
}
