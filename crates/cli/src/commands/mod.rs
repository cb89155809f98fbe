mod normalize;
mod run;
mod watch;

pub(crate) use normalize::cmd_normalize;
pub(crate) use run::cmd_run;
pub(crate) use watch::cmd_watch;

use std::path::PathBuf;

use stagewatch_client::{ClientError, PollError};
use stagewatch_normalize::NormalizeError;

/// Anything that makes a client-side subcommand fail.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not start async runtime: {0}")]
    Runtime(std::io::Error),
}

/// Single-threaded runtime for the client subcommands. Requests still go
/// through the blocking pool, so overlapping polls work.
pub(crate) fn client_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

pub(crate) fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string())
}
