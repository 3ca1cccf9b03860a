use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tandem_core::Error),
    #[error(transparent)]
    Remote(#[from] tandem_core::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Edited file content is unchanged")]
    Unchanged,
    #[error("No {0} found for id/prefix: {1}")]
    NotFound(&'static str, String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `tandem config init --api-base-url <URL> --owner-id <ID>`, or set TANDEM_API_BASE_URL and TANDEM_OWNER_ID."
    )]
    SyncNotConfigured,
    #[error("Sync finished with {0} failed item(s)")]
    SyncIncomplete(usize),
}
