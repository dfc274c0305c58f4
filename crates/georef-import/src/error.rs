use georef_storage::StoreError;
use std::path::PathBuf;

/// Conditions that stop a pipeline run. Recoverable anomalies (malformed
/// rows, orphans, rejected records) are counted in the summary instead.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read dump {path}: {source}")]
    ReadDump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("import cancelled")]
    Cancelled,
}
