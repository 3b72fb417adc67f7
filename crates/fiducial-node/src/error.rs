use crate::config::ConfigError;
use crate::transport::TransportError;
use fiducial_aruco::DictionaryError;
use std::path::PathBuf;

/// Startup failures; the node cannot run.
#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot load marker dictionary {path}: {source}")]
    Dictionary {
        path: PathBuf,
        #[source]
        source: DictionaryError,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}
