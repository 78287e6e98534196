use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the forward driver and its file I/O.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("at least one of the feature network and the reducer is required")]
    NoNetwork,

    #[error("failed to open raw feature file \"{}\": {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("invalid size of raw feature file \"{}\": {got} bytes is not a positive multiple of 4*4096", path.display())]
    RawFeatureSize { path: PathBuf, got: u64 },

    #[error("failed to read raw feature file \"{}\": {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write results: {0}")]
    Write(#[from] io::Error),
}
