use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while constructing a network from a weight file.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to open weight file \"{}\": {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("invalid size of weight file \"{}\": expected {expected} bytes, got {got}", path.display())]
    Size {
        path: PathBuf,
        expected: u64,
        got: u64,
    },

    #[error("invalid size of weight file \"{}\": {got} bytes is not 4*4096*(components + 1)", path.display())]
    PcaSize { path: PathBuf, got: u64 },

    #[error("failed to read weight file \"{}\": {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}
