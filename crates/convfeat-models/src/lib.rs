pub mod alexnet;
pub mod error;
pub mod pca;

pub use alexnet::{alexnet, load_alexnet, ALEXNET_WEIGHT_BYTES};
pub use error::ModelError;
pub use pca::{load_pca, pca};
