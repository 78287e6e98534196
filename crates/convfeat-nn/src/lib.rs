pub mod conv;
pub mod layers;
pub mod sequential;

pub use conv::{Conv2d, MaxPool2d};
pub use layers::{Bias, Layer, Linear, Relu, Reshape};
pub use sequential::Sequential;

/// Whether the vectorized kernel paths are compiled in.
pub const SIMD_ENABLED: bool = cfg!(feature = "simd");
