pub mod driver;
pub mod error;
pub mod io;
pub mod preprocess;

pub use driver::Pipeline;
pub use error::PipelineError;
pub use io::{read_raw_features, write_result, OutputFormat};
pub use preprocess::load_batch;
