use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use convfeat_nn::{Layer, Sequential};
use convfeat_runtime::ThreadPool;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::io::{read_raw_features, write_result, OutputFormat};
use crate::preprocess::load_batch;

/// Top-level forward driver.
///
/// Batches inputs, runs them through the configured networks, and appends
/// each batch's output to the sink; nothing is buffered across batches.
pub struct Pipeline {
    feature_net: Option<Sequential>,
    reducer: Option<Sequential>,
    batch_size: usize,
}

impl Pipeline {
    pub fn new(
        feature_net: Option<Sequential>,
        reducer: Option<Sequential>,
        batch_size: usize,
    ) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Pipeline {
            feature_net,
            reducer,
            batch_size,
        }
    }

    /// Run the configured forward flow over `inputs`.
    ///
    /// With a feature network, every input is an image, processed in
    /// batches of up to `batch_size`. With only a reducer, the first input
    /// is read as a raw feature file and the rest are ignored.
    pub fn run<W: Write>(
        &self,
        inputs: &[PathBuf],
        sink: &mut W,
        format: OutputFormat,
        pool: &ThreadPool,
    ) -> Result<(), PipelineError> {
        let started = Instant::now();
        match (&self.feature_net, &self.reducer) {
            (Some(feature_net), reducer) => {
                let total = inputs.len();
                for (index, chunk) in inputs.chunks(self.batch_size).enumerate() {
                    let batch_started = Instant::now();
                    let mut batch = load_batch(chunk, pool);
                    batch = feature_net.forward(batch, pool);
                    if let Some(reducer) = reducer {
                        batch = reducer.forward(batch, pool);
                    }
                    write_result(sink, &batch, format)?;
                    let done = index * self.batch_size + chunk.len();
                    debug!(
                        "batch {:>4} ({:>6.2}%)\t{:?}",
                        index + 1,
                        100.0 * done as f64 / total as f64,
                        batch_started.elapsed()
                    );
                }
            }
            (None, Some(reducer)) => {
                let Some(first) = inputs.first() else {
                    return Ok(());
                };
                let features = read_raw_features(first)?;
                let reduced = reducer.forward(features, pool);
                write_result(sink, &reduced, format)?;
            }
            (None, None) => return Err(PipelineError::NoNetwork),
        }
        info!("forward finished in {:?}", started.elapsed());
        Ok(())
    }
}
