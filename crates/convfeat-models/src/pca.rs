use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use convfeat_nn::{Bias, Layer, Linear, Sequential};

use crate::error::ModelError;

/// Width of the feature vectors the reducer consumes.
pub const FEATURE_DIM: usize = 4096;

/// Bias-then-projection reducer taking `(B, 4096)` features to
/// `(B, components)`.
pub fn pca(components: usize) -> Sequential {
    Sequential::new()
        .add(Bias::new(FEATURE_DIM))
        .add(Linear::new(FEATURE_DIM, components).without_bias())
}

/// Build the reducer from `path`, deriving the component count from the
/// file size: `D = bytes / 4 / 4096 − 1`. The size must equal
/// `4 · 4096 · (D + 1)` exactly, with `D ≥ 1`.
pub fn load_pca(path: &Path) -> Result<Sequential, ModelError> {
    let file = File::open(path).map_err(|source| ModelError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let len = file
        .metadata()
        .map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    // One 4096-wide row of f32: the bias block, or one projection row.
    let block = 4 * FEATURE_DIM as u64;
    let rows = len / block;
    if rows < 2 || len != rows * block {
        return Err(ModelError::PcaSize {
            path: path.to_path_buf(),
            got: len,
        });
    }
    let components = (rows - 1) as usize;
    let mut net = pca(components);
    net.load(&mut BufReader::new(file))
        .map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convfeat_core::Tensor;
    use convfeat_runtime::ThreadPool;
    use std::io::Write;

    fn le_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_component_count_from_file_size() {
        // Three 4096-rows: one bias block plus two projection rows.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 4 * FEATURE_DIM * 3]).unwrap();
        let net = load_pca(file.path()).unwrap();
        assert_eq!(net.len(), 2);

        let pool = ThreadPool::new(2);
        let y = net.forward(Tensor::zeros(vec![1, FEATURE_DIM]), &pool);
        assert_eq!(y.shape_vec(), vec![1, 2]);
    }

    #[test]
    fn test_bias_then_projection_order() {
        // bias[0] = 1, projection row 0 has weight 2 at feature 0, so a zero
        // input maps to 1 * 2 = 2.
        let mut bias = vec![0.0f32; FEATURE_DIM];
        bias[0] = 1.0;
        let mut weight = vec![0.0f32; FEATURE_DIM];
        weight[0] = 2.0;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&le_bytes(&bias)).unwrap();
        file.write_all(&le_bytes(&weight)).unwrap();

        let net = load_pca(file.path()).unwrap();
        let pool = ThreadPool::new(2);
        let y = net.forward(Tensor::zeros(vec![1, FEATURE_DIM]), &pool);
        assert_eq!(y.shape_vec(), vec![1, 1]);
        assert_eq!(y.data(), &[2.0]);
    }

    #[test]
    fn test_rejects_truncated_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 4 * FEATURE_DIM * 2 - 4]).unwrap();
        assert!(matches!(
            load_pca(file.path()),
            Err(ModelError::PcaSize { .. })
        ));
    }

    #[test]
    fn test_rejects_bias_only_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 4 * FEATURE_DIM]).unwrap();
        assert!(matches!(
            load_pca(file.path()),
            Err(ModelError::PcaSize { .. })
        ));
    }
}
