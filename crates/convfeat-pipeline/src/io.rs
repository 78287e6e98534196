use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use convfeat_core::Tensor;

use crate::error::PipelineError;

/// Width of one raw feature row.
const FEATURE_DIM: usize = 4096;
const ROW_BYTES: u64 = 4 * FEATURE_DIM as u64;

/// Output encoding for result tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Binary,
}

/// Read a raw feature file: a little-endian f32 stream whose byte length
/// must be a positive multiple of one 4096-wide row. Returns an
/// `(n, 4096)` tensor.
pub fn read_raw_features(path: &Path) -> Result<Tensor<f32>, PipelineError> {
    let file = File::open(path).map_err(|source| PipelineError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let len = file
        .metadata()
        .map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    let rows = len / ROW_BYTES;
    if rows == 0 || len != rows * ROW_BYTES {
        return Err(PipelineError::RawFeatureSize {
            path: path.to_path_buf(),
            got: len,
        });
    }
    let mut features = Tensor::zeros(vec![rows as usize, FEATURE_DIM]);
    features
        .load(&mut BufReader::new(file))
        .map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(features)
}

/// Write a `(B, D)` result tensor. Binary mode is the tensor's raw
/// little-endian layout; text mode is one space-separated row per sample,
/// `\n`-terminated, no trailing space.
pub fn write_result<W: Write>(
    writer: &mut W,
    result: &Tensor<f32>,
    format: OutputFormat,
) -> std::io::Result<()> {
    assert_eq!(result.ndim(), 2, "results are written row-wise");
    match format {
        OutputFormat::Binary => result.save(writer),
        OutputFormat::Text => {
            let (rows, cols) = (result.dim(0), result.dim(1));
            for i in 0..rows {
                for j in 0..cols {
                    if j > 0 {
                        write!(writer, " ")?;
                    }
                    write!(writer, "{:?}", *result.at(&[i, j]))?;
                }
                writeln!(writer)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_text_rows() {
        let t = Tensor::new(vec![2.5, -1.0, 0.0, 10.0], vec![2, 2]).unwrap();
        let mut out = Vec::new();
        write_result(&mut out, &t, OutputFormat::Text).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2.5 -1.0\n0.0 10.0\n");
    }

    #[test]
    fn test_binary_matches_tensor_layout() {
        let t = Tensor::rand(vec![3, 4], Some(41));
        let mut out = Vec::new();
        write_result(&mut out, &t, OutputFormat::Binary).unwrap();
        let mut expect = Vec::new();
        t.save(&mut expect).unwrap();
        assert_eq!(out, expect);
    }

    #[test]
    fn test_raw_features_shape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 2 * ROW_BYTES as usize]).unwrap();
        let t = read_raw_features(file.path()).unwrap();
        assert_eq!(t.shape_vec(), vec![2, FEATURE_DIM]);
    }

    #[test]
    fn test_raw_features_rejects_partial_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 100]).unwrap();
        assert!(matches!(
            read_raw_features(file.path()),
            Err(PipelineError::RawFeatureSize { got: 100, .. })
        ));
    }

    #[test]
    fn test_raw_features_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            read_raw_features(file.path()),
            Err(PipelineError::RawFeatureSize { .. })
        ));
    }
}
