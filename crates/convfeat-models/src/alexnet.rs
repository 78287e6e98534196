use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use convfeat_nn::{Conv2d, Layer, Linear, MaxPool2d, Relu, Reshape, Sequential};

use crate::error::ModelError;

/// Exact byte size of a feature-network weight file.
pub const ALEXNET_WEIGHT_BYTES: u64 = 228_015_360;

/// The AlexNet-shaped feature extractor. Takes `(B, 3, 224, 224)` inputs to
/// `(B, 4096)` features.
pub fn alexnet() -> Sequential {
    Sequential::new()
        .add(Conv2d::new(3, 64, 11).with_stride(4).with_padding(2))
        .add(Relu)
        .add(MaxPool2d::new(3).with_stride(2))
        .add(Conv2d::new(64, 192, 5).with_padding(2))
        .add(Relu)
        .add(MaxPool2d::new(3).with_stride(2))
        .add(Conv2d::new(192, 384, 3).with_padding(1))
        .add(Relu)
        .add(Conv2d::new(384, 256, 3).with_padding(1))
        .add(Relu)
        .add(Conv2d::new(256, 256, 3).with_padding(1))
        .add(Relu)
        .add(MaxPool2d::new(3).with_stride(2))
        .add(Reshape::new(vec![256 * 6 * 6]))
        .add(Linear::new(256 * 6 * 6, 4096))
        .add(Relu)
        .add(Linear::new(4096, 4096))
        .add(Relu)
}

/// Build the feature network and populate it from `path`.
///
/// The file must be exactly [`ALEXNET_WEIGHT_BYTES`] long; any other size is
/// rejected before a single element is read.
pub fn load_alexnet(path: &Path) -> Result<Sequential, ModelError> {
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
    if len != ALEXNET_WEIGHT_BYTES {
        return Err(ModelError::Size {
            path: path.to_path_buf(),
            expected: ALEXNET_WEIGHT_BYTES,
            got: len,
        });
    }
    let mut net = alexnet();
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
    use std::io::Write;

    #[test]
    fn test_architecture_length() {
        assert_eq!(alexnet().len(), 18);
    }

    #[test]
    fn test_weight_size_is_gated_before_reading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        match load_alexnet(file.path()) {
            Err(ModelError::Size { expected, got, .. }) => {
                assert_eq!(expected, ALEXNET_WEIGHT_BYTES);
                assert_eq!(got, 16);
            }
            Err(other) => panic!("expected size error, got {other:?}"),
            Ok(_) => panic!("expected size error, got a network"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_alexnet(Path::new("/nonexistent/alexnet.bin"));
        assert!(matches!(err, Err(ModelError::Open { .. })));
    }
}
