use crate::dtype::Float;
use crate::error::{TensorError, TensorResult};
use crate::shape::Shape;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, Read, Write};

/// N-dimensional dense tensor — the fundamental data structure of convfeat.
///
/// Stores data in a flat contiguous `Vec<T>` with row-major (C-order)
/// layout. Cloning deep-copies the storage; moves transfer it without
/// allocation.
#[derive(Debug, Clone)]
pub struct Tensor<T: Float> {
    data: Vec<T>,
    shape: Shape,
}

// ─── Construction ───────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    /// Unallocated tensor with an empty shape.
    pub fn empty() -> Self {
        Tensor {
            data: vec![],
            shape: Shape::empty(),
        }
    }

    /// Create a tensor from raw data and shape.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> TensorResult<Self> {
        let s = Shape::new(shape);
        if data.len() != s.numel() {
            return Err(TensorError::DataLength {
                len: data.len(),
                shape: s.to_vec(),
            });
        }
        Ok(Tensor { data, shape: s })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let s = Shape::new(shape);
        Tensor {
            data: vec![T::ZERO; s.numel()],
            shape: s,
        }
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let s = Shape::new(shape);
        Tensor {
            data: vec![value; s.numel()],
            shape: s,
        }
    }

    /// Random tensor with uniform distribution in [0, 1).
    pub fn rand(shape: Vec<usize>, seed: Option<u64>) -> Self {
        let s = Shape::new(shape);
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let data: Vec<T> = (0..s.numel())
            .map(|_| T::from_f64(rand::Rng::gen::<f64>(&mut rng)))
            .collect();
        Tensor { data, shape: s }
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.shape.to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Size along a specific axis.
    pub fn dim(&self, axis: usize) -> usize {
        self.shape.dim(axis)
    }

    /// Total element count.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Flat storage offset of an index tuple. The tuple may be shorter than
    /// the rank, in which case it addresses the start of the inner
    /// sub-tensor.
    pub fn offset(&self, indices: &[usize]) -> usize {
        debug_assert!(indices.len() <= self.ndim());
        indices
            .iter()
            .zip(self.shape.strides())
            .map(|(&i, &s)| i * s)
            .sum()
    }

    /// Element (or sub-tensor start) reference. Bounds are checked only in
    /// debug builds; kernels index storage directly.
    pub fn at(&self, indices: &[usize]) -> &T {
        debug_assert!(indices
            .iter()
            .zip(self.shape.dims())
            .all(|(&i, &d)| i < d));
        &self.data[self.offset(indices)]
    }

    pub fn at_mut(&mut self, indices: &[usize]) -> &mut T {
        let offset = self.offset(indices);
        &mut self.data[offset]
    }

    /// Raw pointer to the start of storage.
    pub fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data.as_mut_ptr()
    }

    // ─── Shape Manipulation ─────────────────────────────────────────────────

    /// Reshape in place. The element count must be unchanged; data and its
    /// flat order are untouched.
    pub fn reshape(&mut self, new_shape: Vec<usize>) -> TensorResult<()> {
        let ns = Shape::new(new_shape);
        if ns.numel() != self.size() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape_vec(),
                got: ns.to_vec(),
            });
        }
        self.shape = ns;
        Ok(())
    }

    /// Resize in place, reallocating storage as needed. New elements are
    /// zero-initialized.
    pub fn resize(&mut self, new_shape: Vec<usize>) {
        let ns = Shape::new(new_shape);
        self.data.resize(ns.numel(), T::ZERO);
        self.shape = ns;
    }

    // ─── Serialization ──────────────────────────────────────────────────────

    /// Fill the tensor from a stream of raw little-endian elements in
    /// row-major order. Exactly `size()` elements are consumed.
    pub fn load<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<()> {
        T::read_le(reader, &mut self.data)
    }

    /// Write the tensor as raw little-endian elements in row-major order,
    /// no header.
    pub fn save<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        T::write_le(writer, &self.data)
    }
}

impl<T: Float> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_creation() {
        let t: Tensor<f32> = Tensor::zeros(vec![3, 4]);
        assert_eq!(t.shape_vec(), vec![3, 4]);
        assert_eq!(t.size(), 12);
        assert_eq!(t.data()[0], 0.0);

        let t: Tensor<f32> = Tensor::full(vec![2, 2], 1.5);
        assert_eq!(t.data(), &[1.5, 1.5, 1.5, 1.5]);

        let t: Tensor<f32> = Tensor::empty();
        assert_eq!(t.ndim(), 0);
        assert_eq!(t.size(), 0);
        assert!(t.is_empty());
    }

    #[test]
    fn test_new_rejects_bad_length() {
        let r = Tensor::new(vec![1.0f32, 2.0, 3.0], vec![2, 2]);
        assert!(r.is_err());
    }

    #[test]
    fn test_indexing() {
        let t = Tensor::new((0..24).map(|i| i as f32).collect(), vec![2, 3, 4]).unwrap();
        assert_eq!(*t.at(&[0, 0, 0]), 0.0);
        assert_eq!(*t.at(&[1, 2, 3]), 23.0);
        assert_eq!(*t.at(&[1, 1, 0]), 16.0);
        // Prefix indexing addresses the start of the inner sub-tensor.
        assert_eq!(*t.at(&[1]), 12.0);
        assert_eq!(*t.at(&[0, 2]), 8.0);
        assert_eq!(t.offset(&[1, 2]), 20);
    }

    #[test]
    fn test_reshape_in_place() {
        let mut t = Tensor::new((0..8).map(|i| i as f32).collect(), vec![2, 2, 2]).unwrap();
        let before = t.data().to_vec();
        t.reshape(vec![2, 4]).unwrap();
        assert_eq!(t.shape_vec(), vec![2, 4]);
        assert_eq!(t.data(), &before[..]);

        assert!(t.reshape(vec![3, 3]).is_err());
        assert_eq!(t.shape_vec(), vec![2, 4]);
    }

    #[test]
    fn test_resize() {
        let mut t: Tensor<f32> = Tensor::empty();
        t.resize(vec![4]);
        assert_eq!(t.shape_vec(), vec![4]);
        assert_eq!(t.data(), &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let t: Tensor<f32> = Tensor::rand(vec![3, 5, 7], Some(7));
        let mut bytes = Vec::new();
        t.save(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 4 * t.size());

        let mut back: Tensor<f32> = Tensor::zeros(vec![3, 5, 7]);
        back.load(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_save_is_little_endian() {
        let t = Tensor::new(vec![1.0f32], vec![1]).unwrap();
        let mut bytes = Vec::new();
        t.save(&mut bytes).unwrap();
        assert_eq!(bytes, 1.0f32.to_le_bytes());
    }
}
