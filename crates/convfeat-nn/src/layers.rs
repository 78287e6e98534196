use std::io::{self, Read};
use std::slice;

use convfeat_core::Tensor;
use convfeat_runtime::{join_all, partition, SendConstPtr, SendMutPtr, ThreadPool};

#[cfg(feature = "simd")]
use wide::f32x8;

/// A forward operator over owned tensors.
///
/// Layers are immutable once their weights are loaded; `forward` never
/// mutates layer state, so parameters may be read freely by every worker.
/// `load` consumes the layer's parameters from a raw little-endian stream,
/// weight tensor first, then bias.
pub trait Layer {
    fn forward(&self, x: Tensor<f32>, pool: &ThreadPool) -> Tensor<f32>;

    /// Consume this layer's parameters from the stream. Layers without
    /// parameters read nothing.
    fn load(&mut self, _reader: &mut dyn Read) -> io::Result<()> {
        Ok(())
    }
}

// ─── Linear ─────────────────────────────────────────────────────────────────

/// Affine map `y[b, j] = Σₖ x[b, k] · W[j, k] + bias[j]`.
///
/// Input `(B, in_features)`, output `(B, out_features)`, weight
/// `(out_features, in_features)`.
pub struct Linear {
    in_features: usize,
    out_features: usize,
    has_bias: bool,
    weight: Tensor<f32>,
    bias: Tensor<f32>,
}

#[derive(Clone, Copy)]
struct LinearDims {
    in_features: usize,
    out_features: usize,
    x_len: usize,
    w_len: usize,
    has_bias: bool,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Linear {
            in_features,
            out_features,
            has_bias: true,
            weight: Tensor::zeros(vec![out_features, in_features]),
            bias: Tensor::zeros(vec![out_features]),
        }
    }

    pub fn without_bias(mut self) -> Self {
        self.has_bias = false;
        self.bias = Tensor::empty();
        self
    }
}

impl Layer for Linear {
    fn forward(&self, x: Tensor<f32>, pool: &ThreadPool) -> Tensor<f32> {
        assert_eq!(x.ndim(), 2, "Linear expects a 2-D input");
        assert_eq!(x.dim(1), self.in_features, "Linear input width mismatch");
        let n = x.dim(0);
        let mut y = Tensor::zeros(vec![n, self.out_features]);
        let d = LinearDims {
            in_features: self.in_features,
            out_features: self.out_features,
            x_len: x.size(),
            w_len: self.weight.size(),
            has_bias: self.has_bias,
        };
        let xp = SendConstPtr(x.as_ptr());
        let yp = SendMutPtr(y.as_mut_ptr());
        let wp = SendConstPtr(self.weight.as_ptr());
        let bp = SendConstPtr(self.bias.as_ptr());
        let mut handles = Vec::with_capacity(pool.thread_count());
        for (start, end) in partition(y.size(), pool.thread_count()) {
            handles.push(pool.enqueue(move || unsafe {
                linear_range(xp, yp, wp, bp, d, start, end);
            }));
        }
        join_all(handles);
        y
    }

    fn load(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        self.weight.load(reader)?;
        if self.has_bias {
            self.bias.load(reader)?;
        }
        Ok(())
    }
}

/// Compute output positions `start..end`, flattened over `(B, out_features)`.
/// Caller guarantees the pointers outlive the task and position ranges are
/// disjoint between tasks.
unsafe fn linear_range(
    xp: SendConstPtr<f32>,
    yp: SendMutPtr<f32>,
    wp: SendConstPtr<f32>,
    bp: SendConstPtr<f32>,
    d: LinearDims,
    start: usize,
    end: usize,
) {
    let x = slice::from_raw_parts(xp.0, d.x_len);
    let w = slice::from_raw_parts(wp.0, d.w_len);
    let bias = if d.has_bias {
        Some(slice::from_raw_parts(bp.0, d.out_features))
    } else {
        None
    };
    let y = slice::from_raw_parts_mut(yp.add(start), end - start);
    for pos in start..end {
        let row = pos / d.out_features;
        let col = pos % d.out_features;
        let xs = &x[row * d.in_features..(row + 1) * d.in_features];
        let ws = &w[col * d.in_features..(col + 1) * d.in_features];
        y[pos - start] = dot(xs, ws, bias.map(|b| b[col]));
    }
}

#[cfg(feature = "simd")]
fn dot(x: &[f32], w: &[f32], bias: Option<f32>) -> f32 {
    let mut acc = f32x8::ZERO;
    let mut k = 0usize;
    while k + 8 <= x.len() {
        let a = f32x8::new([
            x[k],
            x[k + 1],
            x[k + 2],
            x[k + 3],
            x[k + 4],
            x[k + 5],
            x[k + 6],
            x[k + 7],
        ]);
        let b = f32x8::new([
            w[k],
            w[k + 1],
            w[k + 2],
            w[k + 3],
            w[k + 4],
            w[k + 5],
            w[k + 6],
            w[k + 7],
        ]);
        acc = a * b + acc;
        k += 8;
    }
    let mut sum = acc.reduce_add();
    while k < x.len() {
        sum += x[k] * w[k];
        k += 1;
    }
    if let Some(b) = bias {
        sum += b;
    }
    sum
}

#[cfg(not(feature = "simd"))]
fn dot(x: &[f32], w: &[f32], bias: Option<f32>) -> f32 {
    let mut sum = 0.0f32;
    for (&a, &b) in x.iter().zip(w.iter()) {
        sum += a * b;
    }
    if let Some(b) = bias {
        sum += b;
    }
    sum
}

// ─── Relu ───────────────────────────────────────────────────────────────────

/// Elementwise rectifier applied in place over flat storage, any rank.
pub struct Relu;

impl Layer for Relu {
    fn forward(&self, mut x: Tensor<f32>, pool: &ThreadPool) -> Tensor<f32> {
        let p = SendMutPtr(x.as_mut_ptr());
        let mut handles = Vec::with_capacity(pool.thread_count());
        for (start, end) in partition(x.size(), pool.thread_count()) {
            handles.push(pool.enqueue(move || {
                let values = unsafe { slice::from_raw_parts_mut(p.add(start), end - start) };
                relu_range(values);
            }));
        }
        join_all(handles);
        x
    }
}

#[cfg(feature = "simd")]
fn relu_range(values: &mut [f32]) {
    let zeros = f32x8::ZERO;
    let mut i = 0usize;
    while i + 8 <= values.len() {
        let v = f32x8::new([
            values[i],
            values[i + 1],
            values[i + 2],
            values[i + 3],
            values[i + 4],
            values[i + 5],
            values[i + 6],
            values[i + 7],
        ]);
        values[i..i + 8].copy_from_slice(&v.max(zeros).to_array());
        i += 8;
    }
    relu_tail(&mut values[i..]);
}

#[cfg(not(feature = "simd"))]
fn relu_range(values: &mut [f32]) {
    relu_tail(values);
}

fn relu_tail(values: &mut [f32]) {
    for v in values {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

// ─── Bias ───────────────────────────────────────────────────────────────────

/// Adds `bias[j mod features]` to flat element `j` of a `(B, features)`
/// tensor, in place.
pub struct Bias {
    features: usize,
    bias: Tensor<f32>,
}

impl Bias {
    pub fn new(features: usize) -> Self {
        Bias {
            features,
            bias: Tensor::zeros(vec![features]),
        }
    }
}

impl Layer for Bias {
    fn forward(&self, mut x: Tensor<f32>, pool: &ThreadPool) -> Tensor<f32> {
        assert_eq!(x.ndim(), 2, "Bias expects a 2-D input");
        assert_eq!(x.dim(1), self.features, "Bias feature count mismatch");
        let features = self.features;
        let p = SendMutPtr(x.as_mut_ptr());
        let bp = SendConstPtr(self.bias.as_ptr());
        let mut handles = Vec::with_capacity(pool.thread_count());
        for (start, end) in partition(x.size(), pool.thread_count()) {
            handles.push(pool.enqueue(move || {
                let bp = bp;
                let bias = unsafe { slice::from_raw_parts(bp.0, features) };
                let values = unsafe { slice::from_raw_parts_mut(p.add(start), end - start) };
                for (i, v) in values.iter_mut().enumerate() {
                    *v += bias[(start + i) % features];
                }
            }));
        }
        join_all(handles);
        x
    }

    fn load(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        self.bias.load(reader)
    }
}

// ─── Reshape ────────────────────────────────────────────────────────────────

/// Rewrites the shape to `(size / Πsᵢ, s₁, …, sₘ)` without touching data.
pub struct Reshape {
    trailing: Vec<usize>,
    chunk: usize,
}

impl Reshape {
    pub fn new(trailing: Vec<usize>) -> Self {
        let chunk = trailing.iter().product();
        assert!(chunk > 0, "Reshape target shape must have a non-zero product");
        Reshape { trailing, chunk }
    }
}

impl Layer for Reshape {
    fn forward(&self, mut x: Tensor<f32>, _pool: &ThreadPool) -> Tensor<f32> {
        assert_eq!(
            x.size() % self.chunk,
            0,
            "Reshape input size {} is not divisible by {}",
            x.size(),
            self.chunk
        );
        let mut shape = Vec::with_capacity(self.trailing.len() + 1);
        shape.push(x.size() / self.chunk);
        shape.extend_from_slice(&self.trailing);
        x.reshape(shape).expect("leading dimension keeps the element count");
        x
    }
}
