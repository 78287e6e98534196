use std::io::{self, Read};
use std::slice;

use convfeat_core::Tensor;
use convfeat_runtime::{join_all, partition, SendConstPtr, SendMutPtr, ThreadPool};

use crate::layers::Layer;

#[cfg(feature = "simd")]
use wide::f32x8;

/// Copy `x` into a `(B, C, H + 2p, W + 2p)` tensor whose border cells hold
/// `fill`, parallelized over the full `B·C·H` source row range.
fn pad_spatial(x: Tensor<f32>, padding: usize, fill: f32, pool: &ThreadPool) -> Tensor<f32> {
    let (n, channels, height, width) = (x.dim(0), x.dim(1), x.dim(2), x.dim(3));
    let padded_w = width + 2 * padding;
    let padded_plane = (height + 2 * padding) * padded_w;
    let mut padded = Tensor::full(
        vec![n, channels, height + 2 * padding, padded_w],
        fill,
    );
    let src = SendConstPtr(x.as_ptr());
    let dst = SendMutPtr(padded.as_mut_ptr());
    let mut handles = Vec::with_capacity(pool.thread_count());
    for (start, end) in partition(n * channels * height, pool.thread_count()) {
        handles.push(pool.enqueue(move || {
            for row in start..end {
                // `plane` is the flattened (sample, channel) pair.
                let plane = row / height;
                let h = row % height;
                let from = plane * height * width + h * width;
                let to = plane * padded_plane + (h + padding) * padded_w + padding;
                unsafe {
                    std::ptr::copy_nonoverlapping(src.add(from), dst.add(to), width);
                }
            }
        }));
    }
    join_all(handles);
    // The source tensor stays alive until every row copy has been joined.
    drop(x);
    padded
}

// ─── Conv2d ─────────────────────────────────────────────────────────────────

/// 2D convolution with square kernels, symmetric zero padding, and uniform
/// stride. No dilation, no groups.
///
/// Input:  `(B, in_channels, H, W)`
/// Output: `(B, out_channels, (H + 2p − k)/s + 1, (W + 2p − k)/s + 1)`
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    has_bias: bool,
    weight: Tensor<f32>, // (out_channels, in_channels, k, k)
    bias: Tensor<f32>,   // (out_channels); empty without bias
}

#[derive(Clone, Copy)]
struct ConvDims {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    in_h: usize, // post-padding
    in_w: usize,
    out_h: usize,
    out_w: usize,
    x_len: usize,
    w_len: usize,
    has_bias: bool,
}

impl Conv2d {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
            has_bias: true,
            weight: Tensor::zeros(vec![out_channels, in_channels, kernel_size, kernel_size]),
            bias: Tensor::zeros(vec![out_channels]),
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn without_bias(mut self) -> Self {
        self.has_bias = false;
        self.bias = Tensor::empty();
        self
    }
}

impl Layer for Conv2d {
    fn forward(&self, x: Tensor<f32>, pool: &ThreadPool) -> Tensor<f32> {
        assert_eq!(x.ndim(), 4, "Conv2d expects a 4-D input");
        assert_eq!(x.dim(1), self.in_channels, "Conv2d input channel mismatch");
        let x = if self.padding > 0 {
            pad_spatial(x, self.padding, 0.0, pool)
        } else {
            x
        };
        let n = x.dim(0);
        let d = ConvDims {
            in_channels: self.in_channels,
            out_channels: self.out_channels,
            kernel: self.kernel_size,
            stride: self.stride,
            in_h: x.dim(2),
            in_w: x.dim(3),
            out_h: (x.dim(2) - self.kernel_size) / self.stride + 1,
            out_w: (x.dim(3) - self.kernel_size) / self.stride + 1,
            x_len: x.size(),
            w_len: self.weight.size(),
            has_bias: self.has_bias,
        };
        let mut y = Tensor::zeros(vec![n, d.out_channels, d.out_h, d.out_w]);
        let xp = SendConstPtr(x.as_ptr());
        let yp = SendMutPtr(y.as_mut_ptr());
        let wp = SendConstPtr(self.weight.as_ptr());
        let bp = SendConstPtr(self.bias.as_ptr());
        let mut handles = Vec::with_capacity(pool.thread_count());
        for (start, end) in partition(n * d.out_channels, pool.thread_count()) {
            handles.push(pool.enqueue(move || unsafe {
                conv_planes(xp, yp, wp, bp, d, start, end);
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

/// Compute output planes `start..end`, flattened over (sample, out-channel)
/// pairs. Caller guarantees the pointers outlive the task and plane ranges
/// are disjoint between tasks.
unsafe fn conv_planes(
    xp: SendConstPtr<f32>,
    yp: SendMutPtr<f32>,
    wp: SendConstPtr<f32>,
    bp: SendConstPtr<f32>,
    d: ConvDims,
    start: usize,
    end: usize,
) {
    let x = slice::from_raw_parts(xp.0, d.x_len);
    let w = slice::from_raw_parts(wp.0, d.w_len);
    let bias = if d.has_bias {
        Some(slice::from_raw_parts(bp.0, d.out_channels))
    } else {
        None
    };
    let plane = d.out_h * d.out_w;
    let y = slice::from_raw_parts_mut(yp.add(start * plane), (end - start) * plane);
    for j in start..end {
        let sample = j / d.out_channels;
        let out = j % d.out_channels;
        let dst = &mut y[(j - start) * plane..(j - start + 1) * plane];
        conv_plane(x, w, bias.map(|b| b[out]), d, sample, out, dst);
    }
}

/// One full output feature plane.
#[cfg(feature = "simd")]
fn conv_plane(
    x: &[f32],
    w: &[f32],
    bias: Option<f32>,
    d: ConvDims,
    sample: usize,
    out: usize,
    dst: &mut [f32],
) {
    let in_plane = d.in_h * d.in_w;
    let x_base = sample * d.in_channels * in_plane;
    let w_base = out * d.in_channels * d.kernel * d.kernel;
    for h in 0..d.out_h {
        let hs = h * d.stride;
        let mut col = 0usize;
        while col + 8 <= d.out_w {
            let ws = col * d.stride;
            let mut acc = f32x8::ZERO;
            for ic in 0..d.in_channels {
                let x_chan = x_base + ic * in_plane;
                let w_chan = w_base + ic * d.kernel * d.kernel;
                for kh in 0..d.kernel {
                    let x_row = x_chan + (hs + kh) * d.in_w + ws;
                    let w_row = w_chan + kh * d.kernel;
                    for kw in 0..d.kernel {
                        let weight = f32x8::splat(w[w_row + kw]);
                        let base = x_row + kw;
                        let lanes = f32x8::new([
                            x[base],
                            x[base + d.stride],
                            x[base + 2 * d.stride],
                            x[base + 3 * d.stride],
                            x[base + 4 * d.stride],
                            x[base + 5 * d.stride],
                            x[base + 6 * d.stride],
                            x[base + 7 * d.stride],
                        ]);
                        acc = weight * lanes + acc;
                    }
                }
            }
            if let Some(b) = bias {
                acc = f32x8::splat(b) + acc;
            }
            let o = h * d.out_w + col;
            dst[o..o + 8].copy_from_slice(&acc.to_array());
            col += 8;
        }
        conv_row_tail(x, w, bias, d, x_base, w_base, h, col, dst);
    }
}

#[cfg(not(feature = "simd"))]
fn conv_plane(
    x: &[f32],
    w: &[f32],
    bias: Option<f32>,
    d: ConvDims,
    sample: usize,
    out: usize,
    dst: &mut [f32],
) {
    let in_plane = d.in_h * d.in_w;
    let x_base = sample * d.in_channels * in_plane;
    let w_base = out * d.in_channels * d.kernel * d.kernel;
    for h in 0..d.out_h {
        conv_row_tail(x, w, bias, d, x_base, w_base, h, 0, dst);
    }
}

/// Scalar columns `col..out_w` of one output row.
#[allow(clippy::too_many_arguments)]
fn conv_row_tail(
    x: &[f32],
    w: &[f32],
    bias: Option<f32>,
    d: ConvDims,
    x_base: usize,
    w_base: usize,
    h: usize,
    col: usize,
    dst: &mut [f32],
) {
    let in_plane = d.in_h * d.in_w;
    let hs = h * d.stride;
    for c in col..d.out_w {
        let ws = c * d.stride;
        let mut sum = 0.0f32;
        for ic in 0..d.in_channels {
            let x_chan = x_base + ic * in_plane;
            let w_chan = w_base + ic * d.kernel * d.kernel;
            for kh in 0..d.kernel {
                let x_row = x_chan + (hs + kh) * d.in_w + ws;
                let w_row = w_chan + kh * d.kernel;
                for kw in 0..d.kernel {
                    sum += x[x_row + kw] * w[w_row + kw];
                }
            }
        }
        if let Some(b) = bias {
            sum += b;
        }
        dst[h * d.out_w + c] = sum;
    }
}

// ─── MaxPool2d ──────────────────────────────────────────────────────────────

/// 2D max pooling over square windows.
///
/// Padding cells hold the minimum representable value, so they never win a
/// comparison even on all-negative inputs.
pub struct MaxPool2d {
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

#[derive(Clone, Copy)]
struct PoolDims {
    kernel: usize,
    stride: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
    x_len: usize,
}

impl MaxPool2d {
    /// Stride defaults to the kernel size; padding to zero.
    pub fn new(kernel_size: usize) -> Self {
        MaxPool2d {
            kernel_size,
            stride: kernel_size,
            padding: 0,
        }
    }

    /// A stride of zero selects the kernel size.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = if stride == 0 { self.kernel_size } else { stride };
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }
}

impl Layer for MaxPool2d {
    fn forward(&self, x: Tensor<f32>, pool: &ThreadPool) -> Tensor<f32> {
        assert_eq!(x.ndim(), 4, "MaxPool2d expects a 4-D input");
        let x = if self.padding > 0 {
            pad_spatial(x, self.padding, f32::MIN, pool)
        } else {
            x
        };
        let (n, channels) = (x.dim(0), x.dim(1));
        let d = PoolDims {
            kernel: self.kernel_size,
            stride: self.stride,
            in_h: x.dim(2),
            in_w: x.dim(3),
            out_h: (x.dim(2) - self.kernel_size) / self.stride + 1,
            out_w: (x.dim(3) - self.kernel_size) / self.stride + 1,
            x_len: x.size(),
        };
        let mut y = Tensor::zeros(vec![n, channels, d.out_h, d.out_w]);
        let xp = SendConstPtr(x.as_ptr());
        let yp = SendMutPtr(y.as_mut_ptr());
        let mut handles = Vec::with_capacity(pool.thread_count());
        for (start, end) in partition(n * channels, pool.thread_count()) {
            handles.push(pool.enqueue(move || unsafe {
                pool_planes(xp, yp, d, start, end);
            }));
        }
        join_all(handles);
        y
    }
}

/// Pool planes `start..end`, flattened over (sample, channel) pairs — each
/// pair is one contiguous input plane and one contiguous output plane.
unsafe fn pool_planes(
    xp: SendConstPtr<f32>,
    yp: SendMutPtr<f32>,
    d: PoolDims,
    start: usize,
    end: usize,
) {
    let x = slice::from_raw_parts(xp.0, d.x_len);
    let in_plane = d.in_h * d.in_w;
    let out_plane = d.out_h * d.out_w;
    let y = slice::from_raw_parts_mut(yp.add(start * out_plane), (end - start) * out_plane);
    for j in start..end {
        let base = j * in_plane;
        let dst = &mut y[(j - start) * out_plane..(j - start + 1) * out_plane];
        for h in 0..d.out_h {
            let hs = h * d.stride;
            for c in 0..d.out_w {
                let ws = c * d.stride;
                let mut max = f32::MIN;
                for kh in 0..d.kernel {
                    let row = base + (hs + kh) * d.in_w + ws;
                    for kw in 0..d.kernel {
                        let value = x[row + kw];
                        if value > max {
                            max = value;
                        }
                    }
                }
                dst[h * d.out_w + c] = max;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn le_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_identity_kernel_center_tap() {
        let pool = ThreadPool::new(2);
        let mut conv = Conv2d::new(1, 1, 3);
        let mut params = vec![0.0f32; 9];
        params[4] = 1.0;
        params.push(0.0); // bias
        conv.load(&mut Cursor::new(le_bytes(&params))).unwrap();
        let x = Tensor::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            vec![1, 1, 3, 3],
        )
        .unwrap();
        let y = conv.forward(x, &pool);
        assert_eq!(y.shape_vec(), vec![1, 1, 1, 1]);
        assert_eq!(y.data(), &[5.0]);
    }

    #[test]
    fn test_output_shape() {
        let pool = ThreadPool::new(2);
        for &(b, c, h, w, oc, k, s, p) in &[
            (1usize, 1usize, 5usize, 5usize, 2usize, 3usize, 1usize, 0usize),
            (2, 3, 8, 6, 4, 3, 2, 1),
            (1, 2, 7, 7, 3, 2, 2, 2),
        ] {
            let conv = Conv2d::new(c, oc, k).with_stride(s).with_padding(p);
            let y = conv.forward(Tensor::zeros(vec![b, c, h, w]), &pool);
            let expect_h = (h + 2 * p - k) / s + 1;
            let expect_w = (w + 2 * p - k) / s + 1;
            assert_eq!(y.shape_vec(), vec![b, oc, expect_h, expect_w]);
        }
    }

    #[test]
    fn test_padding_covers_full_batch() {
        let pool = ThreadPool::new(3);
        let mut conv = Conv2d::new(1, 1, 3).with_padding(1);
        let mut params = vec![0.0f32; 9];
        params[4] = 1.0;
        params.push(0.0);
        conv.load(&mut Cursor::new(le_bytes(&params))).unwrap();
        let data: Vec<f32> = (1..=32).map(|i| i as f32).collect();
        let x = Tensor::new(data.clone(), vec![2, 1, 4, 4]).unwrap();
        let y = conv.forward(x, &pool);
        assert_eq!(y.shape_vec(), vec![2, 1, 4, 4]);
        // Every sample of the batch must survive the padded copy.
        assert_eq!(y.data(), &data[..]);
    }

    #[test]
    fn test_matches_naive_loop() {
        let pool = ThreadPool::new(4);
        let (b, ic, oc, h, w, k, s, p) = (2usize, 3usize, 2usize, 7usize, 6usize, 3usize, 2usize, 1usize);
        let mut conv = Conv2d::new(ic, oc, k).with_stride(s).with_padding(p);
        let params = Tensor::rand(vec![oc * ic * k * k + oc], Some(3));
        conv.load(&mut Cursor::new(le_bytes(params.data()))).unwrap();
        let x = Tensor::rand(vec![b, ic, h, w], Some(4));
        let y = conv.forward(x.clone(), &pool);

        let weights = &params.data()[..oc * ic * k * k];
        let biases = &params.data()[oc * ic * k * k..];
        let oh = (h + 2 * p - k) / s + 1;
        let ow = (w + 2 * p - k) / s + 1;
        for bi in 0..b {
            for o in 0..oc {
                for yh in 0..oh {
                    for yw in 0..ow {
                        let mut sum = biases[o];
                        for ci in 0..ic {
                            for kh in 0..k {
                                for kw in 0..k {
                                    let ih = (yh * s + kh) as isize - p as isize;
                                    let iw = (yw * s + kw) as isize - p as isize;
                                    if ih >= 0 && ih < h as isize && iw >= 0 && iw < w as isize {
                                        let wv = weights[((o * ic + ci) * k + kh) * k + kw];
                                        sum += *x.at(&[bi, ci, ih as usize, iw as usize]) * wv;
                                    }
                                }
                            }
                        }
                        assert_relative_eq!(
                            *y.at(&[bi, o, yh, yw]),
                            sum,
                            max_relative = 1e-5,
                            epsilon = 1e-6
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_conv_thread_count_invariance() {
        let mut conv = Conv2d::new(3, 4, 3).with_stride(2).with_padding(1);
        let params = Tensor::rand(vec![4 * 3 * 3 * 3 + 4], Some(5));
        conv.load(&mut Cursor::new(le_bytes(params.data()))).unwrap();
        let x = Tensor::rand(vec![2, 3, 9, 9], Some(11));
        let single = conv.forward(x.clone(), &ThreadPool::new(1));
        let many = conv.forward(x, &ThreadPool::new(5));
        assert_eq!(single.data(), many.data());
    }

    #[test]
    fn test_pool_window() {
        let pool = ThreadPool::new(1);
        let layer = MaxPool2d::new(2);
        let x = Tensor::new(vec![1.0, 3.0, 2.0, 4.0], vec![1, 1, 2, 2]).unwrap();
        let y = layer.forward(x, &pool);
        assert_eq!(y.shape_vec(), vec![1, 1, 1, 1]);
        assert_eq!(y.data(), &[4.0]);
    }

    #[test]
    fn test_pool_zero_stride_means_kernel() {
        let pool = ThreadPool::new(2);
        let layer = MaxPool2d::new(3).with_stride(0);
        let y = layer.forward(Tensor::zeros(vec![1, 1, 9, 9]), &pool);
        assert_eq!(y.shape_vec(), vec![1, 1, 3, 3]);
    }

    #[test]
    fn test_pool_padding_never_wins() {
        let pool = ThreadPool::new(2);
        let layer = MaxPool2d::new(3).with_stride(1).with_padding(1);
        let x = Tensor::full(vec![1, 1, 2, 2], -5.0);
        let y = layer.forward(x, &pool);
        assert_eq!(y.shape_vec(), vec![1, 1, 2, 2]);
        assert!(y.data().iter().all(|&v| v == -5.0));
    }

    #[test]
    fn test_pool_monotonicity() {
        let pool = ThreadPool::new(2);
        let layer = MaxPool2d::new(2);
        let base = Tensor::rand(vec![1, 2, 6, 6], Some(13));
        let before = layer.forward(base.clone(), &pool);
        let mut bumped = base;
        bumped.data_mut()[17] += 3.0;
        let after = layer.forward(bumped, &pool);
        for (&lo, &hi) in before.data().iter().zip(after.data()) {
            assert!(hi >= lo);
        }
    }

    #[test]
    fn test_pool_thread_count_invariance() {
        let layer = MaxPool2d::new(3).with_stride(2);
        let x = Tensor::rand(vec![3, 2, 13, 11], Some(37));
        let single = layer.forward(x.clone(), &ThreadPool::new(1));
        let many = layer.forward(x, &ThreadPool::new(7));
        assert_eq!(single.data(), many.data());
    }
}
