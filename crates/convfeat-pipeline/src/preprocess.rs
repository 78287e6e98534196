use std::path::{Path, PathBuf};
use std::slice;

use convfeat_core::Tensor;
use convfeat_runtime::{join_all, partition, SendMutPtr, ThreadPool};
use image::imageops::FilterType;
use tracing::warn;

/// Side length of the network input crop.
pub const CROP_SIDE: usize = 224;

/// Shorter-side length after the aspect-preserving resize.
const RESIZE_SHORTER: u32 = 256;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

const SAMPLE_LEN: usize = 3 * CROP_SIDE * CROP_SIDE;

/// Decode and normalize a batch of image files into a `(B, 3, 224, 224)`
/// tensor, parallelized over the batch.
///
/// A file that fails to decode keeps its all-zero sample; the failure is
/// reported and the batch continues.
pub fn load_batch(paths: &[PathBuf], pool: &ThreadPool) -> Tensor<f32> {
    let n = paths.len();
    let mut sample = Tensor::zeros(vec![n, 3, CROP_SIDE, CROP_SIDE]);
    let sp = SendMutPtr(sample.as_mut_ptr());
    let mut handles = Vec::with_capacity(pool.thread_count());
    for (start, end) in partition(n, pool.thread_count()) {
        let chunk: Vec<PathBuf> = paths[start..end].to_vec();
        handles.push(pool.enqueue(move || {
            let out = unsafe {
                slice::from_raw_parts_mut(sp.add(start * SAMPLE_LEN), (end - start) * SAMPLE_LEN)
            };
            for (i, path) in chunk.iter().enumerate() {
                decode_into(path, &mut out[i * SAMPLE_LEN..(i + 1) * SAMPLE_LEN]);
            }
        }));
    }
    join_all(handles);
    sample
}

/// Decode one image into a normalized CHW sample. On failure the sample is
/// left untouched.
fn decode_into(path: &Path, out: &mut [f32]) {
    let image = match image::open(path) {
        Ok(image) => image,
        Err(err) => {
            warn!("failed to decode \"{}\": {err}", path.display());
            return;
        }
    };
    let (w, h) = (image.width(), image.height());
    let (new_w, new_h) = if h > w {
        let scaled = (f64::from(h) * f64::from(RESIZE_SHORTER) / f64::from(w)).round() as u32;
        (RESIZE_SHORTER, scaled)
    } else {
        let scaled = (f64::from(w) * f64::from(RESIZE_SHORTER) / f64::from(h)).round() as u32;
        (scaled, RESIZE_SHORTER)
    };
    let resized = image.resize_exact(new_w, new_h, FilterType::CatmullRom);
    let side = CROP_SIDE as u32;
    let left = (f64::from(new_w - side) / 2.0 + 0.5) as u32;
    let top = (f64::from(new_h - side) / 2.0 + 0.5) as u32;
    let cropped = resized.crop_imm(left, top, side, side).to_rgb8();
    let plane = CROP_SIDE * CROP_SIDE;
    for k in 0..3 {
        for i in 0..CROP_SIDE {
            for j in 0..CROP_SIDE {
                let v = f32::from(cropped.get_pixel(j as u32, i as u32)[k]) / 255.0;
                out[k * plane + i * CROP_SIDE + j] = (v - MEAN[k]) / STD[k];
            }
        }
    }
}
