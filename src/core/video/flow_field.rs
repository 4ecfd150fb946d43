//! Dense displacement fields between consecutive intensity images.
//!
//! The default estimator is a coarse-to-fine, iterative, windowed
//! least-squares (Lucas-Kanade style) solver run on every pixel of a Gaussian
//! pyramid. Its parameters mirror the usual dense-flow knobs: pyramid scale,
//! level count, window size, iterations per level and pre-smoothing sigma.

use image::imageops::FilterType;
use image::GrayImage;
use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-pixel motion vectors, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    width: u32,
    height: u32,
    dx: Vec<f32>,
    dy: Vec<f32>,
}

impl DisplacementField {
    pub fn zero(width: u32, height: u32) -> Self {
        Self::uniform(width, height, 0.0, 0.0)
    }

    pub fn uniform(width: u32, height: u32, dx: f32, dy: f32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            dx: vec![dx; n],
            dy: vec![dy; n],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn at(&self, x: u32, y: u32) -> (f32, f32) {
        let idx = y as usize * self.width as usize + x as usize;
        (self.dx[idx], self.dy[idx])
    }

    /// Vector at the pixel containing `(x, y)`, clamped to the image bounds.
    pub fn sample(&self, x: f64, y: f64) -> (f64, f64) {
        if self.width == 0 || self.height == 0 {
            return (0.0, 0.0);
        }
        let clamp = |v: f64, max: u32| -> u32 {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as u32).min(max - 1)
            }
        };
        let (dx, dy) = self.at(clamp(x, self.width), clamp(y, self.height));
        (dx as f64, dy as f64)
    }

    /// Mean vector over an inclusive pixel rectangle (clamped).
    pub fn mean_over(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> (f64, f64) {
        if self.width == 0 || self.height == 0 {
            return (0.0, 0.0);
        }
        let x1 = x1.min(self.width - 1);
        let y1 = y1.min(self.height - 1);
        let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
        for y in y0.min(y1)..=y1 {
            for x in x0.min(x1)..=x1 {
                let (dx, dy) = self.at(x, y);
                sx += dx as f64;
                sy += dy as f64;
                n += 1;
            }
        }
        if n == 0 {
            (0.0, 0.0)
        } else {
            (sx / n as f64, sy / n as f64)
        }
    }
}

/// Anything that can turn two consecutive intensity images into a dense field.
pub trait DisplacementEstimator: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, previous: &GrayImage, current: &GrayImage) -> DisplacementField;
}

/// Reports no motion anywhere. Useful for static overlays and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroDisplacement;

impl DisplacementEstimator for ZeroDisplacement {
    fn name(&self) -> &str {
        "zero"
    }

    fn estimate(&self, _previous: &GrayImage, current: &GrayImage) -> DisplacementField {
        DisplacementField::zero(current.width(), current.height())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    pub levels: u32,
    pub pyr_scale: f32,
    /// Odd window side, in pixels.
    pub window: u32,
    pub iterations: u32,
    /// Gaussian pre-smoothing; 0 disables it.
    pub sigma: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            levels: 3,
            pyr_scale: 0.5,
            window: 15,
            iterations: 3,
            sigma: 1.2,
        }
    }
}

/// Smallest pyramid level side worth solving on.
const MIN_LEVEL_SIDE: u32 = 8;

#[derive(Debug, Clone, Default)]
pub struct PyramidalFlow {
    params: FlowParams,
}

impl PyramidalFlow {
    pub fn new(params: FlowParams) -> Self {
        Self { params }
    }

    fn build_pyramid(&self, image: &GrayImage) -> Vec<Plane> {
        let base = if self.params.sigma > 0.0 {
            imageproc::filter::gaussian_blur_f32(image, self.params.sigma)
        } else {
            image.clone()
        };

        let mut pyramid = vec![Plane::from_gray(&base)];
        let mut current = base;
        for _ in 1..self.params.levels.max(1) {
            let (w, h) = current.dimensions();
            let nw = (w as f32 * self.params.pyr_scale).round() as u32;
            let nh = (h as f32 * self.params.pyr_scale).round() as u32;
            if nw < MIN_LEVEL_SIDE || nh < MIN_LEVEL_SIDE {
                break;
            }
            let next = image::imageops::resize(&current, nw, nh, FilterType::Triangle);
            pyramid.push(Plane::from_gray(&next));
            current = next;
        }
        pyramid
    }

    /// Refines `(u, v)` in place on one pyramid level.
    fn refine_level(&self, prev: &Plane, curr: &Plane, u: &mut [f32], v: &mut [f32]) {
        let (w, h) = (prev.width, prev.height);
        let (gx, gy) = prev.gradients();
        let half = (self.params.window.max(3) / 2) as usize;
        let max_step = self.params.window.max(3) as f32;

        for _ in 0..self.params.iterations.max(1) {
            // Per-pixel structure tensor and mismatch terms.
            let (u_now, v_now): (&[f32], &[f32]) = (&*u, &*v);
            let terms: Vec<[f32; 5]> = (0..w * h)
                .into_par_iter()
                .map(|idx| {
                    let x = (idx % w) as f32;
                    let y = (idx / w) as f32;
                    let warped = curr.bilinear(x + u_now[idx], y + v_now[idx]);
                    let it = warped - prev.data[idx];
                    let (ix, iy) = (gx[idx], gy[idx]);
                    [ix * ix, ix * iy, iy * iy, ix * it, iy * it]
                })
                .collect();

            let sums: Vec<Integral> = (0..5)
                .map(|k| Integral::build(w, h, |idx| terms[idx][k] as f64))
                .collect();

            u.par_chunks_mut(w)
                .zip(v.par_chunks_mut(w))
                .enumerate()
                .for_each(|(y, (u_row, v_row))| {
                    let y0 = y.saturating_sub(half);
                    let y1 = (y + half).min(h - 1);
                    for x in 0..w {
                        let x0 = x.saturating_sub(half);
                        let x1 = (x + half).min(w - 1);
                        let a = sums[0].box_sum(x0, y0, x1, y1);
                        let b = sums[1].box_sum(x0, y0, x1, y1);
                        let c = sums[2].box_sum(x0, y0, x1, y1);
                        let d = sums[3].box_sum(x0, y0, x1, y1);
                        let e = sums[4].box_sum(x0, y0, x1, y1);

                        let det = a * c - b * b;
                        if det <= 1e-9 * (1.0 + (a + c) * (a + c)) {
                            continue;
                        }
                        let du = ((-c * d + b * e) / det) as f32;
                        let dv = ((b * d - a * e) / det) as f32;
                        u_row[x] += du.clamp(-max_step, max_step);
                        v_row[x] += dv.clamp(-max_step, max_step);
                    }
                });
        }
    }
}

impl DisplacementEstimator for PyramidalFlow {
    fn name(&self) -> &str {
        "pyramidal-lk"
    }

    fn estimate(&self, previous: &GrayImage, current: &GrayImage) -> DisplacementField {
        if previous.dimensions() != current.dimensions() {
            warn!(
                "⚠️ Frame size changed ({:?} -> {:?}), assuming no motion",
                previous.dimensions(),
                current.dimensions()
            );
            return DisplacementField::zero(current.width(), current.height());
        }
        let (width, height) = current.dimensions();
        if width < 2 || height < 2 {
            return DisplacementField::zero(width, height);
        }

        let prev_pyramid = self.build_pyramid(previous);
        let curr_pyramid = self.build_pyramid(current);

        let mut flow: Option<(usize, usize, Vec<f32>, Vec<f32>)> = None;
        for level in (0..prev_pyramid.len()).rev() {
            let prev = &prev_pyramid[level];
            let curr = &curr_pyramid[level];
            let (w, h) = (prev.width, prev.height);

            let (mut u, mut v) = match flow.take() {
                None => (vec![0.0; w * h], vec![0.0; w * h]),
                Some((cw, ch, cu, cv)) => upsample_flow(&cu, &cv, cw, ch, w, h),
            };
            self.refine_level(prev, curr, &mut u, &mut v);
            flow = Some((w, h, u, v));
        }

        match flow {
            Some((_, _, dx, dy)) => DisplacementField {
                width,
                height,
                dx,
                dy,
            },
            None => DisplacementField::zero(width, height),
        }
    }
}

/// Row-major float image.
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().iter().map(|&p| p as f32).collect(),
        }
    }

    fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Bilinear lookup with border clamping.
    fn bilinear(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = if x.is_finite() { x.clamp(0.0, max_x) } else { 0.0 };
        let y = if y.is_finite() { y.clamp(0.0, max_y) } else { 0.0 };

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Central differences, one-sided at the borders.
    fn gradients(&self) -> (Vec<f32>, Vec<f32>) {
        let (w, h) = (self.width, self.height);
        let mut gx = vec![0.0; w * h];
        let mut gy = vec![0.0; w * h];
        for y in 0..h {
            for x in 0..w {
                let xl = x.saturating_sub(1);
                let xr = (x + 1).min(w - 1);
                let yu = y.saturating_sub(1);
                let yd = (y + 1).min(h - 1);
                let idx = y * w + x;
                if xr > xl {
                    gx[idx] = (self.get(xr, y) - self.get(xl, y)) / (xr - xl) as f32;
                }
                if yd > yu {
                    gy[idx] = (self.get(x, yd) - self.get(x, yu)) / (yd - yu) as f32;
                }
            }
        }
        (gx, gy)
    }
}

/// Summed-area table with one row/column of zero padding.
struct Integral {
    stride: usize,
    data: Vec<f64>,
}

impl Integral {
    fn build(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Self {
        let stride = width + 1;
        let mut data = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0.0;
            for x in 0..width {
                row_sum += value(y * width + x);
                data[(y + 1) * stride + x + 1] = data[y * stride + x + 1] + row_sum;
            }
        }
        Self { stride, data }
    }

    /// Sum over the inclusive rectangle `[x0, x1] x [y0, y1]`.
    fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = self.stride;
        self.data[(y1 + 1) * s + x1 + 1] - self.data[y0 * s + x1 + 1] - self.data[(y1 + 1) * s + x0]
            + self.data[y0 * s + x0]
    }
}

fn upsample_flow(
    u: &[f32],
    v: &[f32],
    cw: usize,
    ch: usize,
    w: usize,
    h: usize,
) -> (Vec<f32>, Vec<f32>) {
    let coarse_u = Plane {
        width: cw,
        height: ch,
        data: u.to_vec(),
    };
    let coarse_v = Plane {
        width: cw,
        height: ch,
        data: v.to_vec(),
    };
    let sx = cw as f32 / w as f32;
    let sy = ch as f32 / h as f32;

    let mut fine_u = Vec::with_capacity(w * h);
    let mut fine_v = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let cx = x as f32 * sx;
            let cy = y as f32 * sy;
            fine_u.push(coarse_u.bilinear(cx, cy) / sx);
            fine_v.push(coarse_v.bilinear(cx, cy) / sy);
        }
    }
    (fine_u, fine_v)
}
