/// Scale-invariant feature transform (Lowe 2004), following the conventions
/// OpenCV uses so descriptors are comparable with its `SIFT` output:
/// the input is doubled before building the pyramid, gradients use the
/// `prev row - next row` sign for y, and descriptors are scaled to 0..=255.

use std::f32::consts::PI;

use image::DynamicImage;
use log::debug;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::config::SiftConfig;
use crate::error::Result;
use crate::features::{DescriptorSet, FeatureExtractor};
use crate::preprocessing::{double_size, gaussian_blur, half_size, to_gray_f32};

pub const DESCRIPTOR_WIDTH: usize = 4;
pub const DESCRIPTOR_HIST_BINS: usize = 8;
pub const DESCRIPTOR_LEN: usize = DESCRIPTOR_WIDTH * DESCRIPTOR_WIDTH * DESCRIPTOR_HIST_BINS;

const MAX_INTERP_STEPS: usize = 5;
const ORI_HIST_BINS: usize = 36;
const ORI_SIG_FCTR: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
const ORI_PEAK_RATIO: f32 = 0.8;
const DESCR_SCL_FCTR: f32 = 3.0;
const DESCR_MAG_THR: f32 = 0.2;
const INT_DESCR_FCTR: f32 = 512.0;

// Pixel values are in 0..=255; derivatives are taken on the 0..=1 scale.
const IMG_SCALE: f32 = 1.0 / 255.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint
{
    /// Position in input image coordinates.
    pub x: f32,
    pub y: f32,
    /// Dominant gradient direction in degrees, 0..360.
    pub orientation: f32,
    pub response: f32,
    pub octave: usize,
    pub layer: usize,
    /// Sub-pixel position and scale within the octave.
    octave_x: f32,
    octave_y: f32,
    octave_scale: f32,
}

pub struct Sift
{
    config: SiftConfig,
}

/// Gaussian and difference-of-Gaussian images, `[octave][layer]`.
struct ScaleSpace
{
    gaussians: Vec<Vec<Array2<f32>>>,
    dogs: Vec<Vec<Array2<f32>>>,
}

impl Sift
{
    pub fn new(config: SiftConfig) -> Self
    {
        Sift { config }
    }

    pub fn config(&self) -> &SiftConfig
    {
        &self.config
    }

    /// Detects keypoints and computes their descriptors, one row per keypoint.
    pub fn detect_and_compute(&self, image: ArrayView2<f32>) -> (Vec<Keypoint>, DescriptorSet)
    {
        let (rows, cols) = image.dim();
        if rows < 2 || cols < 2 {
            return (Vec::new(), DescriptorSet::zeros((0, DESCRIPTOR_LEN)));
        }

        let base = self.base_image(image);
        let num_octaves = number_of_octaves(base.nrows(), base.ncols());
        let space = self.build_scale_space(base, num_octaves);

        let mut keypoints = self.find_scale_space_extrema(&space);
        // Strongest responses first; the sort is stable so ties keep detection order.
        keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
        if self.config.max_features > 0 {
            keypoints.truncate(self.config.max_features);
        }

        let computed: Vec<[f32; DESCRIPTOR_LEN]> = keypoints
            .par_iter()
            .map(|kp| self.descriptor(&space.gaussians[kp.octave][kp.layer], kp))
            .collect();

        let mut descriptors = DescriptorSet::zeros((computed.len(), DESCRIPTOR_LEN));
        for (mut dst, src) in descriptors.outer_iter_mut().zip(computed.iter()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = *s;
            }
        }
        debug!("SIFT found {} keypoints on a {} x {} image", keypoints.len(), cols, rows);
        (keypoints, descriptors)
    }

    fn base_image(&self, image: ArrayView2<f32>) -> Array2<f32>
    {
        let doubled = double_size(image);
        let diff = self.config.sigma * self.config.sigma - 4.0 * self.config.assumed_blur * self.config.assumed_blur;
        gaussian_blur(doubled.view(), diff.max(0.01).sqrt())
    }

    fn build_scale_space(&self, base: Array2<f32>, num_octaves: usize) -> ScaleSpace
    {
        let n = self.config.num_intervals;
        let sigmas = gaussian_sigmas(self.config.sigma, n);

        let mut gaussians: Vec<Vec<Array2<f32>>> = Vec::with_capacity(num_octaves);
        for octave in 0..num_octaves {
            let first = if octave == 0 {
                base.clone()
            } else {
                half_size(gaussians[octave - 1][n].view())
            };
            if first.nrows() < 2 || first.ncols() < 2 {
                break;
            }
            let mut layers = Vec::with_capacity(n + 3);
            layers.push(first);
            for sigma in sigmas.iter().skip(1) {
                let next = gaussian_blur(layers[layers.len() - 1].view(), *sigma);
                layers.push(next);
            }
            gaussians.push(layers);
        }

        let dogs: Vec<Vec<Array2<f32>>> = gaussians
            .iter()
            .map(|layers| layers.windows(2).map(|w| &w[1] - &w[0]).collect())
            .collect();

        ScaleSpace { gaussians, dogs }
    }

    fn find_scale_space_extrema(&self, space: &ScaleSpace) -> Vec<Keypoint>
    {
        let n = self.config.num_intervals;
        let border = self.config.image_border_width;
        let threshold = (0.5 * self.config.contrast_threshold / n as f32 * 255.0).floor();
        let mut keypoints = Vec::new();

        for (octave, dogs) in space.dogs.iter().enumerate() {
            let (rows, cols) = dogs[0].dim();
            if rows <= 2 * border || cols <= 2 * border {
                continue;
            }
            for layer in 1..=n {
                let (prev, curr, next) = (&dogs[layer - 1], &dogs[layer], &dogs[layer + 1]);
                for r in border..rows - border {
                    for c in border..cols - border {
                        let val = curr[[r, c]];
                        if val.abs() <= threshold || !is_extremum(prev, curr, next, r, c) {
                            continue;
                        }
                        let Some(kp) = self.localize(space, octave, layer, r, c) else {
                            continue;
                        };
                        let gauss = &space.gaussians[octave][kp.layer];
                        for orientation in orientation_peaks(gauss, &kp) {
                            keypoints.push(Keypoint { orientation, ..kp });
                        }
                    }
                }
            }
        }
        keypoints
    }

    /// Refines an extremum to sub-pixel accuracy and applies the contrast and edge tests.
    fn localize(&self, space: &ScaleSpace, octave: usize, layer: usize, r: usize, c: usize) -> Option<Keypoint>
    {
        let n = self.config.num_intervals;
        let border = self.config.image_border_width as isize;
        let dogs = &space.dogs[octave];
        let (rows, cols) = dogs[0].dim();
        let (mut layer, mut r, mut c) = (layer as isize, r as isize, c as isize);
        let mut offset = [0.0f32; 3];

        let mut converged = false;
        for _ in 0..MAX_INTERP_STEPS {
            let (grad, hess) = derivatives(dogs, layer as usize, r as usize, c as usize);
            offset = solve3(&hess, &grad)?.map(|v| -v);
            let [xc, xr, xi] = offset;
            if xc.abs() < 0.5 && xr.abs() < 0.5 && xi.abs() < 0.5 {
                converged = true;
                break;
            }
            if xc.abs() > (i32::MAX / 3) as f32 || xr.abs() > (i32::MAX / 3) as f32 || xi.abs() > (i32::MAX / 3) as f32 {
                return None;
            }
            c += xc.round() as isize;
            r += xr.round() as isize;
            layer += xi.round() as isize;
            if layer < 1 || layer > n as isize
                || c < border || c >= cols as isize - border
                || r < border || r >= rows as isize - border {
                return None;
            }
        }
        if !converged {
            return None;
        }

        let (layer, r, c) = (layer as usize, r as usize, c as usize);
        let (grad, hess) = derivatives(dogs, layer, r, c);
        let t = grad[0] * offset[0] + grad[1] * offset[1] + grad[2] * offset[2];
        let contrast = dogs[layer][[r, c]] * IMG_SCALE + t * 0.5;
        if contrast.abs() * (n as f32) < self.config.contrast_threshold {
            return None;
        }

        // Principal curvature ratio, from the spatial 2x2 Hessian.
        let (dxx, dyy, dxy) = (hess[0][0], hess[1][1], hess[0][1]);
        let tr = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let edge = self.config.edge_threshold;
        if det <= 0.0 || tr * tr * edge >= (edge + 1.0) * (edge + 1.0) * det {
            return None;
        }

        let octave_scale = self.config.sigma * 2f32.powf((layer as f32 + offset[2]) / n as f32);
        // Octave 0 is the doubled image, so one octave step is worth 2^octave / 2 input pixels.
        let to_input = 2f32.powi(octave as i32) * 0.5;
        Some(Keypoint {
            x: (c as f32 + offset[0]) * to_input,
            y: (r as f32 + offset[1]) * to_input,
            orientation: 0.0,
            response: contrast.abs(),
            octave,
            layer,
            octave_x: c as f32 + offset[0],
            octave_y: r as f32 + offset[1],
            octave_scale,
        })
    }

    /// 4x4 spatial by 8 orientation histogram of gradients around the keypoint,
    /// rotated to its orientation.
    fn descriptor(&self, img: &Array2<f32>, kp: &Keypoint) -> [f32; DESCRIPTOR_LEN]
    {
        let d = DESCRIPTOR_WIDTH;
        let n = DESCRIPTOR_HIST_BINS;
        let (rows, cols) = img.dim();
        let (pt_x, pt_y) = (kp.octave_x.round() as isize, kp.octave_y.round() as isize);
        let angle = kp.orientation * PI / 180.0;
        let bins_per_deg = n as f32 / 360.0;
        let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
        let hist_width = DESCR_SCL_FCTR * kp.octave_scale;
        let radius = (hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5).round();
        let radius = radius.min(((rows * rows + cols * cols) as f32).sqrt()) as isize;
        let cos_t = angle.cos() / hist_width;
        let sin_t = angle.sin() / hist_width;

        let stride_o = n + 2;
        let stride_c = stride_o;
        let stride_r = (d + 2) * stride_o;
        let mut hist = vec![0.0f32; (d + 2) * (d + 2) * (n + 2)];

        for i in -radius..=radius {
            for j in -radius..=radius {
                let c_rot = j as f32 * cos_t - i as f32 * sin_t;
                let r_rot = j as f32 * sin_t + i as f32 * cos_t;
                let rbin = r_rot + d as f32 / 2.0 - 0.5;
                let cbin = c_rot + d as f32 / 2.0 - 0.5;
                let r = pt_y + i;
                let c = pt_x + j;
                if rbin <= -1.0 || rbin >= d as f32 || cbin <= -1.0 || cbin >= d as f32
                    || r <= 0 || r >= rows as isize - 1 || c <= 0 || c >= cols as isize - 1 {
                    continue;
                }
                let (r, c) = (r as usize, c as usize);
                let dx = img[[r, c + 1]] - img[[r, c - 1]];
                let dy = img[[r - 1, c]] - img[[r + 1, c]];
                let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
                let grad_ori = dy.atan2(dx).to_degrees().rem_euclid(360.0);
                let mag = (dx * dx + dy * dy).sqrt() * weight;

                let obin = (grad_ori - kp.orientation) * bins_per_deg;
                let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
                let (rbin, cbin, obin) = (rbin - r0, cbin - c0, obin - o0);
                let mut o0 = o0 as isize;
                if o0 < 0 {
                    o0 += n as isize;
                }
                if o0 >= n as isize {
                    o0 -= n as isize;
                }

                // Trilinear interpolation into the neighbouring bins.
                let v_r1 = mag * rbin;
                let v_r0 = mag - v_r1;
                let v_rc11 = v_r1 * cbin;
                let v_rc10 = v_r1 - v_rc11;
                let v_rc01 = v_r0 * cbin;
                let v_rc00 = v_r0 - v_rc01;
                let v_rco111 = v_rc11 * obin;
                let v_rco110 = v_rc11 - v_rco111;
                let v_rco101 = v_rc10 * obin;
                let v_rco100 = v_rc10 - v_rco101;
                let v_rco011 = v_rc01 * obin;
                let v_rco010 = v_rc01 - v_rco011;
                let v_rco001 = v_rc00 * obin;
                let v_rco000 = v_rc00 - v_rco001;

                let idx = (r0 as isize + 1) as usize * stride_r + (c0 as isize + 1) as usize * stride_c + o0 as usize;
                hist[idx] += v_rco000;
                hist[idx + 1] += v_rco001;
                hist[idx + stride_c] += v_rco010;
                hist[idx + stride_c + 1] += v_rco011;
                hist[idx + stride_r] += v_rco100;
                hist[idx + stride_r + 1] += v_rco101;
                hist[idx + stride_r + stride_c] += v_rco110;
                hist[idx + stride_r + stride_c + 1] += v_rco111;
            }
        }

        // Fold the circular orientation overflow bins back and drop the spatial padding.
        let mut dst = [0.0f32; DESCRIPTOR_LEN];
        for i in 0..d {
            for j in 0..d {
                let idx = (i + 1) * stride_r + (j + 1) * stride_c;
                hist[idx] += hist[idx + n];
                hist[idx + 1] += hist[idx + n + 1];
                for k in 0..n {
                    dst[(i * d + j) * n + k] = hist[idx + k];
                }
            }
        }

        let norm = dst.iter().map(|v| v * v).sum::<f32>().sqrt();
        let thr = norm * DESCR_MAG_THR;
        for v in dst.iter_mut() {
            *v = v.min(thr);
        }
        let norm = dst.iter().map(|v| v * v).sum::<f32>().sqrt();
        let scale = INT_DESCR_FCTR / norm.max(f32::EPSILON);
        for v in dst.iter_mut() {
            *v = (*v * scale).round().clamp(0.0, 255.0);
        }
        dst
    }
}

impl FeatureExtractor for Sift
{
    fn descriptor_len(&self) -> usize
    {
        DESCRIPTOR_LEN
    }

    fn compute(&self, image: &DynamicImage) -> Result<DescriptorSet>
    {
        let gray = to_gray_f32(image);
        let (_, descriptors) = self.detect_and_compute(gray.view());
        Ok(descriptors)
    }
}

/// `round(log2(min(rows, cols)) - 1)`, measured on the doubled base image.
pub fn number_of_octaves(rows: usize, cols: usize) -> usize
{
    let min = rows.min(cols);
    if min < 2 {
        return 0;
    }
    ((min as f32).log2() - 1.0).round().max(0.0) as usize
}

/// Incremental blur applied to get from one layer of an octave to the next.
pub fn gaussian_sigmas(sigma: f32, num_intervals: usize) -> Vec<f32>
{
    let k = 2f32.powf(1.0 / num_intervals as f32);
    let mut sigmas = vec![0.0f32; num_intervals + 3];
    sigmas[0] = sigma;
    for (i, s) in sigmas.iter_mut().enumerate().skip(1) {
        let prev = k.powi(i as i32 - 1) * sigma;
        let total = prev * k;
        *s = (total * total - prev * prev).sqrt();
    }
    sigmas
}

fn is_extremum(prev: &Array2<f32>, curr: &Array2<f32>, next: &Array2<f32>, r: usize, c: usize) -> bool
{
    let val = curr[[r, c]];
    let neighbours = || {
        [prev, curr, next].into_iter().flat_map(move |img| {
            (r - 1..=r + 1).flat_map(move |y| (c - 1..=c + 1).map(move |x| img[[y, x]]))
        })
    };
    if val > 0.0 {
        neighbours().all(|v| val >= v)
    } else {
        neighbours().all(|v| val <= v)
    }
}

/// Gradient `[dx, dy, ds]` and Hessian of the DoG at `(layer, r, c)`, on the 0..=1 scale.
fn derivatives(dogs: &[Array2<f32>], layer: usize, r: usize, c: usize) -> ([f32; 3], [[f32; 3]; 3])
{
    let deriv_scale = IMG_SCALE * 0.5;
    let second_deriv_scale = IMG_SCALE;
    let cross_deriv_scale = IMG_SCALE * 0.25;
    let (prev, img, next) = (&dogs[layer - 1], &dogs[layer], &dogs[layer + 1]);

    let v2 = img[[r, c]] * 2.0;
    let dx = (img[[r, c + 1]] - img[[r, c - 1]]) * deriv_scale;
    let dy = (img[[r + 1, c]] - img[[r - 1, c]]) * deriv_scale;
    let ds = (next[[r, c]] - prev[[r, c]]) * deriv_scale;

    let dxx = (img[[r, c + 1]] + img[[r, c - 1]] - v2) * second_deriv_scale;
    let dyy = (img[[r + 1, c]] + img[[r - 1, c]] - v2) * second_deriv_scale;
    let dss = (next[[r, c]] + prev[[r, c]] - v2) * second_deriv_scale;
    let dxy = (img[[r + 1, c + 1]] - img[[r + 1, c - 1]] - img[[r - 1, c + 1]] + img[[r - 1, c - 1]]) * cross_deriv_scale;
    let dxs = (next[[r, c + 1]] - next[[r, c - 1]] - prev[[r, c + 1]] + prev[[r, c - 1]]) * cross_deriv_scale;
    let dys = (next[[r + 1, c]] - next[[r - 1, c]] - prev[[r + 1, c]] + prev[[r - 1, c]]) * cross_deriv_scale;

    ([dx, dy, ds], [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]])
}

/// Solves `a * x = b` by Cramer's rule. `None` if `a` is singular.
fn solve3(a: &[[f32; 3]; 3], b: &[f32; 3]) -> Option<[f32; 3]>
{
    let det = |m: &[[f32; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let d = det(a);
    if d == 0.0 || !d.is_finite() {
        return None;
    }
    let mut x = [0.0f32; 3];
    for (col, out) in x.iter_mut().enumerate() {
        let mut m = *a;
        for row in 0..3 {
            m[row][col] = b[row];
        }
        *out = det(&m) / d;
    }
    Some(x)
}

/// Orientations, in degrees, of every histogram peak within 80% of the highest.
fn orientation_peaks(img: &Array2<f32>, kp: &Keypoint) -> Vec<f32>
{
    let n = ORI_HIST_BINS;
    let (rows, cols) = img.dim();
    let (pr, pc) = (kp.octave_y.round() as isize, kp.octave_x.round() as isize);
    let radius = (ORI_RADIUS * kp.octave_scale).round() as isize;
    let sigma = ORI_SIG_FCTR * kp.octave_scale;
    let exp_scale = -1.0 / (2.0 * sigma * sigma);

    let mut raw = vec![0.0f32; n];
    for i in -radius..=radius {
        let y = pr + i;
        if y <= 0 || y >= rows as isize - 1 {
            continue;
        }
        for j in -radius..=radius {
            let x = pc + j;
            if x <= 0 || x >= cols as isize - 1 {
                continue;
            }
            let (y, x) = (y as usize, x as usize);
            let dx = img[[y, x + 1]] - img[[y, x - 1]];
            let dy = img[[y - 1, x]] - img[[y + 1, x]];
            let weight = (((i * i + j * j) as f32) * exp_scale).exp();
            let ori = dy.atan2(dx).to_degrees().rem_euclid(360.0);
            let mut bin = (ori * n as f32 / 360.0).round() as isize;
            if bin >= n as isize {
                bin -= n as isize;
            }
            if bin < 0 {
                bin += n as isize;
            }
            raw[bin as usize] += weight * (dx * dx + dy * dy).sqrt();
        }
    }

    let at = |i: isize| raw[i.rem_euclid(n as isize) as usize];
    let hist: Vec<f32> = (0..n as isize)
        .map(|i| (at(i - 2) + at(i + 2)) * (1.0 / 16.0) + (at(i - 1) + at(i + 1)) * (4.0 / 16.0) + at(i) * (6.0 / 16.0))
        .collect();

    let max = hist.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = max * ORI_PEAK_RATIO;
    let mut peaks = Vec::new();
    for j in 0..n {
        let l = hist[(j + n - 1) % n];
        let r = hist[(j + 1) % n];
        let h = hist[j];
        if h > l && h > r && h >= threshold {
            let mut bin = j as f32 + 0.5 * (l - r) / (l - 2.0 * h + r);
            if bin < 0.0 {
                bin += n as f32;
            } else if bin >= n as f32 {
                bin -= n as f32;
            }
            peaks.push((360.0 / n as f32) * bin);
        }
    }
    peaks
}

#[cfg(test)]
mod tests
{
    use approx::assert_relative_eq;
    use image::{GrayImage, Luma};

    use super::*;

    /// Bright squares of several sizes on a dark background.
    pub(crate) fn blobs(width: u32, height: u32) -> DynamicImage
    {
        let mut img = GrayImage::from_pixel(width, height, Luma([20]));
        let squares = [(10, 10, 6), (40, 14, 10), (20, 45, 8), (60, 50, 12), (75, 20, 5)];
        for (x0, y0, s) in squares {
            for y in y0..(y0 + s).min(height) {
                for x in x0..(x0 + s).min(width) {
                    img.put_pixel(x, y, Luma([230]));
                }
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn sigmas_match_reference_values()
    {
        let sigmas = gaussian_sigmas(1.6, 3);
        let expected = [1.6, 1.2262735, 1.5450078, 1.9465878, 2.452547, 3.0900156];
        assert_eq!(sigmas.len(), expected.len());
        for (s, e) in sigmas.iter().zip(expected.iter()) {
            assert_relative_eq!(*s, *e, epsilon = 1e-4);
        }
    }

    #[test]
    fn octave_count_follows_image_size()
    {
        assert_eq!(number_of_octaves(446, 648), 8);
        assert_eq!(number_of_octaves(200, 400), 7);
        assert_eq!(number_of_octaves(1, 400), 0);
    }

    #[test]
    fn solve3_inverts_a_diagonal_system()
    {
        let a = [[2.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 0.5]];
        let x = solve3(&a, &[1.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(x[0], 0.5);
        assert_relative_eq!(x[1], 0.5);
        assert_relative_eq!(x[2], 6.0);
        assert!(solve3(&[[0.0; 3]; 3], &[1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn flat_image_has_no_features()
    {
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([128])));
        let sift = Sift::new(SiftConfig::default());
        let descriptors = sift.compute(&flat).unwrap();
        assert_eq!(descriptors.nrows(), 0);
        assert_eq!(descriptors.ncols(), DESCRIPTOR_LEN);
    }

    #[test]
    fn tiny_image_has_no_features()
    {
        let tiny = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([0])));
        let sift = Sift::new(SiftConfig::default());
        assert_eq!(sift.compute(&tiny).unwrap().nrows(), 0);
    }

    #[test]
    fn blobs_produce_bounded_descriptors()
    {
        let sift = Sift::new(SiftConfig::default());
        let gray = to_gray_f32(&blobs(96, 80));
        let (keypoints, descriptors) = sift.detect_and_compute(gray.view());
        assert!(!keypoints.is_empty());
        assert_eq!(keypoints.len(), descriptors.nrows());
        assert_eq!(descriptors.ncols(), 128);
        for row in descriptors.outer_iter() {
            assert!(row.iter().all(|v| (0.0..=255.0).contains(v)));
            assert!(row.iter().any(|v| *v > 0.0));
        }
        for kp in &keypoints {
            assert!(kp.x >= 0.0 && kp.x < 96.0);
            assert!(kp.y >= 0.0 && kp.y < 80.0);
            assert!((0.0..360.0).contains(&kp.orientation));
        }
        // Strongest first.
        for pair in keypoints.windows(2) {
            assert!(pair[0].response >= pair[1].response);
        }
    }

    #[test]
    fn max_features_caps_the_keypoint_count()
    {
        let config = SiftConfig { max_features: 3, ..SiftConfig::default() };
        let sift = Sift::new(config);
        let descriptors = sift.compute(&blobs(96, 80)).unwrap();
        assert!(descriptors.nrows() <= 3);
        assert!(descriptors.nrows() > 0);
    }
}
