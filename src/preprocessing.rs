/// Image loading and the float image operations the SIFT scale space is built from.
/// Images are `Array2<f32>` indexed `[[row, col]]` with intensities in 0..=255.

use std::path::Path;

use image::DynamicImage;
use log::trace;
use ndarray::{Array2, ArrayView2, Zip};

use crate::error::Result;

pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage>
{
    let img = image::open(path.as_ref())?;
    trace!("Loaded {:?} ({} x {})", path.as_ref(), img.width(), img.height());
    Ok(img)
}

/// Converts to 8-bit grayscale first so that intensities match what a
/// BGR-to-gray conversion of a decoded JPEG would give.
pub fn to_gray_f32(image: &DynamicImage) -> Array2<f32>
{
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        f32::from(gray.get_pixel(x as u32, y as u32)[0])
    })
}

/// Index into `0..len` reflecting about the edge pixel (`dcb|abcd|cba`).
#[inline]
fn reflect_101(i: isize, len: usize) -> usize
{
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let mut i = i;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * len - 2 - i;
        }
    }
    i as usize
}

fn gaussian(x: f32, sigma: f32) -> f32
{
    (-(x * x) / (2.0 * sigma * sigma)).exp()
}

/// Normalised 1-D Gaussian kernel of radius `round(4 * sigma)`.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32>
{
    let radius = ((sigma * 4.0).round() as usize).max(1);
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| gaussian(i as f32 - radius as f32, sigma))
        .collect();
    let sum: f32 = kernel.iter().sum();
    for val in kernel.iter_mut() {
        *val /= sum;
    }
    kernel
}

fn horizontal_filter(image: ArrayView2<f32>, kernel: &[f32]) -> Array2<f32>
{
    let (rows, cols) = image.dim();
    let radius = (kernel.len() / 2) as isize;
    let mut out = Array2::<f32>::zeros((rows, cols));
    Zip::indexed(&mut out).for_each(|(y, x), out| {
        let mut acc = 0.0;
        for (k, weight) in kernel.iter().enumerate() {
            let sx = reflect_101(x as isize + k as isize - radius, cols);
            acc += weight * image[[y, sx]];
        }
        *out = acc;
    });
    out
}

fn vertical_filter(image: ArrayView2<f32>, kernel: &[f32]) -> Array2<f32>
{
    let (rows, cols) = image.dim();
    let radius = (kernel.len() / 2) as isize;
    let mut out = Array2::<f32>::zeros((rows, cols));
    Zip::indexed(&mut out).for_each(|(y, x), out| {
        let mut acc = 0.0;
        for (k, weight) in kernel.iter().enumerate() {
            let sy = reflect_101(y as isize + k as isize - radius, rows);
            acc += weight * image[[sy, x]];
        }
        *out = acc;
    });
    out
}

pub fn gaussian_blur(image: ArrayView2<f32>, sigma: f32) -> Array2<f32>
{
    if image.is_empty() || sigma <= 0.0 {
        return image.to_owned();
    }
    let kernel = gaussian_kernel(sigma);
    let tmp = horizontal_filter(image, &kernel);
    vertical_filter(tmp.view(), &kernel)
}

/// Bilinear upsampling to twice the width and height, pixel centres aligned
/// (`INTER_LINEAR` sampling), so keypoint coordinates halve back exactly.
pub fn double_size(image: ArrayView2<f32>) -> Array2<f32>
{
    let (rows, cols) = image.dim();
    if image.is_empty() {
        return Array2::zeros((rows * 2, cols * 2));
    }
    let sample =|pos: f32, len: usize| -> (usize, usize, f32) {
        let pos = pos.max(0.0);
        let i0 = (pos.floor() as usize).min(len - 1);
        let i1 = (i0 + 1).min(len - 1);
        (i0, i1, pos - i0 as f32)
    };
    Array2::from_shape_fn((rows * 2, cols * 2), |(y, x)| {
        let (y0, y1, fy) = sample((y as f32 + 0.5) * 0.5 - 0.5, rows);
        let (x0, x1, fx) = sample((x as f32 + 0.5) * 0.5 - 0.5, cols);
        let top = image[[y0, x0]] * (1.0 - fx) + image[[y0, x1]] * fx;
        let bottom = image[[y1, x0]] * (1.0 - fx) + image[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

/// Nearest-neighbour downsampling: keeps every second pixel in each direction.
pub fn half_size(image: ArrayView2<f32>) -> Array2<f32>
{
    let (rows, cols) = image.dim();
    Array2::from_shape_fn((rows / 2, cols / 2), |(y, x)| image[[2 * y, 2 * x]])
}

#[cfg(test)]
mod tests
{
    use approx::assert_relative_eq;
    use image::{GrayImage, Luma};
    use ndarray::array;

    use super::*;

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric()
    {
        let kernel = gaussian_kernel(1.6);
        assert_eq!(kernel.len(), 2 * 6 + 1);
        assert_relative_eq!(kernel.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        for i in 0..kernel.len() / 2 {
            assert_relative_eq!(kernel[i], kernel[kernel.len() - 1 - i]);
        }
    }

    #[test]
    fn blur_keeps_flat_images_flat()
    {
        let flat = Array2::<f32>::from_elem((9, 13), 42.0);
        let blurred = gaussian_blur(flat.view(), 2.0);
        for v in blurred.iter() {
            assert_relative_eq!(*v, 42.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn reflect_101_mirrors_about_the_edge()
    {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn resize_round_trip_dimensions()
    {
        let img = array![[0.0f32, 10.0, 20.0], [30.0, 40.0, 50.0]];
        let doubled = double_size(img.view());
        assert_eq!(doubled.dim(), (4, 6));
        assert_relative_eq!(doubled[[0, 0]], 0.0);
        assert_relative_eq!(doubled[[3, 5]], 50.0);
        let halved = half_size(doubled.view());
        assert_eq!(halved.dim(), (2, 3));
    }

    #[test]
    fn doubling_aligns_pixel_centres()
    {
        // Output pixel x samples input position (x + 0.5) / 2 - 0.5, clamped at the edges.
        let doubled = double_size(array![[0.0f32, 4.0]].view());
        let row: Vec<f32> = doubled.row(0).to_vec();
        assert_eq!(row.len(), 4);
        for (v, e) in row.iter().zip([0.0, 1.0, 3.0, 4.0]) {
            assert_relative_eq!(*v, e);
        }
        assert_eq!(doubled.row(1).to_vec(), row);
    }

    #[test]
    fn gray_conversion_uses_row_major_layout()
    {
        let mut img = GrayImage::new(3, 2);
        img.put_pixel(2, 1, Luma([200]));
        let gray = to_gray_f32(&DynamicImage::ImageLuma8(img));
        assert_eq!(gray.dim(), (2, 3));
        assert_relative_eq!(gray[[1, 2]], 200.0);
        assert_relative_eq!(gray[[0, 0]], 0.0);
    }
}
