use std::path::Path;

use image::DynamicImage;
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::models::{Label, LabelledImage, TrainingSet};
use crate::preprocessing;

/// One descriptor per row. May have zero rows.
pub type DescriptorSet = Array2<f32>;

/// A local feature descriptor. Implementors only provide the per-image
/// computation; loading from disk and pooling a labelled training set
/// are built on top of it.
pub trait FeatureExtractor: Send + Sync
{
    /// Length of every descriptor row this extractor produces.
    fn descriptor_len(&self) -> usize;

    /// Computes the descriptors of a decoded image. Colour images are
    /// converted to grayscale by the extractor. Returns zero rows when no
    /// keypoint is found.
    fn compute(&self, image: &DynamicImage) -> Result<DescriptorSet>;

    fn extract(&self, path: &Path) -> Result<DescriptorSet>
    {
        let image = preprocessing::load_image(path)?;
        self.compute(&image)
    }

    /// Pools the descriptors of the given images into one training set.
    ///
    /// Images are accepted in order until `images_per_class` images of a class
    /// have been read; later images of that class are skipped. An accepted image
    /// with no descriptors still uses up one of its class's slots but adds no rows.
    /// Any unreadable image fails the whole call.
    fn extract_from(&self, images: &[LabelledImage], images_per_class: usize) -> Result<TrainingSet>
    {
        let selected = select_per_class(images, images_per_class);
        info!("Extracting descriptors from {} of {} training images", selected.len(), images.len());

        // Computed in parallel, pooled in input order.
        let sets = selected
            .par_iter()
            .map(|image| {
                let descriptors = self.extract(&image.path)?;
                debug!("{:?}: {} descriptors", image.path, descriptors.nrows());
                Ok((descriptors, image.label))
            })
            .collect::<Result<Vec<(DescriptorSet, Label)>>>()?;

        let training = TrainingSet::pool(self.descriptor_len(), sets)?;
        info!("Pooled {} descriptors", training.len());
        Ok(training)
    }
}

/// The first `per_class` images of every label, in input order.
pub fn select_per_class(images: &[LabelledImage], per_class: usize) -> Vec<&LabelledImage>
{
    let mut taken: FxHashMap<Label, usize> = FxHashMap::default();
    images
        .iter()
        .filter(|image| {
            let count = taken.entry(image.label).or_insert(0);
            if *count < per_class {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;

    use image::{GrayImage, Luma};

    use super::*;
    use crate::error::Error;

    /// Produces one descriptor row per 10 units of average brightness.
    struct BrightnessExtractor;

    impl FeatureExtractor for BrightnessExtractor
    {
        fn descriptor_len(&self) -> usize
        {
            2
        }

        fn compute(&self, image: &DynamicImage) -> Result<DescriptorSet>
        {
            let gray = image.to_luma8();
            let mean = gray.pixels().map(|p| p[0] as f32).sum::<f32>() / (gray.width() * gray.height()) as f32;
            let rows = (mean / 10.0) as usize;
            Ok(Array2::from_shape_fn((rows, 2), |(i, j)| mean + (i * 2 + j) as f32))
        }
    }

    fn write_image(dir: &Path, name: &str, value: u8) -> PathBuf
    {
        let path = dir.join(name);
        GrayImage::from_pixel(4, 4, Luma([value])).save(&path).unwrap();
        path
    }

    #[test]
    fn selection_caps_images_per_class()
    {
        let images: Vec<LabelledImage> = (0..10)
            .map(|i| LabelledImage { path: PathBuf::from(format!("{i}.png")), label: Label(i % 2) })
            .collect();
        let selected = select_per_class(&images, 3);
        assert_eq!(selected.len(), 6);
        assert_eq!(selected.iter().filter(|i| i.label == Label(0)).count(), 3);
        assert_eq!(selected.iter().filter(|i| i.label == Label(1)).count(), 3);
        let names: Vec<_> = selected.iter().map(|i| i.path.to_str().unwrap()).collect();
        assert_eq!(names, vec!["0.png", "1.png", "2.png", "3.png", "4.png", "5.png"]);
    }

    #[test]
    fn extract_from_pools_in_order_and_skips_empty_images()
    {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![
            LabelledImage { path: write_image(dir.path(), "a.png", 20), label: Label(0) },
            LabelledImage { path: write_image(dir.path(), "b.png", 5), label: Label(1) },
            LabelledImage { path: write_image(dir.path(), "c.png", 30), label: Label(1) },
            LabelledImage { path: write_image(dir.path(), "d.png", 40), label: Label(0) },
        ];

        let training = BrightnessExtractor.extract_from(&images, 30).unwrap();
        assert_eq!(training.len(), 2 + 0 + 3 + 4);
        assert_eq!(
            training.labels(),
            &[Label(0), Label(0), Label(1), Label(1), Label(1), Label(0), Label(0), Label(0), Label(0)]
        );
        assert_eq!(training.descriptors()[[2, 0]], 30.0);

        // Only the first image of each class is read; b.png is empty so class 1 adds nothing.
        let capped = BrightnessExtractor.extract_from(&images, 1).unwrap();
        assert_eq!(capped.labels(), &[Label(0), Label(0)]);
    }

    #[test]
    fn unreadable_training_image_is_fatal()
    {
        let images = vec![LabelledImage { path: PathBuf::from("/nonexistent/x.png"), label: Label(0) }];
        let result = BrightnessExtractor.extract_from(&images, 30);
        assert!(matches!(result, Err(Error::Image(_)) | Err(Error::Io(_))));
    }
}
