use std::path::Path;

use image::DynamicImage;
use log::debug;

use crate::error::{Error, Result};
use crate::features::{DescriptorSet, FeatureExtractor};
use crate::knn::KnnClassifier;
use crate::models::{Label, TrainingSet};
use crate::config::KnnConfig;
use crate::preprocessing;
use crate::vote;

/// Image-level classifier: every descriptor of an image votes with its
/// k-NN prediction and the most common vote wins.
pub struct SceneClassifier
{
    extractor: Box<dyn FeatureExtractor>,
    knn: KnnClassifier,
}

impl SceneClassifier
{
    pub fn new(extractor: Box<dyn FeatureExtractor>, knn: KnnClassifier) -> Result<Self>
    {
        if extractor.descriptor_len() != knn.descriptor_len() {
            return Err(Error::ShapeMismatch {
                what: "descriptor length of the trained index",
                expected: extractor.descriptor_len(),
                found: knn.descriptor_len(),
            });
        }
        Ok(SceneClassifier { extractor, knn })
    }

    /// Trains the k-NN index and pairs it with the extractor that produced the training set.
    pub fn train(extractor: Box<dyn FeatureExtractor>, training: TrainingSet, config: &KnnConfig) -> Result<Self>
    {
        let knn = KnnClassifier::train(training, config)?;
        Self::new(extractor, knn)
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor
    {
        self.extractor.as_ref()
    }

    pub fn knn(&self) -> &KnnClassifier
    {
        &self.knn
    }

    /// Fails with `NoFeaturesDetected` when the image yields no descriptors.
    pub fn classify_image(&self, image: &DynamicImage) -> Result<Label>
    {
        let descriptors = self.extractor.compute(image)?;
        self.classify_descriptors(&descriptors)
    }

    pub fn classify_path(&self, path: &Path) -> Result<Label>
    {
        let image = preprocessing::load_image(path)?;
        let label = self.classify_image(&image)?;
        debug!("{:?} predicted as {}", path, label);
        Ok(label)
    }

    pub fn classify_descriptors(&self, descriptors: &DescriptorSet) -> Result<Label>
    {
        let predictions = self.knn.predict(descriptors.view())?;
        vote::plurality(&predictions).ok_or(Error::NoFeaturesDetected)
    }
}
