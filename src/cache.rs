/// Persisted training descriptors, so extraction can be skipped on later runs.
/// The cache is a set of bincode files: the descriptor table, the label table,
/// and a key describing the run that produced them. A cache written by a run
/// with a different key is treated as missing.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::SiftConfig;
use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::models::{ClassNames, Label, LabelledImage, TrainingSet};

pub const DESCRIPTORS_FILE: &str = "descriptors.bin";
pub const LABELS_FILE: &str = "labels.bin";
pub const KEY_FILE: &str = "key.bin";

/// Everything that decides the content of a cached training set.
/// Labels are stored as class indices, so the class table is part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey
{
    pub classes: ClassNames,
    pub split: String,
    pub images_per_class: usize,
    pub descriptor_len: usize,
    pub sift: SiftConfig,
}

pub struct DescriptorCache
{
    directory: PathBuf,
}

impl DescriptorCache
{
    pub fn new<P: AsRef<Path>>(directory: P) -> Self
    {
        DescriptorCache { directory: directory.as_ref().to_path_buf() }
    }

    pub fn descriptors_path(&self) -> PathBuf
    {
        self.directory.join(DESCRIPTORS_FILE)
    }

    pub fn labels_path(&self) -> PathBuf
    {
        self.directory.join(LABELS_FILE)
    }

    pub fn key_path(&self) -> PathBuf
    {
        self.directory.join(KEY_FILE)
    }

    pub fn exists(&self) -> bool
    {
        self.descriptors_path().is_file() && self.labels_path().is_file() && self.key_path().is_file()
    }

    /// Returns `None` when a file is missing or the cache was written under a
    /// different key. A corrupt file, or a pair whose row counts disagree, is an
    /// error rather than a cache miss.
    pub fn load(&self, key: &CacheKey) -> Result<Option<TrainingSet>>
    {
        if !self.exists() {
            if self.descriptors_path().is_file() || self.labels_path().is_file() || self.key_path().is_file() {
                warn!("Descriptor cache in {:?} is incomplete; ignoring it", self.directory);
            }
            return Ok(None);
        }

        let cached_key: CacheKey = bincode::deserialize_from(BufReader::new(File::open(self.key_path())?))?;
        if cached_key != *key {
            info!("Descriptor cache in {:?} was built with different settings; ignoring it", self.directory);
            return Ok(None);
        }

        let descriptors: Array2<f32> = bincode::deserialize_from(BufReader::new(File::open(self.descriptors_path())?))?;
        let labels: Vec<Label> = bincode::deserialize_from(BufReader::new(File::open(self.labels_path())?))?;
        let training = TrainingSet::new(descriptors, labels)?;
        if training.descriptor_len() != key.descriptor_len {
            warn!(
                "Cached descriptors have length {}, expected {}; ignoring them",
                training.descriptor_len(), key.descriptor_len
            );
            return Ok(None);
        }
        info!("Loaded {} cached descriptors from {:?}", training.len(), self.directory);
        Ok(Some(training))
    }

    /// The key is written last, so an interrupted save leaves no valid cache behind.
    pub fn save(&self, key: &CacheKey, training: &TrainingSet) -> Result<()>
    {
        std::fs::create_dir_all(&self.directory)?;
        self.clear()?;

        let mut writer = BufWriter::new(File::create(self.descriptors_path())?);
        bincode::serialize_into(&mut writer, &training.descriptors())?;
        writer.flush()?;

        let mut writer = BufWriter::new(File::create(self.labels_path())?);
        bincode::serialize_into(&mut writer, training.labels())?;
        writer.flush()?;

        let mut writer = BufWriter::new(File::create(self.key_path())?);
        bincode::serialize_into(&mut writer, key)?;
        writer.flush()?;
        info!("Saved {} descriptors to {:?}", training.len(), self.directory);
        Ok(())
    }

    pub fn clear(&self) -> Result<()>
    {
        for path in [self.key_path(), self.descriptors_path(), self.labels_path()] {
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Loads the training set for `key`, or extracts it from `images` and saves it.
    ///
    /// With `refresh` the existing cache is discarded first and always rebuilt.
    pub fn load_or_extract(
        &self,
        key: &CacheKey,
        refresh: bool,
        extractor: &dyn FeatureExtractor,
        images: &[LabelledImage],
    ) -> Result<TrainingSet>
    {
        if refresh {
            info!("Refreshing descriptor cache in {:?}", self.directory);
            self.clear()?;
        } else if let Some(training) = self.load(key)? {
            return Ok(training);
        }

        let training = extractor.extract_from(images, key.images_per_class)?;
        self.save(key, &training)?;
        Ok(training)
    }
}
