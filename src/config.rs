/// Settings for every stage of the pipeline.
/// Any field missing from a config file falls back to its default, so a file
/// only needs to name the values it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_MAX_FEATURES: usize = 100;
pub const DEFAULT_K: usize = 5;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_IMAGES_PER_CLASS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config
{
    pub sift: SiftConfig,
    pub knn: KnnConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig
{
    /// Keep at most this many keypoints per image, strongest first. Zero keeps all.
    pub max_features: usize,
    pub num_intervals: usize,
    pub sigma: f32,
    /// Blur already present in the input image.
    pub assumed_blur: f32,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    /// Keypoints closer than this to the border of their octave image are discarded.
    pub image_border_width: usize,
}

impl Default for SiftConfig
{
    fn default() -> Self
    {
        SiftConfig {
            max_features: DEFAULT_MAX_FEATURES,
            num_intervals: 3,
            sigma: 1.6,
            assumed_blur: 0.5,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            image_border_width: 5,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend
{
    /// Brute-force Euclidean scan. Deterministic.
    #[default]
    Exact,
    /// Approximate search over an HNSW graph.
    Hnsw,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig
{
    pub k: usize,
    pub backend: SearchBackend,
    pub hnsw: HnswConfig,
}

impl Default for KnnConfig
{
    fn default() -> Self
    {
        KnnConfig {
            k: DEFAULT_K,
            backend: SearchBackend::Exact,
            hnsw: HnswConfig::default(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig
{
    // The maximum number of links from one point to others.
    // Values from 16 to 64 are standard, with higher being more time consuming.
    pub max_nb_connection: usize,
    // Must be less than or equal to 16.
    pub nb_layer: usize,
    // Values from 400 to 800 are standard, with higher being more time consuming.
    pub ef_construction: usize,
    // Width of the search in the lowest layer. Raised to k if smaller.
    pub ef_search: usize,
}

impl Default for HnswConfig
{
    fn default() -> Self
    {
        HnswConfig {
            max_nb_connection: 24,
            nb_layer: 16,
            ef_construction: 400,
            ef_search: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig
{
    pub split: String,
    /// Only the first this-many images of each class contribute descriptors.
    pub images_per_class: usize,
}

impl Default for TrainingConfig
{
    fn default() -> Self
    {
        TrainingConfig {
            split: "train".to_string(),
            images_per_class: DEFAULT_IMAGES_PER_CLASS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig
{
    pub split: String,
    pub workers: usize,
}

impl Default for EvaluationConfig
{
    fn default() -> Self
    {
        EvaluationConfig {
            split: "test".to_string(),
            workers: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig
{
    pub enabled: bool,
    /// Relative paths are resolved against the dataset root.
    pub directory: PathBuf,
}

impl Default for CacheConfig
{
    fn default() -> Self
    {
        CacheConfig {
            enabled: true,
            directory: PathBuf::from("descriptor_cache"),
        }
    }
}

impl Config
{
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let file = std::fs::File::open(path)?;
        let config: Config = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()>
    {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.knn.k == 0 {
            return invalid("knn.k must be at least 1");
        }
        if self.evaluation.workers == 0 {
            return invalid("evaluation.workers must be at least 1");
        }
        if self.training.images_per_class == 0 {
            return invalid("training.images_per_class must be at least 1");
        }
        if self.sift.num_intervals == 0 {
            return invalid("sift.num_intervals must be at least 1");
        }
        if !(self.sift.sigma > 0.0) || !(self.sift.contrast_threshold > 0.0) || !(self.sift.edge_threshold > 0.0) {
            return invalid("sift.sigma, sift.contrast_threshold and sift.edge_threshold must be positive");
        }
        if self.sift.image_border_width == 0 {
            return invalid("sift.image_border_width must be at least 1");
        }
        if self.sift.assumed_blur < 0.0 {
            return invalid("sift.assumed_blur must not be negative");
        }
        if self.knn.hnsw.nb_layer == 0 || self.knn.hnsw.nb_layer > 16 {
            return invalid("knn.hnsw.nb_layer must be between 1 and 16");
        }
        if self.knn.hnsw.max_nb_connection == 0 {
            return invalid("knn.hnsw.max_nb_connection must be at least 1");
        }
        Ok(())
    }

    /// Resolves the cache directory against the dataset root.
    pub fn cache_dir(&self, dataset_root: &Path) -> PathBuf
    {
        if self.cache.directory.is_absolute() {
            self.cache.directory.clone()
        } else {
            dataset_root.join(&self.cache.directory)
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn defaults_are_valid()
    {
        let config = Config::default();
        assert_eq!(config.sift.max_features, 100);
        assert_eq!(config.knn.k, 5);
        assert_eq!(config.knn.backend, SearchBackend::Exact);
        assert_eq!(config.evaluation.workers, 4);
        assert_eq!(config.training.images_per_class, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults()
    {
        let config: Config = serde_json::from_str(r#"{ "knn": { "k": 3, "backend": "hnsw" } }"#).unwrap();
        assert_eq!(config.knn.k, 3);
        assert_eq!(config.knn.backend, SearchBackend::Hnsw);
        assert_eq!(config.knn.hnsw, HnswConfig::default());
        assert_eq!(config.training.split, "train");
        assert_eq!(config.sift, SiftConfig::default());
    }

    #[test]
    fn zero_k_is_invalid()
    {
        let mut config = Config::default();
        config.knn.k = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn cache_dir_is_relative_to_the_dataset()
    {
        let config = Config::default();
        assert_eq!(
            config.cache_dir(Path::new("/data/scenes")),
            PathBuf::from("/data/scenes/descriptor_cache")
        );
    }
}
