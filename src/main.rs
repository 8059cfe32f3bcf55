use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};

use scene_knn::cache::{CacheKey, DescriptorCache};
use scene_knn::classifier::SceneClassifier;
use scene_knn::config::{Config, SearchBackend};
use scene_knn::dataset::Dataset;
use scene_knn::evaluation;
use scene_knn::features::FeatureExtractor;
use scene_knn::models::TrainingSet;
use scene_knn::sift::Sift;

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Classifies scene images with SIFT descriptors and k-NN voting, and reports test accuracy.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Dataset root, laid out as <root>/<split>/<class>/<image>
    #[arg(long)]
    dataset: PathBuf,

    /// JSON configuration file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Neighbours consulted per descriptor
    #[arg(long)]
    k: Option<usize>,

    /// Threads used to classify test images
    #[arg(long)]
    workers: Option<usize>,

    /// Keypoints kept per image, strongest first (0 keeps all)
    #[arg(long)]
    max_features: Option<usize>,

    /// Training images read per class
    #[arg(long)]
    images_per_class: Option<usize>,

    /// Nearest neighbour search backend
    #[arg(long, value_enum)]
    backend: Option<SearchBackend>,

    #[arg(long)]
    train_split: Option<String>,

    #[arg(long)]
    test_split: Option<String>,

    /// Descriptor cache directory, relative to the dataset root unless absolute
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Neither read nor write the descriptor cache
    #[arg(long, conflicts_with = "refresh_cache")]
    no_cache: bool,

    /// Recompute the training descriptors and overwrite the cache
    #[arg(long)]
    refresh_cache: bool,

    /// Write the evaluation summary as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(Config, Options)> {
        let mut config = match &self.config {
            Some(path) => Config::load(path).with_context(|| format!("Failed to load config {:?}", path))?,
            None => Config::default(),
        };
        if let Some(k) = self.k { config.knn.k = k; }
        if let Some(workers) = self.workers { config.evaluation.workers = workers; }
        if let Some(max_features) = self.max_features { config.sift.max_features = max_features; }
        if let Some(cap) = self.images_per_class { config.training.images_per_class = cap; }
        if let Some(backend) = self.backend { config.knn.backend = backend; }
        if let Some(split) = self.train_split { config.training.split = split; }
        if let Some(split) = self.test_split { config.evaluation.split = split; }
        if let Some(dir) = self.cache_dir { config.cache.directory = dir; }
        if self.no_cache { config.cache.enabled = false; }
        config.validate()?;

        let options = Options {
            dataset: self.dataset,
            refresh_cache: self.refresh_cache,
            report: self.report,
        };
        Ok((config, options))
    }
}

struct Options {
    dataset: PathBuf,
    refresh_cache: bool,
    report: Option<PathBuf>,
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.filter_level(LOG_LEVEL);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn training_set(config: &Config, options: &Options, dataset: &Dataset, sift: &Sift) -> anyhow::Result<TrainingSet> {
    let train = dataset.split(&config.training.split)?;
    info!("Found {} training images", train.len());
    let now = std::time::Instant::now();

    let training = if config.cache.enabled {
        let key = CacheKey {
            classes: dataset.classes().clone(),
            split: config.training.split.clone(),
            images_per_class: config.training.images_per_class,
            descriptor_len: sift.descriptor_len(),
            sift: config.sift,
        };
        DescriptorCache::new(config.cache_dir(dataset.root()))
            .load_or_extract(&key, options.refresh_cache, sift, &train)
            .context("Failed to load or extract training descriptors")?
    } else {
        sift.extract_from(&train, config.training.images_per_class)
            .context("Failed to extract training descriptors")?
    };
    info!("Training set of {} descriptors ready in {:?}", training.len(), now.elapsed());
    Ok(training)
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let (config, options) = Args::parse().into_config()?;

    let wall = std::time::Instant::now();
    let cpu = cpu_time::ProcessTime::now();

    let dataset = Dataset::open(&options.dataset, &[config.training.split.as_str(), config.evaluation.split.as_str()])
        .with_context(|| format!("Failed to open dataset {:?}", options.dataset))?;
    info!("Dataset {:?} has {} classes", dataset.root(), dataset.classes().len());

    let sift = Sift::new(config.sift);
    let training = training_set(&config, &options, &dataset, &sift)?;
    let classifier = SceneClassifier::train(Box::new(sift), training, &config.knn)
        .context("Failed to train the classifier")?;

    let test = dataset.split(&config.evaluation.split)?;
    let evaluation = evaluation::evaluate(&classifier, &test, config.evaluation.workers)?;
    evaluation.log_summary(dataset.classes());

    if let Some(path) = &options.report {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create report {:?}", path))?
        );
        serde_json::to_writer_pretty(&mut writer, &evaluation.summary(dataset.classes()))?;
        writer.flush()?;
        info!("Wrote report to {:?}", path);
    }

    info!("Done in {:.2?} (CPU time {:.2?})", wall.elapsed(), cpu.elapsed());
    Ok(())
}
