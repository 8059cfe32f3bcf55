use std::path::PathBuf;

use log::{debug, error, info, warn};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::Serialize;

use crate::classifier::SceneClassifier;
use crate::error::{Error, Result};
use crate::models::{ClassNames, Label, LabelledImage};

/// What happened to one test image.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum ImageOutcome
{
    Predicted(Label),
    /// The extractor found no keypoints, so there was nothing to vote on.
    NoFeatures,
    /// Loading or classifying the image failed. The rest of the batch still runs.
    Failed(Error),
}

#[derive(Debug, Serialize)]
pub struct ImageResult
{
    pub path: PathBuf,
    pub truth: Label,
    #[serde(flatten)]
    pub outcome: ImageOutcome,
}

impl ImageResult
{
    pub fn predicted(&self) -> Option<Label>
    {
        match self.outcome {
            ImageOutcome::Predicted(label) => Some(label),
            _ => None,
        }
    }

    pub fn is_correct(&self) -> bool
    {
        self.predicted() == Some(self.truth)
    }
}

/// Classifies every test image on a pool of `workers` threads.
///
/// Each image is handled independently; a failure is recorded against that image
/// and never aborts the batch. Results come back in the order of `test`.
pub fn evaluate(classifier: &SceneClassifier, test: &[LabelledImage], workers: usize) -> Result<Evaluation>
{
    if workers == 0 {
        return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("evaluation-{i}"))
        .build()?;

    info!("Classifying {} test images on {} workers", test.len(), workers);
    let now = std::time::Instant::now();
    let results: Vec<ImageResult> = pool.install(|| {
        test.par_iter()
            .map(|image| classify_one(classifier, image))
            .collect()
    });
    info!("Classified {} test images in {:?}", results.len(), now.elapsed());

    Ok(Evaluation { results })
}

fn classify_one(classifier: &SceneClassifier, image: &LabelledImage) -> ImageResult
{
    let outcome = match classifier.classify_path(&image.path) {
        Ok(label) => {
            debug!("{:?}: truth {}, predicted {}", image.path, image.label, label);
            ImageOutcome::Predicted(label)
        },
        Err(Error::NoFeaturesDetected) => {
            warn!("{:?}: no features detected, skipping", image.path);
            ImageOutcome::NoFeatures
        },
        Err(e) => {
            error!("{:?}: {}", image.path, e);
            ImageOutcome::Failed(e)
        },
    };
    ImageResult { path: image.path.clone(), truth: image.label, outcome }
}

#[derive(Debug)]
pub struct Evaluation
{
    results: Vec<ImageResult>,
}

impl Evaluation
{
    pub fn from_results(results: Vec<ImageResult>) -> Self
    {
        Evaluation { results }
    }

    pub fn results(&self) -> &[ImageResult]
    {
        &self.results
    }

    /// `(num_correct, num_total)` over the images that produced a prediction.
    pub fn counts(&self) -> (usize, usize)
    {
        let predicted = self.results.iter().filter(|r| r.predicted().is_some());
        let (correct, total) = predicted.fold((0, 0), |(correct, total), r| {
            (correct + r.is_correct() as usize, total + 1)
        });
        (correct, total)
    }

    /// Percentage of predicted images that were correct. `None` if nothing was predicted.
    pub fn accuracy(&self) -> Option<f64>
    {
        match self.counts() {
            (_, 0) => None,
            (correct, total) => Some(100.0 * correct as f64 / total as f64),
        }
    }

    pub fn no_features(&self) -> impl Iterator<Item = &ImageResult>
    {
        self.results.iter().filter(|r| matches!(r.outcome, ImageOutcome::NoFeatures))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ImageResult>
    {
        self.results.iter().filter(|r| matches!(r.outcome, ImageOutcome::Failed(_)))
    }

    /// Confusion matrix over the predicted images, sized to cover `num_classes`
    /// and every label that occurs.
    pub fn confusion_matrix(&self, num_classes: usize) -> ConfusionMatrix
    {
        let largest = self.results
            .iter()
            .flat_map(|r| std::iter::once(r.truth).chain(r.predicted()))
            .map(|l| l.index() + 1)
            .max()
            .unwrap_or(0);
        let mut matrix = ConfusionMatrix::new(num_classes.max(largest));
        for r in &self.results {
            if let Some(predicted) = r.predicted() {
                matrix.add(r.truth, predicted);
            }
        }
        matrix
    }

    pub fn summary(&self, classes: &ClassNames) -> Summary<'_>
    {
        let (num_correct, num_total) = self.counts();
        let matrix = self.confusion_matrix(classes.len());
        let per_class = (0..matrix.num_classes())
            .map(|c| {
                let label = Label(c as u32);
                ClassSummary { class: classes.name_of(label), scores: matrix.scores(label) }
            })
            .collect();
        Summary {
            num_correct,
            num_total,
            num_no_features: self.no_features().count(),
            num_failed: self.failures().count(),
            accuracy: self.accuracy(),
            macro_scores: matrix.macro_scores(),
            per_class,
            confusion_matrix: matrix.rows(),
            images: &self.results,
        }
    }

    /// Logs accuracy, the per-class scores and the confusion matrix.
    pub fn log_summary(&self, classes: &ClassNames)
    {
        let summary = self.summary(classes);
        if summary.num_no_features > 0 {
            warn!("{} test images had no features and were not counted", summary.num_no_features);
        }
        if summary.num_failed > 0 {
            warn!("{} test images could not be classified and were not counted", summary.num_failed);
        }

        let width = classes.iter().map(str::len).max().unwrap_or(0).max(8);
        info!("{:>width$}  precision  recall  f-score  support", "class");
        for class in &summary.per_class {
            let s = &class.scores;
            info!("{:>width$}  {:>9.3}  {:>6.3}  {:>7.3}  {:>7}", class.class, s.precision, s.recall, s.f_score, s.support);
        }
        let m = &summary.macro_scores;
        info!("{:>width$}  {:>9.3}  {:>6.3}  {:>7.3}  {:>7}", "macro avg", m.precision, m.recall, m.f_score, m.support);

        info!("Confusion matrix (rows: truth, columns: predicted):");
        for (class, row) in summary.per_class.iter().zip(&summary.confusion_matrix) {
            let cells: Vec<String> = row.iter().map(|n| format!("{n:>5}")).collect();
            info!("{:>width$} {}", class.class, cells.join(""));
        }

        let (num_correct, num_total) = (summary.num_correct, summary.num_total);
        match summary.accuracy {
            Some(accuracy) => info!("Final accuracy: {accuracy:.2}% ({num_correct}/{num_total})"),
            None => warn!("Final accuracy: undefined, no test image produced a prediction"),
        }
    }
}

/// Counts of (truth, predicted) pairs. Rows are ground truth, columns are predictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix
{
    counts: Array2<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores
{
    pub precision: f64,
    pub recall: f64,
    pub f_score: f64,
    /// Number of ground-truth images counted.
    pub support: usize,
}

impl ConfusionMatrix
{
    pub fn new(num_classes: usize) -> Self
    {
        ConfusionMatrix { counts: Array2::zeros((num_classes, num_classes)) }
    }

    pub fn num_classes(&self) -> usize
    {
        self.counts.nrows()
    }

    /// Panics if either label is outside the matrix.
    pub fn add(&mut self, truth: Label, predicted: Label)
    {
        self.counts[[truth.index(), predicted.index()]] += 1;
    }

    pub fn get(&self, truth: Label, predicted: Label) -> usize
    {
        self.counts[[truth.index(), predicted.index()]]
    }

    pub fn rows(&self) -> Vec<Vec<usize>>
    {
        self.counts.outer_iter().map(|row| row.to_vec()).collect()
    }

    /// Precision, recall and F-score of one class. A ratio with a zero
    /// denominator is reported as 0.
    pub fn scores(&self, label: Label) -> Scores
    {
        let c = label.index();
        let hits = self.counts[[c, c]] as f64;
        let support = self.counts.row(c).sum();
        let predicted = self.counts.column(c).sum();
        let precision = ratio(hits, predicted as f64);
        let recall = ratio(hits, support as f64);
        let f_score = ratio(2.0 * precision * recall, precision + recall);
        Scores { precision, recall, f_score, support }
    }

    /// Unweighted mean of the per-class scores over classes with at least one
    /// ground-truth image.
    pub fn macro_scores(&self) -> Scores
    {
        let present: Vec<Scores> = self.counts
            .sum_axis(Axis(1))
            .iter()
            .enumerate()
            .filter(|(_, support)| **support > 0)
            .map(|(c, _)| self.scores(Label(c as u32)))
            .collect();
        let n = present.len() as f64;
        Scores {
            precision: ratio(present.iter().map(|s| s.precision).sum(), n),
            recall: ratio(present.iter().map(|s| s.recall).sum(), n),
            f_score: ratio(present.iter().map(|s| s.f_score).sum(), n),
            support: present.iter().map(|s| s.support).sum(),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64
{
    if denominator > 0.0 { numerator / denominator } else { 0.0 }
}

#[derive(Debug, Serialize)]
pub struct ClassSummary
{
    pub class: String,
    #[serde(flatten)]
    pub scores: Scores,
}

/// Serializable evaluation report.
#[derive(Debug, Serialize)]
pub struct Summary<'a>
{
    pub num_correct: usize,
    pub num_total: usize,
    pub num_no_features: usize,
    pub num_failed: usize,
    pub accuracy: Option<f64>,
    pub macro_scores: Scores,
    pub per_class: Vec<ClassSummary>,
    pub confusion_matrix: Vec<Vec<usize>>,
    pub images: &'a [ImageResult],
}
