use log::info;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::ann::{ExactSearch, HnswSearch, NeighborSearch};
use crate::config::{KnnConfig, SearchBackend};
use crate::error::{Error, Result};
use crate::models::{Label, TrainingSet};
use crate::vote;

/// k-nearest-neighbour classifier over labelled descriptors.
///
/// The index is built once by `train` and never mutated afterwards, so a trained
/// classifier can be shared by reference between any number of threads.
pub struct KnnClassifier
{
    index: Box<dyn NeighborSearch>,
    labels: Vec<Label>,
    descriptor_len: usize,
    k: usize,
}

impl KnnClassifier
{
    /// Builds the index over the pooled training descriptors.
    ///
    /// Fails if the row and label counts differ or if there is nothing to index.
    pub fn train(training: TrainingSet, config: &KnnConfig) -> Result<Self>
    {
        if config.k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1".to_string()));
        }
        let descriptor_len = training.descriptor_len();
        let (descriptors, labels) = training.into_parts();
        if labels.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }

        let now = std::time::Instant::now();
        let index: Box<dyn NeighborSearch> = match config.backend {
            SearchBackend::Exact => Box::new(ExactSearch::new(descriptors)),
            SearchBackend::Hnsw => Box::new(HnswSearch::new(descriptors.view(), &config.hnsw)),
        };
        info!(
            "Trained {:?} k-NN index over {} descriptors (k = {}) in {:?}",
            config.backend, labels.len(), config.k, now.elapsed()
        );

        Ok(KnnClassifier {
            index,
            labels,
            descriptor_len,
            k: config.k,
        })
    }

    /// `train` over a descriptor table and its labels, which must have one label per row.
    pub fn fit(descriptors: Array2<f32>, labels: Vec<Label>, config: &KnnConfig) -> Result<Self>
    {
        Self::train(TrainingSet::new(descriptors, labels)?, config)
    }

    pub fn k(&self) -> usize
    {
        self.k
    }

    pub fn len(&self) -> usize
    {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.labels.is_empty()
    }

    pub fn descriptor_len(&self) -> usize
    {
        self.descriptor_len
    }

    /// Predicts one label per descriptor row, in row order.
    ///
    /// Each row gets the most common label among its k nearest training
    /// descriptors, ties going to the lowest label.
    pub fn predict(&self, descriptors: ArrayView2<f32>) -> Result<Vec<Label>>
    {
        if descriptors.nrows() > 0 && descriptors.ncols() != self.descriptor_len {
            return Err(Error::ShapeMismatch {
                what: "descriptor length",
                expected: self.descriptor_len,
                found: descriptors.ncols(),
            });
        }
        let predictions = (0..descriptors.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbour_labels: Vec<Label> = self.index
                    .search(descriptors.row(i), self.k)
                    .iter()
                    .map(|n| self.labels[n.index])
                    .collect();
                vote::lowest_mode(&neighbour_labels).ok_or(Error::EmptyTrainingSet)
            })
            .collect::<Result<Vec<Label>>>()?;
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests
{
    use ndarray::array;

    use super::*;

    const A: Label = Label(0);
    const B: Label = Label(1);

    /// Two clusters of two descriptors each, far apart.
    fn two_clusters() -> TrainingSet
    {
        TrainingSet::new(
            array![[0.0f32, 0.0], [1.0, 0.5], [100.0, 100.0], [101.0, 99.0]],
            vec![A, A, B, B],
        )
        .unwrap()
    }

    fn config(k: usize) -> KnnConfig
    {
        KnnConfig { k, ..KnnConfig::default() }
    }

    #[test]
    fn query_near_a_cluster_predicts_its_label()
    {
        let knn = KnnClassifier::train(two_clusters(), &config(1)).unwrap();
        assert_eq!(knn.predict(array![[2.0f32, 1.0]].view()).unwrap(), vec![A]);
        assert_eq!(knn.predict(array![[95.0f32, 97.0]].view()).unwrap(), vec![B]);
    }

    #[test]
    fn predicts_one_label_per_row_in_order()
    {
        let knn = KnnClassifier::train(two_clusters(), &config(3)).unwrap();
        let queries = array![[99.0f32, 99.0], [0.5, 0.5], [100.0, 101.0], [-3.0, 1.0], [0.0, 2.0]];
        let predictions = knn.predict(queries.view()).unwrap();
        assert_eq!(predictions, vec![B, A, B, A, A]);
    }

    #[test]
    fn neighbour_ties_go_to_the_lowest_label()
    {
        // k = 4 over both clusters: two votes each.
        let training = TrainingSet::new(
            array![[0.0f32], [1.0], [2.0], [3.0]],
            vec![B, A, B, A],
        )
        .unwrap();
        let knn = KnnClassifier::train(training, &config(4)).unwrap();
        assert_eq!(knn.predict(array![[10.0f32]].view()).unwrap(), vec![A]);
    }

    #[test]
    fn k_larger_than_the_index_uses_every_row()
    {
        let knn = KnnClassifier::train(two_clusters(), &config(5)).unwrap();
        // All four rows vote: 2 A, 2 B, so the lowest label wins.
        assert_eq!(knn.predict(array![[100.0f32, 100.0]].view()).unwrap(), vec![A]);
    }

    #[test]
    fn mismatched_labels_abort_training()
    {
        let result = KnnClassifier::fit(array![[0.0f32, 0.0], [1.0, 1.0]], vec![A, B, A], &config(1));
        assert!(matches!(result, Err(Error::ShapeMismatch { expected: 2, found: 3, .. })));
    }

    #[test]
    fn empty_training_set_is_rejected()
    {
        let result = KnnClassifier::train(TrainingSet::empty(2), &config(5));
        assert!(matches!(result, Err(Error::EmptyTrainingSet)));
    }

    #[test]
    fn wrong_descriptor_length_is_rejected()
    {
        let knn = KnnClassifier::train(two_clusters(), &config(1)).unwrap();
        let result = knn.predict(array![[1.0f32, 2.0, 3.0]].view());
        assert!(matches!(result, Err(Error::ShapeMismatch { expected: 2, found: 3, .. })));
    }

    #[test]
    fn empty_query_gives_no_predictions()
    {
        let knn = KnnClassifier::train(two_clusters(), &config(1)).unwrap();
        assert!(knn.predict(Array2::<f32>::zeros((0, 2)).view()).unwrap().is_empty());
    }

    #[test]
    fn hnsw_backend_agrees_on_separated_clusters()
    {
        let config = KnnConfig { k: 1, backend: SearchBackend::Hnsw, ..KnnConfig::default() };
        let knn = KnnClassifier::train(two_clusters(), &config).unwrap();
        let predictions = knn.predict(array![[2.0f32, 1.0], [95.0, 97.0]].view()).unwrap();
        assert_eq!(predictions, vec![A, B]);
    }
}
