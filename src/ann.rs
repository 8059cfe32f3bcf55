/// Nearest neighbour search over the rows of the training descriptor table.
///
/// Two backends implement `NeighborSearch`: an exact brute-force scan, which is
/// the default and is fully deterministic, and an approximate HNSW graph built
/// with the hnsw_rs crate for large tables.
/// Both return training row indices ordered by increasing Euclidean distance.

use hnsw_rs::{hnsw::Hnsw, prelude::DistL2};
use log::info;
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::config::HnswConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor
{
    /// Row of the training table.
    pub index: usize,
    pub distance: f32,
}

pub trait NeighborSearch: Send + Sync
{
    /// Number of indexed rows.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Up to `k` nearest rows, closest first.
    fn search(&self, query: ArrayView1<f32>, k: usize) -> Vec<Neighbor>;
}

/// Brute-force Euclidean search. Rows at equal distance are ordered by row index.
pub struct ExactSearch
{
    data: Array2<f32>,
}

impl ExactSearch
{
    pub fn new(data: Array2<f32>) -> Self
    {
        ExactSearch { data }
    }
}

impl NeighborSearch for ExactSearch
{
    fn len(&self) -> usize
    {
        self.data.nrows()
    }

    fn search(&self, query: ArrayView1<f32>, k: usize) -> Vec<Neighbor>
    {
        let k = k.min(self.len());
        if k == 0 {
            return Vec::new();
        }
        // Keep a sorted list of the best k; squared distances preserve the order.
        let mut best: Vec<(f32, usize)> = Vec::with_capacity(k + 1);
        for (index, row) in self.data.outer_iter().enumerate() {
            let d = squared_distance(row, query);
            if best.len() == k && d >= best[k - 1].0 {
                continue;
            }
            // Insert after any equal distances, so earlier rows stay first.
            let pos = best.partition_point(|(bd, _)| *bd <= d);
            best.insert(pos, (d, index));
            best.truncate(k);
        }
        best.into_iter()
            .map(|(d, index)| Neighbor { index, distance: d.sqrt() })
            .collect()
    }
}

#[inline]
fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32
{
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Approximate search with a hierarchical navigable small world graph.
/// Results are close to, but not guaranteed to equal, the exact neighbours.
pub struct HnswSearch
{
    hnsw: Hnsw<'static, f32, DistL2>,
    len: usize,
    ef_search: usize,
}

impl HnswSearch
{
    pub fn new(data: ArrayView2<f32>, config: &HnswConfig) -> Self
    {
        let len = data.nrows();
        let hnsw = Hnsw::<f32, DistL2>::new(
            config.max_nb_connection,
            len.max(1),
            config.nb_layer,
            config.ef_construction,
            DistL2{}
            );

        let now = std::time::Instant::now();
        // hnsw_rs copies each slice, so the rows only need to live for the insert.
        let rows: Vec<Vec<f32>> = data.outer_iter().map(|row| row.to_vec()).collect();
        let data_for_par_insertion: Vec<(&Vec<f32>, usize)> = rows.iter().zip(0..len).collect();
        hnsw.parallel_insert(&data_for_par_insertion);
        info!("HNSW build over {} descriptors took {:?}", len, now.elapsed());

        HnswSearch
        {
            hnsw,
            len,
            ef_search: config.ef_search,
        }
    }
}

impl NeighborSearch for HnswSearch
{
    fn len(&self) -> usize
    {
        self.len
    }

    /// `ef_search` must be at least the number of neighbours asked for, so it is
    /// raised to `k` when smaller.
    fn search(&self, query: ArrayView1<f32>, k: usize) -> Vec<Neighbor>
    {
        let k = k.min(self.len);
        if k == 0 {
            return Vec::new();
        }
        let query = query.to_vec();
        let ef_arg = self.ef_search.max(k);
        let mut neighbours: Vec<Neighbor> = self.hnsw
            .search(&query, k, ef_arg)
            .iter()
            .map(|n| Neighbor { index: n.d_id, distance: n.distance })
            .collect();
        neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
        neighbours
    }
}

#[cfg(test)]
mod tests
{
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    use super::*;

    fn grid() -> Array2<f32>
    {
        array![
            [0.0, 0.0],
            [10.0, 0.0],
            [0.0, 10.0],
            [10.0, 10.0],
            [1.0, 1.0],
        ]
    }

    #[test]
    fn exact_search_orders_by_distance()
    {
        let search = ExactSearch::new(grid());
        let found = search.search(array![9.0f32, 9.5].view(), 3);
        let indices: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![3, 2, 1]);
        assert_relative_eq!(found[0].distance, (1.0f32 + 0.25).sqrt());
    }

    #[test]
    fn exact_search_breaks_distance_ties_by_row()
    {
        let search = ExactSearch::new(grid());
        // (5, 5) is equidistant from the four corners.
        let found = search.search(array![5.0f32, 5.0].view(), 5);
        let indices: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![4, 0, 1, 2, 3]);
    }

    #[test]
    fn k_is_clamped_to_the_table_size()
    {
        let search = ExactSearch::new(grid());
        assert_eq!(search.search(Array1::<f32>::zeros(2).view(), 50).len(), 5);
        assert!(ExactSearch::new(Array2::zeros((0, 2))).search(Array1::<f32>::zeros(2).view(), 3).is_empty());
    }

    #[test]
    fn hnsw_finds_the_obvious_neighbour()
    {
        let search = HnswSearch::new(grid().view(), &HnswConfig::default());
        assert_eq!(search.len(), 5);
        let found = search.search(array![9.5f32, 10.5].view(), 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 3);
    }
}
