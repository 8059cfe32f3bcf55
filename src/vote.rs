/// Reductions of a sequence of predicted labels to a single label.
/// The two differ only in how they break ties, and both are deterministic.

use rustc_hash::FxHashMap;

use crate::models::Label;

/// Most frequent label; ties go to the label seen first. `None` for an empty slice.
///
/// This is the image-level vote over per-descriptor predictions.
pub fn plurality(labels: &[Label]) -> Option<Label>
{
    // (count, position of first occurrence)
    let mut counts: FxHashMap<Label, (usize, usize)> = FxHashMap::default();
    for (i, label) in labels.iter().enumerate() {
        counts.entry(*label).or_insert((0, i)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(label, _)| label)
}

/// Most frequent label; ties go to the lowest label. `None` for an empty slice.
///
/// This is the vote among the k neighbours of one descriptor.
pub fn lowest_mode(labels: &[Label]) -> Option<Label>
{
    let mut counts: FxHashMap<Label, usize> = FxHashMap::default();
    for label in labels {
        *counts.entry(*label).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(label_a, count_a), (label_b, count_b)| {
            count_a.cmp(count_b).then(label_b.cmp(label_a))
        })
        .map(|(label, _)| label)
}
