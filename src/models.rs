use std::fmt;
use std::path::PathBuf;

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A scene class, identified by its index into the sorted list of class names.
/// The ordering matters: neighbour votes that tie resolve to the lowest label.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label(pub u32);

impl Label
{
    pub fn index(&self) -> usize
    {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps labels to the class directory names they were assigned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNames(Vec<String>);

impl ClassNames
{
    /// Class names are sorted and deduplicated so that label assignment does not
    /// depend on directory listing order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        ClassNames(names)
    }

    pub fn label_of(&self, name: &str) -> Result<Label>
    {
        self.0
            .binary_search_by(|n| n.as_str().cmp(name))
            .map(|i| Label(i as u32))
            .map_err(|_| Error::UnknownClass(name.to_string()))
    }

    /// Returns the class name for a label, or the label number if it is out of range.
    pub fn name_of(&self, label: Label) -> String
    {
        match self.0.get(label.index()) {
            Some(name) => name.clone(),
            None => label.to_string(),
        }
    }

    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str>
    {
        self.0.iter().map(|s| s.as_str())
    }
}

/// An image on disk together with its ground-truth class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelledImage
{
    pub path: PathBuf,
    pub label: Label,
}

/// Descriptors pooled across training images, one label per descriptor row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet
{
    descriptors: Array2<f32>,
    labels: Vec<Label>,
}

impl TrainingSet
{
    /// Fails if the number of descriptor rows and labels differ.
    pub fn new(descriptors: Array2<f32>, labels: Vec<Label>) -> Result<Self>
    {
        if descriptors.nrows() != labels.len() {
            return Err(Error::ShapeMismatch {
                what: "labels per descriptor row",
                expected: descriptors.nrows(),
                found: labels.len(),
            });
        }
        Ok(TrainingSet { descriptors, labels })
    }

    pub fn empty(descriptor_len: usize) -> Self
    {
        TrainingSet {
            descriptors: Array2::zeros((0, descriptor_len)),
            labels: Vec::new(),
        }
    }

    /// Stacks per-image descriptor sets, labelling every row with its image's label.
    pub fn pool(descriptor_len: usize, sets: Vec<(Array2<f32>, Label)>) -> Result<Self>
    {
        let rows: usize = sets.iter().map(|(d, _)| d.nrows()).sum();
        let mut descriptors = Array2::<f32>::zeros((rows, descriptor_len));
        let mut labels = Vec::with_capacity(rows);
        let mut offset = 0;
        for (set, label) in sets {
            if set.ncols() != descriptor_len && set.nrows() > 0 {
                return Err(Error::ShapeMismatch {
                    what: "descriptor length",
                    expected: descriptor_len,
                    found: set.ncols(),
                });
            }
            let n = set.nrows();
            descriptors
                .slice_mut(ndarray::s![offset..offset + n, ..])
                .assign(&set);
            labels.extend(std::iter::repeat(label).take(n));
            offset += n;
        }
        TrainingSet::new(descriptors, labels)
    }

    pub fn descriptors(&self) -> ArrayView2<'_, f32>
    {
        self.descriptors.view()
    }

    pub fn labels(&self) -> &[Label]
    {
        &self.labels
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
        self.descriptors.len_of(Axis(1))
    }

    pub fn into_parts(self) -> (Array2<f32>, Vec<Label>)
    {
        (self.descriptors, self.labels)
    }
}

#[cfg(test)]
mod tests
{
    use ndarray::array;

    use super::*;

    #[test]
    fn class_names_are_sorted()
    {
        let names = ClassNames::new(["street", "coast", "forest", "coast"]);
        assert_eq!(names.len(), 3);
        assert_eq!(names.label_of("coast").unwrap(), Label(0));
        assert_eq!(names.label_of("forest").unwrap(), Label(1));
        assert_eq!(names.label_of("street").unwrap(), Label(2));
        assert_eq!(names.name_of(Label(1)), "forest");
        assert!(matches!(names.label_of("highway"), Err(Error::UnknownClass(_))));
    }

    #[test]
    fn mismatched_rows_are_rejected()
    {
        let descriptors = array![[0.0f32, 1.0], [2.0, 3.0]];
        let result = TrainingSet::new(descriptors, vec![Label(0)]);
        assert!(matches!(
            result,
            Err(Error::ShapeMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn pool_labels_every_row()
    {
        let a = array![[0.0f32, 0.0], [1.0, 1.0]];
        let b = Array2::<f32>::zeros((0, 2));
        let c = array![[5.0f32, 5.0]];
        let set = TrainingSet::pool(2, vec![(a, Label(0)), (b, Label(1)), (c, Label(2))]).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.labels(), &[Label(0), Label(0), Label(2)]);
        assert_eq!(set.descriptors().row(2).to_vec(), vec![5.0, 5.0]);
    }
}
