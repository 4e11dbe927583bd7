use std::collections::{BTreeMap, BTreeSet};

use super::model::LabeledSplit;

// ---------------------------------------------------------------------------
// Label filter: which digits are selected
// ---------------------------------------------------------------------------

/// Set of selected labels. An empty selection means "no filter" (keep all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    selected: BTreeSet<i64>,
}

impl LabelFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(labels: impl IntoIterator<Item = i64>) -> Self {
        Self {
            selected: labels.into_iter().collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn matches(&self, label: i64) -> bool {
        self.is_all() || self.selected.contains(&label)
    }
}

/// Return indices of samples whose label passes the filter.
pub fn filtered_indices(split: &LabeledSplit, filter: &LabelFilter) -> Vec<usize> {
    split
        .samples
        .iter()
        .enumerate()
        .filter(|(_, sample)| filter.matches(sample.label))
        .map(|(i, _)| i)
        .collect()
}

/// Number of samples per label, in label order.
pub fn label_counts(split: &LabeledSplit) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for sample in &split.samples {
        *counts.entry(sample.label).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Sample;

    fn split(labels: &[i64]) -> LabeledSplit {
        LabeledSplit {
            samples: labels
                .iter()
                .map(|&label| Sample {
                    pixels: vec![0.0],
                    label,
                })
                .collect(),
            image_shape: vec![1],
            pixel_dtype: "float32",
            label_dtype: "int64",
        }
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let s = split(&[1, 2, 3]);
        assert_eq!(filtered_indices(&s, &LabelFilter::all()), vec![0, 1, 2]);
    }

    #[test]
    fn selected_labels_only() {
        let s = split(&[8, 1, 8, 3]);
        assert_eq!(filtered_indices(&s, &LabelFilter::only([8])), vec![0, 2]);
        assert!(filtered_indices(&s, &LabelFilter::only([9])).is_empty());
    }

    #[test]
    fn counts_by_label() {
        let s = split(&[5, 0, 5, 5]);
        let counts = label_counts(&s);
        assert_eq!(counts.get(&5), Some(&3));
        assert_eq!(counts.get(&0), Some(&1));
        assert_eq!(counts.len(), 2);
    }
}
