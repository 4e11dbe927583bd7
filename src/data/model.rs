use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::pickle::Value;

// ---------------------------------------------------------------------------
// SplitKind – which partition of the pickled tuple
// ---------------------------------------------------------------------------

/// Position of a split inside the pickled `(training, validation, test)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Training,
    Validation,
    Test,
}

impl SplitKind {
    pub const ALL: [SplitKind; 3] = [SplitKind::Training, SplitKind::Validation, SplitKind::Test];

    pub fn name(self) -> &'static str {
        match self {
            SplitKind::Training => "training",
            SplitKind::Validation => "validation",
            SplitKind::Test => "test",
        }
    }
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SplitKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "training" | "train" => Ok(SplitKind::Training),
            "validation" | "valid" | "val" => Ok(SplitKind::Validation),
            "test" => Ok(SplitKind::Test),
            other => Err(format!(
                "unknown split '{other}' (expected training, validation or test)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetSplits – the unpacked 3-tuple
// ---------------------------------------------------------------------------

/// The three values bound from the pickled tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplits {
    pub training: Value,
    pub validation: Value,
    pub test: Value,
}

impl DatasetSplits {
    pub fn get(&self, kind: SplitKind) -> &Value {
        match kind {
            SplitKind::Training => &self.training,
            SplitKind::Validation => &self.validation,
            SplitKind::Test => &self.test,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SplitKind, &Value)> {
        SplitKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Interpret one split as `(images, labels)`.
    pub fn labeled(&self, kind: SplitKind) -> Result<LabeledSplit> {
        LabeledSplit::from_value(self.get(kind)).with_context(|| format!("{kind} split"))
    }
}

// ---------------------------------------------------------------------------
// LabeledSplit – (images, labels) view of one split
// ---------------------------------------------------------------------------

/// One image and its digit.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Row-major pixel intensities.
    pub pixels: Vec<f32>,
    pub label: i64,
}

/// A split holding an image array of shape `(n, p)` or `(n, h, w)` and a label
/// array of shape `(n,)`.
#[derive(Debug, Clone)]
pub struct LabeledSplit {
    pub samples: Vec<Sample>,
    /// Shape of one image (without the sample axis).
    pub image_shape: Vec<usize>,
    pub pixel_dtype: &'static str,
    pub label_dtype: &'static str,
}

impl LabeledSplit {
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = value.as_sequence().with_context(|| {
            format!("expected an (images, labels) pair, got {}", value.type_name())
        })?;
        let [images, labels] = items else {
            bail!("expected an (images, labels) pair, got {} elements", items.len());
        };
        let images = images
            .as_array()
            .with_context(|| format!("images must be an ndarray, got {}", images.type_name()))?;
        let labels = labels
            .as_array()
            .with_context(|| format!("labels must be an ndarray, got {}", labels.type_name()))?;

        let Some((&n, image_shape)) = images.shape().split_first() else {
            bail!("images must have a sample axis, got a 0-d array");
        };
        if labels.shape() != [n] {
            bail!(
                "labels have shape {:?}, expected ({n},) to match images {:?}",
                labels.shape(),
                images.shape()
            );
        }
        let label_values = labels
            .to_i64_vec()
            .with_context(|| format!("labels must be integers, got {}", labels.dtype().name()))?;

        let per_sample: usize = image_shape.iter().product();
        let pixels = images.to_f32_vec();
        let samples = if per_sample == 0 {
            label_values
                .into_iter()
                .map(|label| Sample { pixels: Vec::new(), label })
                .collect()
        } else {
            pixels
                .chunks_exact(per_sample)
                .zip(label_values)
                .map(|(chunk, label)| Sample {
                    pixels: chunk.to_vec(),
                    label,
                })
                .collect()
        };

        Ok(LabeledSplit {
            samples,
            image_shape: image_shape.to_vec(),
            pixel_dtype: images.dtype().name(),
            label_dtype: labels.dtype().name(),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn pixels_per_sample(&self) -> usize {
        self.image_shape.iter().product()
    }

    /// Side length when every image is a square (784 → 28).
    pub fn image_side(&self) -> Option<usize> {
        match self.image_shape.as_slice() {
            [h, w] if h == w => Some(*h),
            [p] => {
                let side = (*p as f64).sqrt().round() as usize;
                (side * side == *p).then_some(side)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SplitSummary – what `info` reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub split: SplitKind,
    /// Python type of the split value.
    pub python_type: &'static str,
    pub samples: Option<usize>,
    pub image_shape: Option<Vec<usize>>,
    pub pixel_dtype: Option<&'static str>,
    pub label_dtype: Option<&'static str>,
    pub label_counts: BTreeMap<i64, usize>,
}

impl SplitSummary {
    /// Summarise a split; non-MNIST layouts only report their Python type.
    pub fn of(kind: SplitKind, value: &Value) -> Self {
        match LabeledSplit::from_value(value) {
            Ok(split) => SplitSummary {
                split: kind,
                python_type: value.type_name(),
                samples: Some(split.len()),
                image_shape: Some(split.image_shape.clone()),
                pixel_dtype: Some(split.pixel_dtype),
                label_dtype: Some(split.label_dtype),
                label_counts: super::filter::label_counts(&split),
            },
            Err(_) => SplitSummary {
                split: kind,
                python_type: value.type_name(),
                samples: None,
                image_shape: None,
                pixel_dtype: None,
                label_dtype: None,
                label_counts: BTreeMap::new(),
            },
        }
    }
}

impl fmt::Display for SplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10}", self.split.name())?;
        match (self.samples, &self.image_shape) {
            (Some(n), Some(shape)) => {
                write!(
                    f,
                    " {n} samples, image shape {shape:?} ({}), labels {}",
                    self.pixel_dtype.unwrap_or("?"),
                    self.label_dtype.unwrap_or("?")
                )?;
                let counts: Vec<String> = self
                    .label_counts
                    .iter()
                    .map(|(label, count)| format!("{label}:{count}"))
                    .collect();
                if !counts.is_empty() {
                    write!(f, "\n           {}", counts.join(" "))?;
                }
                Ok(())
            }
            _ => write!(f, " {}", self.python_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::NdArray;

    fn pair(images: NdArray, labels: NdArray) -> Value {
        Value::Tuple(vec![Value::NdArray(images), Value::NdArray(labels)])
    }

    #[test]
    fn split_kind_parses_short_names() {
        assert_eq!("train".parse::<SplitKind>().unwrap(), SplitKind::Training);
        assert_eq!("VALID".parse::<SplitKind>().unwrap(), SplitKind::Validation);
        assert!("dev".parse::<SplitKind>().is_err());
    }

    #[test]
    fn labeled_split_from_flat_images() {
        let pixels = [0.0, 0.1, 0.2, 0.3, 1.0, 0.9, 0.8, 0.7];
        let images = NdArray::from_f32(vec![2, 4], &pixels).unwrap();
        let labels = NdArray::from_i64(vec![2], &[3, 8]).unwrap();
        let split = LabeledSplit::from_value(&pair(images, labels)).unwrap();

        assert_eq!(split.len(), 2);
        assert_eq!(split.image_side(), Some(2));
        assert_eq!(split.samples[1].label, 8);
        assert_eq!(split.samples[1].pixels, vec![1.0, 0.9, 0.8, 0.7]);
        assert_eq!(split.pixel_dtype, "float32");
    }

    #[test]
    fn labeled_split_from_square_images() {
        let images = NdArray::from_u8(vec![1, 2, 2], &[0, 64, 128, 255]).unwrap();
        let labels = NdArray::from_u8(vec![1], &[1]).unwrap();
        let split = LabeledSplit::from_value(&pair(images, labels)).unwrap();
        assert_eq!(split.image_side(), Some(2));
        assert_eq!(split.samples[0].pixels, vec![0.0, 64.0, 128.0, 255.0]);
    }

    #[test]
    fn labeled_split_rejects_mismatched_labels() {
        let images = NdArray::from_f32(vec![2, 1], &[0.0, 1.0]).unwrap();
        let labels = NdArray::from_i64(vec![3], &[1, 2, 3]).unwrap();
        assert!(LabeledSplit::from_value(&pair(images, labels)).is_err());
    }

    #[test]
    fn labeled_split_rejects_float_labels() {
        let images = NdArray::from_f32(vec![1, 1], &[0.0]).unwrap();
        let labels = NdArray::from_f32(vec![1], &[1.0]).unwrap();
        let err = LabeledSplit::from_value(&pair(images, labels)).unwrap_err();
        assert!(err.to_string().contains("labels must be integers"));
    }

    #[test]
    fn summary_of_opaque_split_reports_type() {
        let summary = SplitSummary::of(SplitKind::Test, &Value::String("x".into()));
        assert_eq!(summary.samples, None);
        assert_eq!(summary.to_string(), "test       str");
    }
}
