use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use thiserror::Error;

use super::model::{DatasetSplits, SplitKind};
use crate::pickle::{DecodeOptions, Unpickler, Value};

/// Where the dataset is looked up when no path is given.
pub const DEFAULT_PATH: &str = "mnist.pkl";

/// Number of values the pickled tuple must unpack into.
pub const SPLIT_COUNT: usize = 3;

/// The decoded object does not unpack into `(training, validation, test)`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LoadError {
    #[error("too many values to unpack (expected 3, got {found})")]
    TooMany { found: usize },

    #[error("not enough values to unpack (expected 3, got {found})")]
    NotEnough { found: usize },

    #[error("cannot unpack non-sequence {0}")]
    NotASequence(&'static str),
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Decode the whole pickle at `path`.
pub fn load_value(path: &Path, options: &DecodeOptions) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    info!(
        "loading {} ({size} bytes, encoding {})",
        path.display(),
        options.encoding
    );

    let mut unpickler = Unpickler::new(BufReader::new(file), *options);
    let value = unpickler
        .load()
        .with_context(|| format!("decoding {}", path.display()))?;
    info!(
        "decoded {} with protocol {} from {} bytes",
        value.type_name(),
        unpickler.protocol(),
        unpickler.bytes_read()
    );
    Ok(value)
}

/// Decode `path` and bind its three splits.
pub fn load_splits(path: &Path, options: &DecodeOptions) -> Result<DatasetSplits> {
    let value = load_value(path, options)?;
    let splits = unpack_splits(value).with_context(|| format!("unpacking {}", path.display()))?;
    Ok(splits)
}

/// Destructure a tuple, list or array (along its first axis) of exactly
/// three values.
pub fn unpack_splits(value: Value) -> std::result::Result<DatasetSplits, LoadError> {
    let items = match value {
        Value::Tuple(items) | Value::List(items) => {
            check_arity(items.len())?;
            items
        }
        Value::NdArray(arr) => {
            let Some(&found) = arr.shape().first() else {
                return Err(LoadError::NotASequence("0-d numpy.ndarray"));
            };
            check_arity(found)?;
            arr.outer_items().unwrap_or_default()
        }
        other => return Err(LoadError::NotASequence(other.type_name())),
    };
    let [training, validation, test] = <[Value; SPLIT_COUNT]>::try_from(items)
        .map_err(|items| LoadError::NotEnough { found: items.len() })?;
    Ok(DatasetSplits {
        training,
        validation,
        test,
    })
}

fn check_arity(found: usize) -> std::result::Result<(), LoadError> {
    match found.cmp(&SPLIT_COUNT) {
        Ordering::Greater => Err(LoadError::TooMany { found }),
        Ordering::Less => Err(LoadError::NotEnough { found }),
        Ordering::Equal => Ok(()),
    }
}

/// Load `path` and write the rendering of one split, followed by a newline.
pub fn write_split<W: Write>(
    path: &Path,
    options: &DecodeOptions,
    split: SplitKind,
    out: &mut W,
) -> Result<()> {
    let splits = load_splits(path, options)?;
    writeln!(out, "{}", splits.get(split)).context("writing split")?;
    Ok(())
}
