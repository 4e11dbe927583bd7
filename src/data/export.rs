use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float32Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use super::filter::{filtered_indices, LabelFilter};
use super::model::{DatasetSplits, LabeledSplit, SplitKind};

// ---------------------------------------------------------------------------
// Export format
// ---------------------------------------------------------------------------

/// Version-neutral formats the pickled splits can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `split`, `index`, `label` columns plus a `pixels` List<Float32> column.
    Parquet,
    /// Header `split,index,label,pixels`; pixels are semicolon-separated.
    Csv,
    /// `[{ "split": ..., "index": ..., "label": ..., "pixels": [...] }, ...]`
    Json,
}

impl ExportFormat {
    /// Guess from the output file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        ext.parse().ok()
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" | "pq" => Ok(ExportFormat::Parquet),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unsupported export format '{other}'")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Parquet => "parquet",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        })
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write the selected splits to `path`. Returns the number of rows written.
pub fn export(
    splits: &DatasetSplits,
    kinds: &[SplitKind],
    filter: &LabelFilter,
    format: ExportFormat,
    path: &Path,
) -> Result<usize> {
    let mut selected = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let split = splits.labeled(kind)?;
        let indices = filtered_indices(&split, filter);
        selected.push((kind, split, indices));
    }

    let rows = match format {
        ExportFormat::Parquet => write_parquet(&selected, path)?,
        ExportFormat::Csv => write_csv(&selected, path)?,
        ExportFormat::Json => write_json(&selected, path)?,
    };
    info!("exported {rows} rows as {format} to {}", path.display());
    Ok(rows)
}

type Selection = (SplitKind, LabeledSplit, Vec<usize>);

// ---------------------------------------------------------------------------
// Parquet writer
// ---------------------------------------------------------------------------

fn export_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("split", DataType::Utf8, false),
        Field::new("index", DataType::Int64, false),
        Field::new("label", DataType::Int64, false),
        Field::new(
            "pixels",
            DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
            false,
        ),
    ]))
}

/// One record batch per split.
fn write_parquet(selected: &[Selection], path: &Path) -> Result<usize> {
    let schema = export_schema();
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer =
        ArrowWriter::try_new(file, schema.clone(), None).context("creating parquet writer")?;

    let mut rows = 0;
    for (kind, split, indices) in selected {
        if indices.is_empty() {
            continue;
        }
        let mut pixel_builder = ListBuilder::new(Float32Builder::new());
        for &i in indices {
            let values = pixel_builder.values();
            for &v in &split.samples[i].pixels {
                values.append_value(v);
            }
            pixel_builder.append(true);
        }
        let pixel_array = pixel_builder.finish();

        let split_array = StringArray::from(vec![kind.name(); indices.len()]);
        let index_array = Int64Array::from(indices.iter().map(|&i| i as i64).collect::<Vec<_>>());
        let label_array = Int64Array::from(
            indices
                .iter()
                .map(|&i| split.samples[i].label)
                .collect::<Vec<_>>(),
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(split_array),
                Arc::new(index_array),
                Arc::new(label_array),
                Arc::new(pixel_array),
            ],
        )
        .with_context(|| format!("building record batch for {kind}"))?;
        writer.write(&batch).context("writing parquet batch")?;
        rows += indices.len();
    }
    writer.close().context("closing parquet writer")?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// CSV writer
// ---------------------------------------------------------------------------

fn write_csv(selected: &[Selection], path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer
        .write_record(["split", "index", "label", "pixels"])
        .context("writing CSV header")?;

    let mut rows = 0;
    for (kind, split, indices) in selected {
        for &i in indices {
            let sample = &split.samples[i];
            let pixels = sample
                .pixels
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(";");
            writer
                .write_record([
                    kind.name().to_string(),
                    i.to_string(),
                    sample.label.to_string(),
                    pixels,
                ])
                .with_context(|| format!("CSV row {rows}"))?;
            rows += 1;
        }
    }
    writer.flush().context("flushing CSV")?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// JSON writer
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct JsonRecord<'a> {
    split: SplitKind,
    index: usize,
    label: i64,
    pixels: &'a [f32],
}

fn write_json(selected: &[Selection], path: &Path) -> Result<usize> {
    let records: Vec<JsonRecord<'_>> = selected
        .iter()
        .flat_map(|(kind, split, indices)| {
            indices.iter().map(move |&i| JsonRecord {
                split: *kind,
                index: i,
                label: split.samples[i].label,
                pixels: &split.samples[i].pixels,
            })
        })
        .collect();

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer(&mut out, &records).context("serializing JSON")?;
    out.flush().context("flushing JSON")?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::{NdArray, Value};
    use arrow::array::{Array, AsArray, Float32Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn splits() -> DatasetSplits {
        let split = |labels: &[i64]| {
            let n = labels.len();
            let pixels: Vec<f32> = (0..n * 4).map(|i| i as f32 / 10.0).collect();
            Value::Tuple(vec![
                Value::NdArray(NdArray::from_f32(vec![n, 4], &pixels).unwrap()),
                Value::NdArray(NdArray::from_i64(vec![n], labels).unwrap()),
            ])
        };
        DatasetSplits {
            training: split(&[3, 8, 3]),
            validation: split(&[1]),
            test: split(&[8]),
        }
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/mnist.PARQUET")),
            Some(ExportFormat::Parquet)
        );
        assert_eq!(ExportFormat::from_path(Path::new("a.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("a.gob")), None);
    }

    #[test]
    fn parquet_rows_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnist.parquet");
        let rows = export(
            &splits(),
            &SplitKind::ALL,
            &LabelFilter::all(),
            ExportFormat::Parquet,
            &path,
        )
        .unwrap();
        assert_eq!(rows, 5);

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 5);

        let first = &batches[0];
        let splits = first.column(0).as_string::<i32>();
        assert_eq!(splits.value(0), "training");
        let pixels = first.column(3).as_list::<i32>().value(1);
        let pixels = pixels.as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(pixels.len(), 4);
        assert!((pixels.value(0) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn csv_respects_label_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eights.csv");
        let rows = export(
            &splits(),
            &SplitKind::ALL,
            &LabelFilter::only([8]),
            ExportFormat::Csv,
            &path,
        )
        .unwrap();
        assert_eq!(rows, 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&records[0][0], "training");
        assert_eq!(&records[0][1], "1");
        assert_eq!(&records[0][2], "8");
        assert_eq!(records[0][3].split(';').count(), 4);
        assert_eq!(&records[1][0], "test");
    }

    #[test]
    fn json_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("val.json");
        export(
            &splits(),
            &[SplitKind::Validation],
            &LabelFilter::all(),
            ExportFormat::Json,
            &path,
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["split"], "validation");
        assert_eq!(parsed[0]["label"], 1);
        assert_eq!(parsed[0]["pixels"].as_array().map(|a| a.len()), Some(4));
    }

    #[test]
    fn non_mnist_split_is_an_error() {
        let mut s = splits();
        s.test = Value::Int(0);
        let dir = tempfile::tempdir().unwrap();
        let err = export(
            &s,
            &[SplitKind::Test],
            &LabelFilter::all(),
            ExportFormat::Csv,
            &dir.path().join("x.csv"),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("test split"));
    }
}
