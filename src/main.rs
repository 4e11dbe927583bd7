//! mnist-pkl - inspect and convert the legacy pickled MNIST dataset

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use mnist_pkl::data::export::{export, ExportFormat};
use mnist_pkl::data::filter::LabelFilter;
use mnist_pkl::data::loader::{self, DEFAULT_PATH};
use mnist_pkl::data::model::{SplitKind, SplitSummary};
use mnist_pkl::pickle::{DecodeOptions, Encoding};
use mnist_pkl::render;

#[derive(Parser)]
#[command(name = "mnist-pkl")]
#[command(version)]
#[command(about = "Load the pickled MNIST tuple and print, export or render it", long_about = None)]
struct Cli {
    /// Pickled dataset: a (training, validation, test) tuple
    #[arg(short, long, global = true, env = "MNIST_PKL", default_value = DEFAULT_PATH)]
    file: PathBuf,

    /// How Python 2 `str` objects are decoded (latin1, ascii, utf-8, bytes)
    #[arg(short, long, global = true, env = "MNIST_PKL_ENCODING", default_value = "latin1")]
    encoding: Encoding,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one split as text (the default)
    Show {
        #[arg(short, long, default_value = "training")]
        split: SplitKind,
    },

    /// Summarise every split: type, sample count, shapes, label histogram
    Info {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Convert splits to a format that does not depend on Python 2 pickles
    Export {
        /// Output format (inferred from --out when omitted)
        #[arg(long)]
        format: Option<ExportFormat>,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// Splits to export (repeatable, default: all)
        #[arg(short, long)]
        split: Vec<SplitKind>,

        /// Keep only these digits, e.g. `--labels 3,8`
        #[arg(long, value_delimiter = ',')]
        labels: Vec<i64>,
    },

    /// Save one sample as a grayscale PNG
    Render {
        #[arg(short, long, default_value = "training")]
        split: SplitKind,

        /// Sample index within the split
        #[arg(short, long, default_value = "0")]
        index: usize,

        #[arg(short, long, default_value = "a0.png")]
        out: PathBuf,
    },

    /// Save the mean image of one digit as a heat map
    Average {
        #[arg(short, long, default_value = "training")]
        split: SplitKind,

        #[arg(short, long, default_value = "8")]
        digit: i64,

        /// Pixels per cell in the output image
        #[arg(long, default_value = "10")]
        scale: u32,

        #[arg(short, long, default_value = "88.png")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(Cli::parse(), &mut out)?;
    out.flush().context("flushing stdout")
}

/// Execute one parsed command line, writing text output to `out`.
fn run<W: Write>(cli: Cli, out: &mut W) -> Result<()> {
    let options = DecodeOptions::with_encoding(cli.encoding);
    let command = cli.command.unwrap_or(Commands::Show {
        split: SplitKind::Training,
    });

    match command {
        Commands::Show { split } => {
            loader::write_split(&cli.file, &options, split, out)?;
        }

        Commands::Info { json } => {
            let splits = loader::load_splits(&cli.file, &options)?;
            let summaries: Vec<SplitSummary> = splits
                .iter()
                .map(|(kind, value)| SplitSummary::of(kind, value))
                .collect();
            if json {
                let text = serde_json::to_string_pretty(&summaries).context("serializing summary")?;
                writeln!(out, "{text}")?;
            } else {
                writeln!(out, "{} (encoding {})", cli.file.display(), options.encoding)?;
                for summary in &summaries {
                    writeln!(out, "{summary}")?;
                }
            }
        }

        Commands::Export {
            format,
            out: path,
            split,
            labels,
        } => {
            let Some(format) = format.or_else(|| ExportFormat::from_path(&path)) else {
                bail!(
                    "cannot infer the export format from {}; pass --format",
                    path.display()
                );
            };
            let kinds = if split.is_empty() {
                SplitKind::ALL.to_vec()
            } else {
                split
            };
            let filter = LabelFilter::only(labels);
            let splits = loader::load_splits(&cli.file, &options)?;
            let rows = export(&splits, &kinds, &filter, format, &path)?;
            writeln!(out, "wrote {rows} rows to {}", path.display())?;
        }

        Commands::Render {
            split,
            index,
            out: path,
        } => {
            let splits = loader::load_splits(&cli.file, &options)?;
            let labeled = splits.labeled(split)?;
            let Some(sample) = labeled.samples.get(index) else {
                bail!(
                    "index {index} out of range: {split} split has {} samples",
                    labeled.len()
                );
            };
            let Some(side) = labeled.image_side() else {
                bail!("{split} images are not square: {:?}", labeled.image_shape);
            };
            info!("{split}[{index}] is digit {}", sample.label);
            render::save_png(&render::digit_image(sample, side)?, &path)?;
        }

        Commands::Average {
            split,
            digit,
            scale,
            out: path,
        } => {
            let splits = loader::load_splits(&cli.file, &options)?;
            let labeled = splits.labeled(split)?;
            let Some(side) = labeled.image_side() else {
                bail!("{split} images are not square: {:?}", labeled.image_shape);
            };
            let mean = render::average_digit(&labeled, digit)?;
            render::save_png(&render::heat_map(&mean, side, scale)?, &path)?;
        }
    }

    Ok(())
}
