use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use mnist_pkl::data::synthetic::{synthetic_dataset, PIXELS};
use mnist_pkl::pickle;

/// Training / validation / test sizes, a tenth of the real 50k/10k/10k.
const SIZES: [usize; 3] = [5000, 1000, 1000];

fn main() -> Result<()> {
    env_logger::init();

    let output_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_mnist.pkl"));

    let dataset = synthetic_dataset(SIZES, 42)?;

    let file = File::create(&output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;
    let mut out = BufWriter::new(file);
    pickle::to_writer(&mut out, &dataset).context("pickling dataset")?;
    out.flush().context("flushing output")?;

    println!(
        "Wrote {}/{}/{} digits ({PIXELS} pixels each) to {}",
        SIZES[0],
        SIZES[1],
        SIZES[2],
        output_path.display()
    );
    Ok(())
}
