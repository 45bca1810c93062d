use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gifcities::jsonl::{create_output, open_lines, write_jsonl};
use gifcities::logging::init_tracing;
use gifcities::{aggregate_manifest, ImageRecord};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-manifest",
    about = "Collate the GIF manifest into one JSON document per checksum"
)]
struct ManifestCli {
    /// Space-delimited manifest: use, checksum, width, height, page
    #[arg(
        long,
        env = "GIFCITIES_MANIFEST",
        default_value = "data/gifcities-gifs.txt"
    )]
    manifest: PathBuf,

    /// Output JSONL, one document per checksum
    #[arg(long, env = "GIFCITIES_JSONL", default_value = "data/gifcities.jsonl")]
    output: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = ManifestCli::parse();

    let reader = open_lines(&cli.manifest)?;
    let records = aggregate_manifest(reader)
        .with_context(|| format!("failed to aggregate {:?}", cli.manifest))?;

    let mut writer = create_output(&cli.output)?;
    let written = write_jsonl(&mut writer, &records)?;
    writer.flush()?;

    let uses: usize = records.iter().map(ImageRecord::use_count).sum();
    info!(
        records = written,
        uses,
        output = %cli.output.display(),
        "wrote aggregated manifest"
    );
    Ok(())
}
