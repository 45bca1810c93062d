use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gifcities::bulkjob::missing_line;
use gifcities::jsonl::{create_output, for_each_jsonl, open_lines, shard_name};
use gifcities::logging::init_tracing;
use gifcities::ImageRecord;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-missing",
    about = "Emit bulk-job lines for GIFs that were fetched outside the bulk job"
)]
struct MissingCli {
    /// JSONL documents for the GIFs fetched by hand
    #[arg(
        long,
        env = "GIFCITIES_MISSING_JSONL",
        default_value = "data/gifcities.jsonl"
    )]
    input: PathBuf,

    /// Directory holding the fetched GIFs, named by checksum
    #[arg(long, env = "GIFCITIES_MISSING_DIR", default_value = "data/missing")]
    gifs: PathBuf,

    /// Output JSONL in bulk-job format
    #[arg(
        long,
        env = "GIFCITIES_LIVEWAYBACK",
        default_value = "data/livewayback.jsonl"
    )]
    output: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = MissingCli::parse();

    let mut writer = create_output(&cli.output)?;
    let written = for_each_jsonl(
        open_lines(&cli.input)?,
        &shard_name(&cli.input),
        |record: ImageRecord| {
            let path = cli.gifs.join(record.checksum());
            let gif = fs::read(&path)
                .with_context(|| format!("could not read gif '{}'", record.checksum()))?;
            let line = missing_line(&record, &gif)?;
            serde_json::to_writer(&mut writer, &line)?;
            writer.write_all(b"\n")?;
            Ok(())
        },
    )?;
    writer.flush()?;

    info!(lines = written, output = %cli.output.display(), "wrote bulk-job lines");
    Ok(())
}
