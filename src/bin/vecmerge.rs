use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gifcities::jsonl::{
    create_output, list_shards, open_gz_lines, open_lines, read_jsonl, shard_name, write_jsonl,
};
use gifcities::logging::init_tracing;
use gifcities::{ImageRecord, MergeReport, RecordSet};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-vecmerge",
    about = "Merge embedding and moderation shards onto aggregated GIF documents"
)]
struct VecMergeCli {
    /// Aggregated JSONL produced by gifcities-manifest
    #[arg(long, env = "GIFCITIES_JSONL", default_value = "data/gifcities.jsonl")]
    input: PathBuf,

    /// Directory of gzip JSONL enrichment shards, merged in filename order
    #[arg(long, env = "GIFCITIES_EMBEDDINGS", default_value = "data/embeddings")]
    embeddings: PathBuf,

    /// Only merge shard files ending with this suffix
    #[arg(long, env = "GIFCITIES_EMBEDDINGS_SUFFIX", default_value = "")]
    suffix: String,

    /// Output JSONL with vectors attached
    #[arg(
        long,
        env = "GIFCITIES_VEC_JSONL",
        default_value = "data/gifcities_vec.jsonl"
    )]
    output: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = VecMergeCli::parse();

    let base: Vec<ImageRecord> = read_jsonl(open_lines(&cli.input)?, &shard_name(&cli.input))?;
    let mut records = RecordSet::new(base);
    info!(records = records.len(), "loaded base records");

    let mut totals = MergeReport::default();
    for shard in list_shards(&cli.embeddings, &cli.suffix)? {
        let name = shard_name(&shard);
        let report = records.merge_reader(&name, open_gz_lines(&shard)?)?;
        info!(
            shard = %name,
            applied = report.applied,
            unmatched = report.unmatched.len(),
            "merged shard"
        );
        totals.absorb(report);
    }

    let records = records.into_records();
    let mut writer = create_output(&cli.output)?;
    write_jsonl(&mut writer, &records)?;
    writer.flush()?;

    if !totals.unmatched.is_empty() {
        warn!(
            unmatched = totals.unmatched.len(),
            "enrichment lines named checksums missing from the base set"
        );
    }
    info!(
        records = records.len(),
        applied = totals.applied,
        output = %cli.output.display(),
        "wrote enriched documents"
    );
    Ok(())
}
