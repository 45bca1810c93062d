use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gifcities::jsonl::{create_output, for_each_jsonl, open_lines, shard_name, write_jsonl};
use gifcities::logging::init_tracing;
use gifcities::{BulkJobLine, Resolver};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-fixmanifest",
    about = "Rebuild GIF documents from the manifest using bulk-job checksums as identity"
)]
struct FixManifestCli {
    /// Unique bulk-job fetches produced by gifcities-spark-unique
    #[arg(
        long,
        env = "GIFCITIES_SPARK_UNIQUE",
        default_value = "data/unique_from_spark.jsonl"
    )]
    spark: PathBuf,

    /// Original space-delimited manifest
    #[arg(
        long,
        env = "GIFCITIES_MANIFEST",
        default_value = "data/gifcities-gifs.txt"
    )]
    manifest: PathBuf,

    /// Output JSONL of reconciled documents
    #[arg(
        long,
        env = "GIFCITIES_GOLDEN_MASTER",
        default_value = "data/golden_master.gifcities.jsonl"
    )]
    output: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = FixManifestCli::parse();

    let mut resolver = Resolver::new();
    let indexed = for_each_jsonl(
        open_lines(&cli.spark)?,
        &shard_name(&cli.spark),
        |line: BulkJobLine| {
            resolver.index(line);
            Ok(())
        },
    )?;
    info!(lines = indexed, records = resolver.len(), "indexed bulk-job output");

    resolver
        .resolve_manifest(open_lines(&cli.manifest)?)
        .with_context(|| format!("failed to reconcile {:?}", cli.manifest))?;
    let (records, report) = resolver.finish();

    let mut writer = create_output(&cli.output)?;
    write_jsonl(&mut writer, &records)?;
    writer.flush()?;

    if !report.unresolved.is_empty() {
        warn!(
            dropped = report.unresolved.len(),
            "manifest uses missing from the bulk-job output"
        );
    }
    info!(
        records = records.len(),
        by_key = report.by_key,
        by_checksum = report.by_checksum,
        output = %cli.output.display(),
        "wrote reconciled documents"
    );
    Ok(())
}
