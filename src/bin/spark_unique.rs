use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gifcities::jsonl::{
    create_output, for_each_jsonl, list_shards, open_gz_lines, shard_name, write_jsonl,
};
use gifcities::logging::init_tracing;
use gifcities::{BulkJobLine, UniqueByHash};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-spark-unique",
    about = "Keep the first bulk-job fetch per checksum, without payloads"
)]
struct SparkUniqueCli {
    /// Directory of gzip JSONL bulk-job output shards
    #[arg(
        long,
        env = "GIFCITIES_SPARK_OUTPUT",
        default_value = "/kubwa/gifcities/gifs_jsonl.gz"
    )]
    input: PathBuf,

    /// Output JSONL of unique fetches
    #[arg(
        long,
        env = "GIFCITIES_SPARK_UNIQUE",
        default_value = "data/unique_from_spark.jsonl"
    )]
    output: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = SparkUniqueCli::parse();

    let mut unique = UniqueByHash::new();
    let mut total = 0usize;
    for shard in list_shards(&cli.input, ".gz")? {
        let name = shard_name(&shard);
        total += for_each_jsonl(open_gz_lines(&shard)?, &name, |line: BulkJobLine| {
            unique.offer(line);
            Ok(())
        })?;
    }

    let lines = unique.into_lines();
    let mut writer = create_output(&cli.output)?;
    write_jsonl(&mut writer, &lines)?;
    writer.flush()?;

    info!(
        read = total,
        unique = lines.len(),
        output = %cli.output.display(),
        "wrote unique bulk-job fetches"
    );
    Ok(())
}
