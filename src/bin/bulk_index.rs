use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gifcities::jsonl::{create_output, open_lines, read_jsonl, shard_name};
use gifcities::logging::init_tracing;
use gifcities::search::{write_bulk, SearchClient};
use gifcities::ImageRecord;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-bulk-index",
    about = "Load GIF documents into the search index through the bulk API"
)]
struct BulkCli {
    /// JSONL documents to index
    #[arg(
        long,
        env = "GIFCITIES_VEC_JSONL",
        default_value = "data/gifcities_vec.jsonl"
    )]
    input: PathBuf,

    /// Target index name
    #[arg(long, env = "GIFCITIES_INDEX", default_value = "gifcities")]
    index: String,

    /// Search cluster base URL; when omitted only --output is written
    #[arg(long, env = "GIFCITIES_SEARCH_URL")]
    search_url: Option<String>,

    /// Also write the NDJSON bulk body to this file
    #[arg(long, env = "GIFCITIES_BULK_OUTPUT")]
    output: Option<PathBuf>,

    /// Documents per bulk request
    #[arg(long, env = "GIFCITIES_BULK_BATCH", default_value_t = 500)]
    batch_size: usize,

    /// Vector dimensions for the index mapping; defaults to the first vector seen
    #[arg(long, env = "GIFCITIES_VECTOR_DIMS")]
    dims: Option<usize>,

    /// Seconds to wait for each search request
    #[arg(long, env = "GIFCITIES_SEARCH_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = BulkCli::parse();
    anyhow::ensure!(
        cli.search_url.is_some() || cli.output.is_some(),
        "nothing to do: pass --search-url and/or --output"
    );

    // reach the cluster before reading anything
    let client = match &cli.search_url {
        Some(url) => {
            let timeout = Duration::from_secs(cli.timeout_secs.max(1));
            let client = SearchClient::new(url, cli.index.clone(), timeout)?;
            client.ping().await?;
            Some(client)
        }
        None => None,
    };

    let records: Vec<ImageRecord> =
        read_jsonl(open_lines(&cli.input)?, &shard_name(&cli.input))?;

    if let Some(path) = &cli.output {
        let mut writer = create_output(path)?;
        write_bulk(&mut writer, &cli.index, &records)?;
        writer.flush()?;
        info!(documents = records.len(), output = %path.display(), "wrote bulk body");
    }

    let Some(client) = client else {
        return Ok(());
    };
    let dims = cli
        .dims
        .or_else(|| first_vector_len(&records))
        .context("no vectors in input; pass --dims")?;
    if client.ensure_index(dims).await? {
        info!(index = %cli.index, dims, "created index");
    }

    let batch_size = cli.batch_size.max(1);
    let mut indexed = 0usize;
    for batch in records.chunks(batch_size) {
        let mut body = Vec::new();
        write_bulk(&mut body, &cli.index, batch)?;
        indexed += client.bulk(body).await?;
        render_progress(indexed, records.len());
    }
    if indexed > 0 {
        println!();
    }
    info!(documents = indexed, index = %cli.index, "bulk load complete");
    Ok(())
}

fn first_vector_len(records: &[ImageRecord]) -> Option<usize> {
    records
        .iter()
        .flat_map(|record| record.vectors())
        .map(|vec| vec.vector.len())
        .find(|len| *len > 0)
}

fn render_progress(done: usize, total: usize) {
    if total == 0 {
        return;
    }
    let pct = (done as f64 / total as f64) * 100.0;
    print!("\r[{}/{}] {:.1}% indexed", done, total, pct);
    let _ = io::stdout().flush();
}
