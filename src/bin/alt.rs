use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gifcities::alt::extract_alts;
use gifcities::jsonl::{create_output, list_shards, open_gz_lines, shard_name};
use gifcities::logging::init_tracing;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-alt",
    about = "Replace archived page HTML with the GIF src/alt pairs it contains"
)]
struct AltCli {
    /// Directory of *.jsonl.gz page payload shards
    #[arg(long, env = "GIFCITIES_HTML", default_value = "data/gifpages_html")]
    input: PathBuf,

    /// Output JSONL; stdout when omitted
    #[arg(long, env = "GIFCITIES_ALT_OUTPUT")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = AltCli::parse();

    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(create_output(path)?),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut pages = 0usize;
    let mut images = 0usize;
    for shard in list_shards(&cli.input, ".jsonl.gz")? {
        let name = shard_name(&shard);
        let reader = open_gz_lines(&shard)?;
        let (shard_pages, shard_images) = extract_alts(reader, &name, &mut writer)?;
        info!(shard = %name, pages = shard_pages, images = shard_images, "scanned shard");
        pages += shard_pages;
        images += shard_images;
    }
    writer.flush()?;

    info!(pages, images, "alt extraction complete");
    Ok(())
}
