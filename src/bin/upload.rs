use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use gifcities::jsonl::list_shards;
use gifcities::logging::init_tracing;
use gifcities::objstore::{S3Settings, DEFAULT_BUCKET};
use gifcities::{FsObjectStore, ObjectStore, UploadProgress, Uploader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gifcities-upload",
    about = "Store GIF payloads keyed by checksum, skipping ones already stored"
)]
#[command(group(ArgGroup::new("source").required(true).args(["encoded", "raw"])))]
#[command(group(ArgGroup::new("target").args(["store_root", "bucket"])))]
struct UploadCli {
    /// Directory of gzip bulk-job shards carrying base64 payloads
    #[arg(long, env = "GIFCITIES_ENCODED")]
    encoded: Option<PathBuf>,

    /// Directory of raw GIF files named by checksum
    #[arg(long, env = "GIFCITIES_RAW")]
    raw: Option<PathBuf>,

    /// Store into a local directory instead of a bucket (must already exist)
    #[arg(long, env = "GIFCITIES_STORE_ROOT")]
    store_root: Option<PathBuf>,

    /// S3 bucket; S3_ENDPOINT, S3_ACCESS_KEY and S3_SECRET_KEY must be set
    #[arg(long, env = "GIFCITIES_BUCKET")]
    bucket: Option<String>,

    /// Append-only log of skip/success/fail decisions per checksum
    #[arg(long, env = "GIFCITIES_HASH_LOG", default_value = "hashes.log")]
    hash_log: PathBuf,

    /// Put attempts per object before giving up
    #[arg(long, env = "GIFCITIES_UPLOAD_ATTEMPTS", default_value_t = 3)]
    max_attempts: usize,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = UploadCli::parse();

    if let Some(root) = &cli.store_root {
        let store = FsObjectStore::open(root).context("object store unavailable")?;
        info!(root = %root.display(), "storing into local directory");
        return run(store, &cli);
    }
    let bucket = cli.bucket.as_deref().unwrap_or(DEFAULT_BUCKET);
    let settings = S3Settings::from_env(bucket).context("object store unavailable")?;
    run_bucket(&settings, &cli)
}

#[cfg(feature = "s3")]
fn run_bucket(settings: &S3Settings, cli: &UploadCli) -> Result<()> {
    let store =
        gifcities::objstore::S3ObjectStore::connect(settings).context("object store unavailable")?;
    info!(
        bucket = store.bucket(),
        endpoint = %settings.endpoint_url(),
        "connected to object store"
    );
    run(store, cli)
}

#[cfg(not(feature = "s3"))]
fn run_bucket(settings: &S3Settings, _cli: &UploadCli) -> Result<()> {
    anyhow::bail!(
        "uploading to bucket '{}' requires feature 's3' (build with: cargo build --features s3 --bin upload), or pass --store-root",
        settings.bucket
    )
}

fn run<S: ObjectStore>(store: S, cli: &UploadCli) -> Result<()> {
    let hash_log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.hash_log)
        .with_context(|| format!("failed to open hash log {:?}", cli.hash_log))?;
    let mut uploader = Uploader::new(store, BufWriter::new(hash_log), cli.max_attempts);

    if let Some(dir) = &cli.encoded {
        let shards = list_shards(dir, ".gz")?;
        uploader.upload_encoded_shards(&shards, |p| render_progress(p, ".gz files"))?;
    } else if let Some(dir) = &cli.raw {
        uploader.upload_dir(dir, |p| render_progress(p, "gif files"))?;
    }

    let progress = uploader.progress();
    let (_, mut hash_log) = uploader.into_parts();
    hash_log.flush()?;
    println!();
    info!(
        previously_seen = progress.previously_seen,
        uploaded = progress.uploaded,
        "upload complete"
    );
    Ok(())
}

fn render_progress(progress: &UploadProgress, unit: &str) {
    print!(
        "\x1b[2K\r{}/{} {} | {} read | {} previously seen | {} uploads",
        progress.file,
        progress.files_total,
        unit,
        progress.read,
        progress.previously_seen,
        progress.uploaded
    );
    let _ = io::stdout().flush();
}
