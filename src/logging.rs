//! Tracing setup shared by the pipeline binaries.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `tracing` subscriber filtered by `GIFCITIES_LOG`, then
/// `RUST_LOG`, then `info`.
///
/// Field contract for pipeline events:
/// - dropped enrichment lines carry `checksum` and `shard`;
/// - dropped reconciliation lines carry `key` and `checksum`;
/// - upload events carry `key`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Filter used by [`init_tracing`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("GIFCITIES_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
