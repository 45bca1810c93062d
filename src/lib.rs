#![warn(missing_docs)]
//! Builds the GifCities search documents from the archived GIF manifest.
//!
//! Stages, each driven by a binary under `src/bin`:
//! manifest lines are parsed ([`manifest`]) and collated per checksum
//! ([`aggregate`]); embedding and moderation shards are merged on by checksum
//! ([`enrich`]); and when the manifest drifts from the bulk-job output the
//! record set is rebuilt from both ([`reconcile`]).

pub mod aggregate;
pub mod alt;
pub mod bulkjob;
pub mod enrich;
pub mod jsonl;
pub mod logging;
pub mod manifest;
pub mod objstore;
pub mod reconcile;
pub mod record;
pub mod search;

pub use aggregate::{aggregate_manifest, Aggregator};
pub use bulkjob::{BulkJobLine, UniqueByHash};
pub use enrich::{EnrichmentRecord, MergeReport, RecordSet, UnmatchedEnrichment};
pub use manifest::{parse_line, ManifestEntry, ManifestError, ManifestField};
pub use objstore::{FsObjectStore, ObjectStore, UploadProgress, Uploader};
pub use reconcile::{ReconcileReport, Resolution, Resolver};
pub use record::{FeatureVector, ImageRecord, Page, Use};
