//! Rebuilds the record set when the manifest and the bulk-job output disagree
//! about which checksum belongs to which use.
//!
//! The bulk job is ground truth for identity: every output record carries a
//! bulk-job checksum. Manifest lines are joined onto those records by their
//! `timestamp/url` key first and by checksum second.
//!
//! Known limitation: the bulk job can emit one checksum under two different
//! keys. Each key gets its own record, so such a checksum appears twice in the
//! output. No dedup rule is applied until the cause is understood.

use std::collections::HashMap;
use std::io::BufRead;

use tracing::warn;

use crate::bulkjob::BulkJobLine;
use crate::manifest::{parse_line, ManifestEntry, ManifestError};
use crate::record::ImageRecord;

/// How a manifest line was joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Matched a bulk-job fetch with the same `timestamp/url`.
    ByKey {
        /// Checksum of the record the use joined.
        checksum: String,
    },
    /// Key missed; matched a bulk-job record with the same checksum.
    ByChecksum {
        /// Checksum of the record the use joined.
        checksum: String,
    },
    /// Neither index matched; the line was dropped.
    Unresolved {
        /// Composite key of the dropped line.
        key: String,
    },
}

/// Counts and drops from one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Lines joined by composite key.
    pub by_key: usize,
    /// Lines joined by checksum fallback.
    pub by_checksum: usize,
    /// Composite keys of dropped lines, in manifest order.
    pub unresolved: Vec<String>,
}

/// Two-index join of manifest lines onto bulk-job records.
#[derive(Debug, Default)]
pub struct Resolver {
    records: Vec<ImageRecord>,
    by_key: HashMap<String, usize>,
    by_checksum: HashMap<String, usize>,
    report: ReconcileReport,
}

impl Resolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the indices from a bulk-job scan.
    pub fn from_bulk_job<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = BulkJobLine>,
    {
        let mut resolver = Self::new();
        for line in lines {
            resolver.index(line);
        }
        resolver
    }

    /// Indexes one bulk-job line.
    ///
    /// A key seen before is ignored. A checksum seen before under another key
    /// gets a second record, and the checksum index moves to the newer one.
    pub fn index(&mut self, line: BulkJobLine) {
        let key = line.key();
        if self.by_key.contains_key(&key) {
            return;
        }
        let slot = self.records.len();
        self.records.push(ImageRecord::skeleton(line.hash.clone()));
        self.by_key.insert(key, slot);
        self.by_checksum.insert(line.hash, slot);
    }

    /// Number of records indexed.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no bulk-job lines were indexed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Joins one manifest entry. Dimensions are last-write-wins here.
    pub fn resolve(&mut self, entry: ManifestEntry) -> Resolution {
        let key = entry.key();
        let (slot, by_key) = match self.by_key.get(&key) {
            Some(&slot) => (slot, true),
            None => match self.by_checksum.get(&entry.checksum) {
                Some(&slot) => (slot, false),
                None => {
                    warn!(key = %key, checksum = %entry.checksum, "FAILED TO FIND {key} IN THE SPARK OUTPUT");
                    self.report.unresolved.push(key.clone());
                    return Resolution::Unresolved { key };
                }
            },
        };

        let record = &mut self.records[slot];
        record.set_dimensions(entry.width, entry.height);
        record.push_use(entry.use_);
        let checksum = record.checksum().to_string();
        if by_key {
            self.report.by_key += 1;
            Resolution::ByKey { checksum }
        } else {
            self.report.by_checksum += 1;
            Resolution::ByChecksum { checksum }
        }
    }

    /// Joins every line of a manifest. Malformed lines abort the pass.
    pub fn resolve_manifest<R: BufRead>(&mut self, reader: R) -> Result<(), ManifestError> {
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|source| ManifestError::Read {
                line: line_no,
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            self.resolve(parse_line(line_no, &line)?);
        }
        Ok(())
    }

    /// Resolved records in bulk-job order, with the pass report.
    pub fn finish(self) -> (Vec<ImageRecord>, ReconcileReport) {
        (self.records, self.report)
    }
}
