//! Collates per-use manifest lines into one record per checksum.

use std::collections::HashMap;
use std::io::BufRead;

use crate::manifest::{parse_line, ManifestEntry, ManifestError};
use crate::record::ImageRecord;

/// Checksum-keyed accumulator for manifest entries.
///
/// Dimensions are first-write-wins: once a checksum has a record, width and
/// height from later entries are ignored.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: HashMap<String, ImageRecord>,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one entry into the record for its checksum.
    pub fn push(&mut self, entry: ManifestEntry) {
        let ManifestEntry {
            checksum,
            width,
            height,
            use_,
        } = entry;
        self.records
            .entry(checksum)
            .or_insert_with_key(|checksum| ImageRecord::new(checksum.clone(), width, height))
            .push_use(use_);
    }

    /// Number of distinct checksums seen.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for `checksum`, if seen.
    pub fn get(&self, checksum: &str) -> Option<&ImageRecord> {
        self.records.get(checksum)
    }

    /// Finished records, unordered.
    pub fn finish(self) -> Vec<ImageRecord> {
        self.records.into_values().collect()
    }
}

/// Aggregates a whole manifest, aborting on the first malformed line.
///
/// Blank lines are skipped.
pub fn aggregate_manifest<R: BufRead>(reader: R) -> Result<Vec<ImageRecord>, ManifestError> {
    let mut aggregator = Aggregator::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| ManifestError::Read {
            line: line_no,
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        aggregator.push(parse_line(line_no, &line)?);
    }
    Ok(aggregator.finish())
}
