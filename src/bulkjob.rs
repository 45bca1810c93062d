//! Line schema of the distributed bulk-processing job that fetched every GIF.

use std::collections::HashSet;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::manifest::composite_key;
use crate::record::ImageRecord;

/// One fetched GIF as emitted by the bulk job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkJobLine {
    /// Content checksum computed by the job.
    #[serde(alias = "Hash")]
    pub hash: String,
    /// Archived image URL the job fetched.
    #[serde(default, alias = "URL")]
    pub url: String,
    /// Capture timestamp the job fetched.
    #[serde(default, alias = "TS")]
    pub ts: String,
    /// Base64 GIF payload; dropped once the bytes are stored.
    #[serde(default, alias = "Gifb64", skip_serializing_if = "String::is_empty")]
    pub gifb64: String,
}

impl BulkJobLine {
    /// Composite `ts/url` key of the fetch.
    pub fn key(&self) -> String {
        composite_key(&self.ts, &self.url)
    }

    /// Decodes the GIF payload.
    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.gifb64.as_bytes())
    }
}

/// Keeps the first bulk-job line seen for each checksum, payload stripped.
///
/// The job emits the same checksum under several `ts/url` pairs; only the
/// first sighting survives, in sighting order.
#[derive(Debug, Default)]
pub struct UniqueByHash {
    seen: HashSet<String>,
    lines: Vec<BulkJobLine>,
}

impl UniqueByHash {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a line; returns true when it was the first for its checksum.
    pub fn offer(&mut self, mut line: BulkJobLine) -> bool {
        if !self.seen.insert(line.hash.clone()) {
            return false;
        }
        line.gifb64.clear();
        self.lines.push(line);
        true
    }

    /// Number of distinct checksums kept.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when nothing was kept.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Kept lines in first-sighting order.
    pub fn into_lines(self) -> Vec<BulkJobLine> {
        self.lines
    }
}

/// Builds a bulk-job line for a GIF fetched outside the bulk job.
///
/// The record's first use supplies `ts`/`url`; `gif` is the raw file content.
pub fn missing_line(record: &ImageRecord, gif: &[u8]) -> Result<BulkJobLine> {
    let first = record
        .uses()
        .first()
        .with_context(|| format!("record {} has no uses", record.checksum()))?;
    Ok(BulkJobLine {
        hash: record.checksum().to_string(),
        url: first.url.clone(),
        ts: first.timestamp.clone(),
        gifb64: STANDARD.encode(gif),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_line;
    use pretty_assertions::assert_eq;

    fn job_line(hash: &str, url: &str, payload: &str) -> BulkJobLine {
        BulkJobLine {
            hash: hash.to_string(),
            url: url.to_string(),
            ts: "20091027012515".to_string(),
            gifb64: payload.to_string(),
        }
    }

    #[test]
    fn keeps_first_line_per_hash_without_payload() {
        let mut unique = UniqueByHash::new();
        assert!(unique.offer(job_line("H1", "http://x/itchy.gif", "R0lG")));
        assert!(unique.offer(job_line("H2", "http://x/b.gif", "R0lG")));
        assert!(!unique.offer(job_line("H1", "http://x/scratchy.gif", "R0lG")));

        let lines = unique.into_lines();
        assert_eq!(
            lines,
            vec![
                job_line("H1", "http://x/itchy.gif", ""),
                job_line("H2", "http://x/b.gif", ""),
            ]
        );
        let text = serde_json::to_string(&lines[0]).expect("serialize");
        assert_eq!(
            text,
            r#"{"hash":"H1","url":"http://x/itchy.gif","ts":"20091027012515"}"#
        );
    }

    #[test]
    fn accepts_capitalized_field_names() {
        let line: BulkJobLine =
            serde_json::from_str(r#"{"Hash":"H1","Gifb64":"R0lGODlh"}"#).expect("deserialize");
        assert_eq!(line.hash, "H1");
        assert_eq!(line.decode_payload().expect("decode"), b"GIF89a".to_vec());
    }

    #[test]
    fn missing_line_uses_first_use_and_encodes_bytes() {
        let mut record = ImageRecord::new("CK", 1, 1);
        for (idx, text) in [
            "20010101000000/http://geocities.com/a/first.gif CK 1 1 -/-",
            "20020101000000/http://geocities.com/a/second.gif CK 1 1 -/-",
        ]
        .iter()
        .enumerate()
        {
            record.push_use(parse_line(idx + 1, text).expect("parse").use_);
        }

        let line = missing_line(&record, b"GIF89a").expect("line");
        assert_eq!(line.url, "http://geocities.com/a/first.gif");
        assert_eq!(line.ts, "20010101000000");
        assert_eq!(line.gifb64, "R0lGODlh");
        assert_eq!(line.key(), "20010101000000/http://geocities.com/a/first.gif");
    }

    #[test]
    fn missing_line_requires_a_use() {
        let record = ImageRecord::new("CK", 1, 1);
        assert!(missing_line(&record, b"GIF89a").is_err());
    }
}
