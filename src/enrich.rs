//! Joins externally computed embeddings and moderation scores onto records.

use std::collections::HashMap;
use std::io::BufRead;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::jsonl::for_each_jsonl;
use crate::record::ImageRecord;

/// One line of an enrichment shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    /// Checksum of the image the features belong to.
    #[serde(rename = "Hash")]
    pub hash: String,
    /// Model NSFW probability.
    #[serde(default)]
    pub mnsfw: f32,
    /// Moderation model identifier.
    #[serde(default)]
    pub mspec: String,
    /// Embedding vector.
    #[serde(rename = "Embedding", default)]
    pub embedding: Vec<f64>,
}

/// Enrichment line whose checksum had no base record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedEnrichment {
    /// Checksum named by the enrichment line.
    pub checksum: String,
    /// Shard the line came from.
    pub shard: String,
}

/// Outcome of merging one or more shards.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Lines applied to an existing record.
    pub applied: usize,
    /// Lines dropped, one entry per occurrence.
    pub unmatched: Vec<UnmatchedEnrichment>,
}

impl MergeReport {
    /// Adds `other`'s counts and drops to this report.
    pub fn absorb(&mut self, other: MergeReport) {
        self.applied += other.applied;
        self.unmatched.extend(other.unmatched);
    }
}

/// Checksum-keyed record set that enrichment shards are merged into.
///
/// Merging never creates records. Shards must be merged in the caller's
/// order: the moderation fields are last-write-wins. Reconciled input may
/// carry several records for one checksum; all of them are kept and every
/// one receives that checksum's enrichment.
#[derive(Debug, Default)]
pub struct RecordSet {
    records: Vec<ImageRecord>,
    by_checksum: HashMap<String, Vec<usize>>,
}

impl RecordSet {
    /// Indexes `records` by checksum, keeping input order.
    pub fn new(records: impl IntoIterator<Item = ImageRecord>) -> Self {
        let mut set = Self::default();
        for record in records {
            let idx = set.records.len();
            let slots = set
                .by_checksum
                .entry(record.checksum().to_string())
                .or_default();
            if !slots.is_empty() {
                debug!(checksum = record.checksum(), "checksum shared by several records");
            }
            slots.push(idx);
            set.records.push(record);
        }
        set
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the set holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record for `checksum`.
    pub fn get(&self, checksum: &str) -> Option<&ImageRecord> {
        self.get_all(checksum).next()
    }

    /// Every record for `checksum`, in input order.
    pub fn get_all<'a>(&'a self, checksum: &str) -> impl Iterator<Item = &'a ImageRecord> + 'a {
        self.by_checksum
            .get(checksum)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&idx| &self.records[idx])
    }

    /// Applies one enrichment line, returning false when its checksum is unknown.
    pub fn apply(&mut self, enrichment: EnrichmentRecord) -> bool {
        let Some(slots) = self.by_checksum.get(&enrichment.hash) else {
            return false;
        };
        for &idx in slots {
            self.records[idx].apply_enrichment(
                enrichment.embedding.clone(),
                enrichment.mnsfw,
                enrichment.mspec.as_str(),
            );
        }
        true
    }

    /// Merges one shard's lines, warning once per unknown checksum occurrence.
    pub fn merge_shard<I>(&mut self, shard: &str, lines: I) -> MergeReport
    where
        I: IntoIterator<Item = EnrichmentRecord>,
    {
        let mut report = MergeReport::default();
        for enrichment in lines {
            self.merge_one(shard, enrichment, &mut report);
        }
        report
    }

    /// Streams one JSONL shard into the set. Undecodable lines are fatal.
    pub fn merge_reader<R: BufRead>(&mut self, shard: &str, reader: R) -> Result<MergeReport> {
        let mut report = MergeReport::default();
        for_each_jsonl(reader, shard, |enrichment: EnrichmentRecord| {
            self.merge_one(shard, enrichment, &mut report);
            Ok(())
        })?;
        Ok(report)
    }

    /// Merges `shards` in the order given.
    pub fn merge_shards<I, S, L>(&mut self, shards: I) -> MergeReport
    where
        I: IntoIterator<Item = (S, L)>,
        S: AsRef<str>,
        L: IntoIterator<Item = EnrichmentRecord>,
    {
        let mut report = MergeReport::default();
        for (shard, lines) in shards {
            report.absorb(self.merge_shard(shard.as_ref(), lines));
        }
        report
    }

    /// Finished records, in input order.
    pub fn into_records(self) -> Vec<ImageRecord> {
        self.records
    }

    fn merge_one(&mut self, shard: &str, enrichment: EnrichmentRecord, report: &mut MergeReport) {
        let checksum = enrichment.hash.clone();
        if self.apply(enrichment) {
            report.applied += 1;
        } else {
            warn!(checksum = %checksum, shard, "checksum not found in base record set");
            report.unmatched.push(UnmatchedEnrichment {
                checksum,
                shard: shard.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Use;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    #[derive(Clone, Default)]
    struct WarnCount(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCount {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn seen_use(url: &str) -> Use {
        Use {
            url: url.to_string(),
            timestamp: "20090101000000".to_string(),
            page: None,
            alt: String::new(),
            path: String::new(),
            filename: String::new(),
        }
    }

    fn enrichment(hash: &str, mnsfw: f32, mspec: &str, embedding: &[f64]) -> EnrichmentRecord {
        EnrichmentRecord {
            hash: hash.to_string(),
            mnsfw,
            mspec: mspec.to_string(),
            embedding: embedding.to_vec(),
        }
    }

    fn base() -> RecordSet {
        RecordSet::new([ImageRecord::new("X", 1, 1), ImageRecord::new("Y", 2, 2)])
    }

    #[test]
    fn last_shard_wins_for_moderation_fields() {
        let mut set = base();
        let report = set.merge_shards([
            ("a.gz", vec![enrichment("X", 0.1, "model-a", &[1.0])]),
            ("b.gz", vec![enrichment("X", 0.9, "model-b", &[2.0])]),
        ]);
        assert_eq!(report.applied, 2);

        let record = set.get("X").expect("record");
        assert_eq!(record.mnsfw(), 0.9);
        assert_eq!(record.mspec(), "model-b");
        let vectors: Vec<&[f64]> = record.vectors().iter().map(|v| v.vector.as_slice()).collect();
        assert_eq!(vectors, vec![&[1.0][..], &[2.0][..]]);
    }

    #[test]
    fn unknown_checksum_is_dropped_and_reported_per_occurrence() {
        let mut set = base();
        let before_x = set.get("X").cloned();
        let before_y = set.get("Y").cloned();

        let report = set.merge_shards([
            ("a.gz", vec![enrichment("NOPE", 0.5, "m", &[1.0])]),
            ("b.gz", vec![enrichment("NOPE", 0.5, "m", &[1.0])]),
        ]);

        assert_eq!(report.applied, 0);
        assert_eq!(
            report.unmatched,
            vec![
                UnmatchedEnrichment {
                    checksum: "NOPE".to_string(),
                    shard: "a.gz".to_string(),
                },
                UnmatchedEnrichment {
                    checksum: "NOPE".to_string(),
                    shard: "b.gz".to_string(),
                },
            ]
        );
        assert_eq!(set.len(), 2);
        assert!(set.get("NOPE").is_none());
        assert_eq!(set.get("X"), before_x.as_ref());
        assert_eq!(set.get("Y"), before_y.as_ref());
    }

    #[test]
    fn warns_once_per_dropped_line() {
        let warnings = WarnCount::default();
        let subscriber = tracing_subscriber::registry().with(warnings.clone());

        let report = tracing::subscriber::with_default(subscriber, || {
            let mut set = base();
            set.merge_shards([
                (
                    "a.gz",
                    vec![
                        enrichment("NOPE", 0.5, "m", &[1.0]),
                        enrichment("X", 0.5, "m", &[1.0]),
                        enrichment("NOPE", 0.5, "m", &[1.0]),
                    ],
                ),
                ("b.gz", vec![enrichment("GONE", 0.5, "m", &[1.0])]),
            ])
        });

        assert_eq!(report.applied, 1);
        assert_eq!(report.unmatched.len(), 3);
        assert_eq!(warnings.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn shared_checksum_keeps_every_record_and_enriches_each() {
        let mut first = ImageRecord::new("ITCHY", 1, 1);
        first.push_use(seen_use("http://x/itchy.gif"));
        let mut second = ImageRecord::new("ITCHY", 1, 1);
        second.push_use(seen_use("http://x/scratchy.gif"));
        second.push_use(seen_use("http://x/other.gif"));

        let mut set = RecordSet::new([first, second, ImageRecord::new("Y", 2, 2)]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get_all("ITCHY").count(), 2);

        let report = set.merge_shard("a.gz", vec![enrichment("ITCHY", 0.3, "m", &[1.0])]);
        assert_eq!(report.applied, 1);
        assert!(report.unmatched.is_empty());

        let records = set.into_records();
        let uses: Vec<(&str, usize, usize)> = records
            .iter()
            .map(|r| (r.checksum(), r.use_count(), r.vectors().len()))
            .collect();
        assert_eq!(uses, vec![("ITCHY", 1, 1), ("ITCHY", 2, 1), ("Y", 0, 0)]);
    }

    #[test]
    fn absorbed_reports_accumulate() {
        let mut set = base();
        let mut totals = MergeReport::default();
        totals.absorb(set.merge_shard("a.gz", vec![enrichment("X", 0.1, "m", &[1.0])]));
        totals.absorb(set.merge_shard("b.gz", vec![enrichment("NOPE", 0.1, "m", &[1.0])]));
        assert_eq!(totals.applied, 1);
        assert_eq!(
            totals.unmatched,
            vec![UnmatchedEnrichment {
                checksum: "NOPE".to_string(),
                shard: "b.gz".to_string(),
            }]
        );
    }

    #[test]
    fn merges_shard_schema_from_reader() {
        let mut set = base();
        let shard = concat!(
            r#"{"Hash":"Y","mnsfw":0.25,"mspec":"nsfw-v2","Embedding":[0.5,-0.5]}"#,
            "\n",
            r#"{"Hash":"Z","mnsfw":0.75,"mspec":"nsfw-v2","Embedding":[]}"#,
            "\n"
        );
        let report = set.merge_reader("part-0000.gz", Cursor::new(shard)).expect("merge");
        assert_eq!(report.applied, 1);
        assert_eq!(report.unmatched.len(), 1);

        let record = set.get("Y").expect("record");
        assert_eq!(record.mnsfw(), 0.25);
        assert_eq!(record.vectors()[0].vector, vec![0.5, -0.5]);
    }

    #[test]
    fn undecodable_shard_line_is_fatal() {
        let mut set = base();
        let err = set
            .merge_reader("bad.gz", Cursor::new("{\"Hash\":3}\n"))
            .expect_err("bad line");
        assert!(err.to_string().contains("bad.gz"));
    }
}
