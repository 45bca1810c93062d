//! Canonical per-checksum documents handed to the search index.

use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Capture identity of the archived page that embedded an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Archived page URL.
    pub url: String,
    /// Fixed-width wayback capture timestamp.
    pub timestamp: String,
}

/// One historical observation of an image embedded in a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Use {
    /// Fully-qualified archived image URL.
    pub url: String,
    /// Fixed-width wayback capture timestamp of the image fetch.
    pub timestamp: String,
    /// Containing page, absent when the manifest carried `-/-`.
    pub page: Option<Page>,
    /// Alt text; empty until an alt enrichment pass fills it.
    pub alt: String,
    /// Human-readable URL path with the filename removed.
    pub path: String,
    /// Last path segment, extension stripped.
    pub filename: String,
}

/// Embedding emitted by one enrichment shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Ordered vector components.
    pub vector: Vec<f64>,
}

/// Aggregate of every use of one GIF, keyed by its content checksum.
///
/// `page_count` is never stored: it is serialized from the length of `uses`
/// so the count cannot drift from the sequence it describes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageRecord {
    checksum: String,
    #[serde(default)]
    terms: String,
    #[serde(default)]
    uses: Vec<Use>,
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
    #[serde(default)]
    vecs: Vec<FeatureVector>,
    #[serde(default)]
    mnsfw: f32,
    #[serde(default)]
    knsfw: bool,
    #[serde(default)]
    mspec: String,
}

impl ImageRecord {
    /// Creates an empty record for `checksum` with the given dimensions.
    pub fn new(checksum: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            checksum: checksum.into(),
            terms: String::new(),
            uses: Vec::new(),
            width,
            height,
            vecs: Vec::new(),
            mnsfw: 0.0,
            knsfw: false,
            mspec: String::new(),
        }
    }

    /// Record carrying only its identity, dimensions unknown.
    pub fn skeleton(checksum: impl Into<String>) -> Self {
        Self::new(checksum, 0, 0)
    }

    /// Content checksum identifying this record.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Uses in arrival order.
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    /// Number of uses appended so far.
    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    /// Pixel width.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Pixel height.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Embeddings merged onto this record, one per emitting shard.
    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vecs
    }

    /// Model NSFW probability.
    pub fn mnsfw(&self) -> f32 {
        self.mnsfw
    }

    /// Known-NSFW flag.
    pub fn knsfw(&self) -> bool {
        self.knsfw
    }

    /// Identifier of the moderation model that produced `mnsfw`.
    pub fn mspec(&self) -> &str {
        &self.mspec
    }

    /// Appends an observation.
    pub fn push_use(&mut self, use_: Use) {
        self.uses.push(use_);
    }

    /// Overwrites the dimensions.
    pub fn set_dimensions(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
    }

    /// Appends an embedding and overwrites the moderation fields.
    pub fn apply_enrichment(&mut self, vector: Vec<f64>, mnsfw: f32, mspec: impl Into<String>) {
        self.vecs.push(FeatureVector { vector });
        self.mnsfw = mnsfw;
        self.mspec = mspec.into();
    }
}

impl Serialize for ImageRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let fields = if self.vecs.is_empty() { 9 } else { 10 };
        let mut state = serializer.serialize_struct("ImageRecord", fields)?;
        state.serialize_field("checksum", &self.checksum)?;
        state.serialize_field("terms", &self.terms)?;
        state.serialize_field("uses", &self.uses)?;
        state.serialize_field("page_count", &self.uses.len())?;
        state.serialize_field("width", &self.width)?;
        state.serialize_field("height", &self.height)?;
        if self.vecs.is_empty() {
            state.skip_field("vecs")?;
        } else {
            state.serialize_field("vecs", &self.vecs)?;
        }
        state.serialize_field("mnsfw", &self.mnsfw)?;
        state.serialize_field("knsfw", &self.knsfw)?;
        state.serialize_field("mspec", &self.mspec)?;
        state.end()
    }
}
