//! Alt-text pass over archived page payloads.

use std::io::{BufRead, Write};

use anyhow::Result;
use gif_alt::{find_gif_images, GifImage};
use serde::{Deserialize, Serialize};

use crate::jsonl::for_each_jsonl;

/// Archived page as exported for the alt pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePayload {
    /// Archived page URL.
    #[serde(rename = "URL", alias = "url", default)]
    pub url: String,
    /// Capture timestamp.
    #[serde(rename = "Timestamp", alias = "timestamp", default)]
    pub timestamp: String,
    /// Raw page HTML; cleared once scanned.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub html: String,
    /// GIF references found in `html`.
    #[serde(rename = "Imgs", default)]
    pub imgs: Vec<GifImage>,
}

impl PagePayload {
    /// Replaces the HTML with the GIF references it contains.
    pub fn extract(&mut self) {
        self.imgs = find_gif_images(&self.html);
        self.html.clear();
    }
}

/// Scans every payload in `reader` and writes the stripped payloads to `writer`.
///
/// Returns `(pages, images)` counts.
pub fn extract_alts<R: BufRead, W: Write>(
    reader: R,
    source: &str,
    writer: &mut W,
) -> Result<(usize, usize)> {
    let mut images = 0usize;
    let pages = for_each_jsonl(reader, source, |mut payload: PagePayload| {
        payload.extract();
        images += payload.imgs.len();
        serde_json::to_writer(&mut *writer, &payload)?;
        writer.write_all(b"\n")?;
        Ok(())
    })?;
    Ok((pages, images))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn strips_html_and_attaches_images() {
        let input = concat!(
            r#"{"URL":"http://geocities.com/a/","Timestamp":"20091027012515","html":"<img src=\"sam.gif\" alt=\"sam\">"}"#,
            "\n",
            r#"{"URL":"http://geocities.com/b/","Timestamp":"20091027012516","html":"<p>none</p>"}"#,
            "\n"
        );
        let mut out = Vec::new();
        let counts = extract_alts(Cursor::new(input), "pages.jsonl.gz", &mut out).expect("extract");
        assert_eq!(counts, (2, 1));

        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"URL":"http://geocities.com/a/","Timestamp":"20091027012515","Imgs":[{"Src":"sam.gif","Alt":"sam"}]}"#,
                r#"{"URL":"http://geocities.com/b/","Timestamp":"20091027012516","Imgs":[]}"#,
            ]
        );
    }
}
