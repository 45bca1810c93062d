//! Parser for the flat-file GIF manifest.
//!
//! Each line describes one (use, image) pair:
//!
//! ```text
//! 20031224055733/http://geocities.com/+estranged+/sam.gif MA2RY6GR... 72 72 20091027012515/http://geocities.com/+estranged+/
//! ```
//!
//! Fields are the encoded use, checksum, width, height and the encoded page
//! (or the `-/-` sentinel when no containing page is known).

use std::fmt;
use std::io;

use percent_encoding::percent_decode_str;

use crate::record::{Page, Use};

/// Page field value meaning "no containing page known".
pub const NO_PAGE_SENTINEL: &str = "-/-";

const FIELD_COUNT: usize = 5;

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Content checksum of the image.
    pub checksum: String,
    /// Pixel width as recorded on this line.
    pub width: i32,
    /// Pixel height as recorded on this line.
    pub height: i32,
    /// The observation this line describes.
    pub use_: Use,
}

impl ManifestEntry {
    /// Composite `timestamp/url` key of the observation.
    pub fn key(&self) -> String {
        composite_key(&self.use_.timestamp, &self.use_.url)
    }
}

/// Manifest field that failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestField {
    /// The line did not have exactly five fields.
    FieldCount,
    /// Encoded use was not `timestamp/url`.
    Use,
    /// Image URL could not be parsed.
    Url,
    /// Width was not an integer.
    Width,
    /// Height was not an integer.
    Height,
    /// Encoded page was neither `timestamp/url` nor the sentinel.
    Page,
}

impl fmt::Display for ManifestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FieldCount => "field count",
            Self::Use => "use",
            Self::Url => "url",
            Self::Width => "width",
            Self::Height => "height",
            Self::Page => "page",
        };
        f.write_str(name)
    }
}

/// Errors surfaced while reading a manifest.
#[derive(Debug)]
pub enum ManifestError {
    /// A line failed structural parsing.
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// Field that failed.
        field: ManifestField,
        /// Offending text.
        value: String,
    },
    /// Reading the underlying input failed.
    Read {
        /// 1-based line number being read.
        line: usize,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl ManifestError {
    fn malformed(line: usize, field: ManifestField, value: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            field,
            value: value.into(),
        }
    }

    /// Field that failed, when the error is structural.
    pub fn field(&self) -> Option<ManifestField> {
        match self {
            Self::MalformedLine { field, .. } => Some(*field),
            Self::Read { .. } => None,
        }
    }
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLine { line, field, value } => {
                write!(f, "malformed manifest line {line}: bad {field} '{value}'")
            }
            Self::Read { line, source } => {
                write!(f, "failed to read manifest line {line}: {source}")
            }
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedLine { .. } => None,
            Self::Read { source, .. } => Some(source),
        }
    }
}

/// Parses one manifest line; `line_no` is only used for error reporting.
pub fn parse_line(line_no: usize, line: &str) -> Result<ManifestEntry, ManifestError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != FIELD_COUNT {
        return Err(ManifestError::malformed(
            line_no,
            ManifestField::FieldCount,
            line,
        ));
    }

    let checksum = fields[1].to_string();
    let width = fields[2]
        .parse::<i32>()
        .map_err(|_| ManifestError::malformed(line_no, ManifestField::Width, fields[2]))?;
    let height = fields[3]
        .parse::<i32>()
        .map_err(|_| ManifestError::malformed(line_no, ManifestField::Height, fields[3]))?;
    let use_ = parse_use(line_no, fields[0], fields[4])?;

    Ok(ManifestEntry {
        checksum,
        width,
        height,
        use_,
    })
}

/// Splits an encoded `timestamp/url` at its first slash.
pub fn split_wayback_url(encoded: &str) -> Option<(&str, &str)> {
    encoded.split_once('/')
}

/// Formats the composite key used to join manifest lines with bulk-job output.
pub fn composite_key(timestamp: &str, url: &str) -> String {
    format!("{timestamp}/{url}")
}

fn parse_use(line_no: usize, encoded_use: &str, encoded_page: &str) -> Result<Use, ManifestError> {
    let (timestamp, raw_url) = split_wayback_url(encoded_use)
        .ok_or_else(|| ManifestError::malformed(line_no, ManifestField::Use, encoded_use))?;
    let url_path = decoded_path(raw_url)
        .ok_or_else(|| ManifestError::malformed(line_no, ManifestField::Url, raw_url))?;

    let filename = filename_of(raw_url);
    let path = path_text(&url_path, &filename);

    let page = if encoded_page == NO_PAGE_SENTINEL {
        None
    } else {
        let (timestamp, url) = split_wayback_url(encoded_page)
            .ok_or_else(|| ManifestError::malformed(line_no, ManifestField::Page, encoded_page))?;
        Some(Page {
            url: url.to_string(),
            timestamp: timestamp.to_string(),
        })
    };

    Ok(Use {
        url: raw_url.to_string(),
        timestamp: timestamp.to_string(),
        page,
        alt: String::new(),
        path,
        filename,
    })
}

fn filename_of(raw_url: &str) -> String {
    let last = raw_url.rsplit('/').next().unwrap_or_default();
    last.split('.').next().unwrap_or_default().to_string()
}

/// Percent-decoded path component of `raw`.
///
/// Accepts anything a browser would have requested, including relative
/// references and out-of-range ports. Rejects control characters, broken
/// `%XX` escapes and non-numeric ports.
fn decoded_path(raw: &str) -> Option<String> {
    if raw.is_empty() || raw.chars().any(|c| c.is_control()) {
        return None;
    }
    let end = raw.find(|c| c == '?' || c == '#').unwrap_or(raw.len());
    let without_query = &raw[..end];
    let path = match without_query.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => {
            let (authority, path) = match rest.find('/') {
                Some(idx) => rest.split_at(idx),
                None => (rest, ""),
            };
            if !valid_port(authority) {
                return None;
            }
            path
        }
        _ => without_query,
    };
    if !valid_escapes(path) {
        return None;
    }
    Some(percent_decode_str(path).decode_utf8_lossy().into_owned())
}

fn is_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn valid_port(authority: &str) -> bool {
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    // bracketed IPv6 literals carry colons of their own
    let host = host.rsplit_once(']').map_or(host, |(_, rest)| rest);
    match host.rsplit_once(':') {
        Some((_, port)) => port.chars().all(|c| c.is_ascii_digit()),
        None => true,
    }
}

fn valid_escapes(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.iter().enumerate().all(|(idx, b)| {
        *b != b'%'
            || (bytes.get(idx + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(idx + 2).is_some_and(u8::is_ascii_hexdigit))
    })
}

fn path_text(url_path: &str, filename: &str) -> String {
    let decoded_name = percent_decode_str(filename).decode_utf8_lossy();
    let trimmed = url_path
        .strip_suffix(&format!("{decoded_name}.gif"))
        .unwrap_or(url_path);
    trimmed
        .split('/')
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LINE: &str = "20031224055733/http://geocities.com/+estranged+/sam.gif MA2RY6GRLVEBI5AJ5EUGLQUEECB3GS3V 72 72 20091027012515/http://geocities.com/+estranged+/";

    #[test]
    fn parses_full_line() {
        let entry = parse_line(1, LINE).expect("parse");
        assert_eq!(entry.checksum, "MA2RY6GRLVEBI5AJ5EUGLQUEECB3GS3V");
        assert_eq!((entry.width, entry.height), (72, 72));
        assert_eq!(
            entry.use_,
            Use {
                url: "http://geocities.com/+estranged+/sam.gif".to_string(),
                timestamp: "20031224055733".to_string(),
                page: Some(Page {
                    url: "http://geocities.com/+estranged+/".to_string(),
                    timestamp: "20091027012515".to_string(),
                }),
                alt: String::new(),
                path: "+estranged+".to_string(),
                filename: "sam".to_string(),
            }
        );
        assert_eq!(
            entry.key(),
            "20031224055733/http://geocities.com/+estranged+/sam.gif"
        );
    }

    #[test]
    fn sentinel_page_is_absent() {
        let line = "20031224055733/http://geocities.com/a/sam.gif CK 1 2 -/-";
        let entry = parse_line(1, line).expect("parse");
        assert_eq!(entry.use_.page, None);
    }

    #[test]
    fn nested_path_becomes_space_separated_text() {
        let line = "20010101000000/http://geocities.com/Area51/Vault/1234/dancing.baby.gif CK 10 20 -/-";
        let entry = parse_line(1, line).expect("parse");
        assert_eq!(entry.use_.filename, "dancing");
        // only a `<filename>.gif` suffix is stripped
        assert_eq!(entry.use_.path, "Area51 Vault 1234 dancing.baby.gif");

        let line = "20010101000000/http://geocities.com/Area51//Vault/1234/baby.gif CK 10 20 -/-";
        let entry = parse_line(1, line).expect("parse");
        assert_eq!(entry.use_.path, "Area51 Vault 1234");
    }

    #[test]
    fn rejects_non_numeric_width() {
        let line = "20031224055733/http://geocities.com/a/sam.gif CK wide 72 -/-";
        let err = parse_line(9, line).expect_err("bad width");
        assert_eq!(err.field(), Some(ManifestField::Width));
        assert_eq!(err.to_string(), "malformed manifest line 9: bad width 'wide'");
    }

    #[test]
    fn rejects_non_numeric_height() {
        let line = "20031224055733/http://geocities.com/a/sam.gif CK 72 tall -/-";
        let err = parse_line(1, line).expect_err("bad height");
        assert_eq!(err.field(), Some(ManifestField::Height));
    }

    #[test]
    fn rejects_unsplittable_use() {
        let line = "20031224055733 CK 72 72 -/-";
        let err = parse_line(1, line).expect_err("bad use");
        assert_eq!(err.field(), Some(ManifestField::Use));
    }

    #[test]
    fn rejects_unparseable_url() {
        let line = "20031224055733/not a url CK 72 72 -/-";
        // the space splits the url, so the field count is wrong first
        let err = parse_line(1, line).expect_err("bad count");
        assert_eq!(err.field(), Some(ManifestField::FieldCount));

        let line = "20031224055733/http://geocities.com/a%zz/sam.gif CK 72 72 -/-";
        let err = parse_line(1, line).expect_err("broken escape");
        assert_eq!(err.field(), Some(ManifestField::Url));

        let line = "20031224055733/http://geocities.com:http/a/sam.gif CK 72 72 -/-";
        let err = parse_line(1, line).expect_err("non-numeric port");
        assert_eq!(err.field(), Some(ManifestField::Url));
    }

    #[test]
    fn path_text_is_percent_decoded() {
        let line = "20010101000000/http://geocities.com/%7Ejoe/My%20Pics/sam.gif CK 1 1 -/-";
        let entry = parse_line(1, line).expect("parse");
        assert_eq!(entry.use_.filename, "sam");
        assert_eq!(entry.use_.path, "~joe My Pics");

        let line = "20010101000000/http://geocities.com/a/My%20Cat.gif?x=1 CK 1 1 -/-";
        let entry = parse_line(1, line).expect("parse");
        assert_eq!(entry.use_.filename, "My%20Cat");
        assert_eq!(entry.use_.path, "a");
    }

    #[test]
    fn non_ascii_filename_is_stripped_from_path() {
        let line = "20010101000000/http://geocities.com/Área/café.gif CK 1 1 -/-";
        let entry = parse_line(1, line).expect("parse");
        assert_eq!(entry.use_.filename, "café");
        assert_eq!(entry.use_.path, "Área");
    }

    #[test]
    fn lenient_about_ports_and_relative_urls() {
        let line = "20010101000000/http://geocities.com:99999/a/sam.gif CK 1 1 -/-";
        let entry = parse_line(1, line).expect("out-of-range port");
        assert_eq!(entry.use_.path, "a");

        let line = "20010101000000/geocities.com/a/sam.gif CK 1 1 -/-";
        let entry = parse_line(1, line).expect("relative reference");
        assert_eq!(entry.use_.path, "geocities.com a");
    }

    #[test]
    fn rejects_malformed_page() {
        let line = "20031224055733/http://geocities.com/a/sam.gif CK 72 72 nopage";
        let err = parse_line(1, line).expect_err("bad page");
        assert_eq!(err.field(), Some(ManifestField::Page));
    }
}
