//! Extract `src`/`alt` pairs for GIF images from archived HTML.
//!
//! Archived GeoCities markup is frequently broken, so the extractor relies on
//! html5ever's error recovery (via `scraper`) rather than exact tag matching.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// One GIF reference with its alt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GifImage {
    /// Raw `src` attribute, unresolved.
    pub src: String,
    /// Whitespace-normalized `alt` attribute.
    pub alt: String,
}

/// Finds `<img>` tags that mention `.gif` and carry an `alt` attribute.
///
/// Tags where both `src` and `alt` come out empty are skipped.
///
/// # Example
///
/// ```
/// use gif_alt::find_gif_images;
///
/// let html = r#"<p><IMG SRC="/pics/cat.GIF" ALT="my  cat"><img src="dog.gif"></p>"#;
/// let images = find_gif_images(html);
/// assert_eq!(images.len(), 1);
/// assert_eq!(images[0].src, "/pics/cat.GIF");
/// assert_eq!(images[0].alt, "my cat");
/// ```
pub fn find_gif_images(html: &str) -> Vec<GifImage> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img[alt]").expect("valid selector for img tags");
    fragment
        .select(&selector)
        .filter(mentions_gif)
        .filter_map(|element| {
            let src = element.value().attr("src").unwrap_or_default().trim();
            let alt = normalize_whitespace(element.value().attr("alt").unwrap_or_default());
            if src.is_empty() && alt.is_empty() {
                return None;
            }
            Some(GifImage {
                src: src.to_string(),
                alt,
            })
        })
        .collect()
}

fn mentions_gif(element: &ElementRef<'_>) -> bool {
    element
        .value()
        .attrs()
        .any(|(_, value)| value.to_ascii_lowercase().contains(".gif"))
}

fn normalize_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{find_gif_images, GifImage};
    use pretty_assertions::assert_eq;

    fn image(src: &str, alt: &str) -> GifImage {
        GifImage {
            src: src.to_string(),
            alt: alt.to_string(),
        }
    }

    #[test]
    fn extracts_double_and_single_quoted_attributes() {
        let html = r#"
        <body>
          <img src="under_construction.gif" alt="Under Construction!">
          <img alt='fabulous " muscles' src='/muscles.gif'>
          <img src="photo.jpg" alt="not a gif">
        </body>
        "#;

        assert_eq!(
            find_gif_images(html),
            vec![
                image("under_construction.gif", "Under Construction!"),
                image("/muscles.gif", "fabulous \" muscles"),
            ]
        );
    }

    #[test]
    fn requires_alt_attribute() {
        let html = r#"<img src="flame.gif"><img src="flame.gif" alt="">"#;
        assert_eq!(find_gif_images(html), vec![image("flame.gif", "")]);
    }

    #[test]
    fn gif_mention_may_live_in_other_attributes() {
        let html = r#"<img lowsrc="spacer.gif" src="banner" alt="banner">"#;
        assert_eq!(find_gif_images(html), vec![image("banner", "banner")]);
    }

    #[test]
    fn skips_tags_with_nothing_to_report() {
        let html = r#"<img data-x=".gif" alt="  ">"#;
        assert!(find_gif_images(html).is_empty());
    }

    #[test]
    fn survives_unclosed_markup() {
        let html = r#"<table><tr><td><img src="mail.gif" alt="email me"<td>more"#;
        let images = find_gif_images(html);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].src, "mail.gif");
    }

    #[test]
    fn serializes_with_capitalized_keys() {
        let json = serde_json::to_string(&image("a.gif", "hi")).expect("serialize");
        assert_eq!(json, r#"{"Src":"a.gif","Alt":"hi"}"#);
    }
}
