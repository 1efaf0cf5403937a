//! HTML text extraction with a main-content heuristic

use once_cell::sync::Lazy;
use scraper::{node::Node, ElementRef, Html, Selector};
use std::borrow::Cow;
use std::collections::HashMap;

/// Never carry readable text
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Page chrome skipped inside a main-content candidate
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside", "form",
    "iframe", "button",
];

/// A candidate with less text than this is not treated as the main content
const MIN_MAIN_CHARS: usize = 25;

static SEMANTIC_MAIN: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", "main", "[role=main]", "#content", ".content", ".post", ".entry-content"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static PARAGRAPH: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("p").ok());

/// Readable text of an HTML document
///
/// Undecodable bytes are dropped and malformed markup is parsed leniently, so
/// this never fails. The main-content region is preferred; when no region is
/// found the visible text of the whole page is used.
pub fn extract_html(data: &[u8]) -> String {
    let html = decode_dropping_invalid(data);
    let document = Html::parse_document(&html);

    match main_content(&document) {
        Some(text) => text,
        None => {
            tracing::debug!("No main content region found, using full page text");
            let mut parts = Vec::new();
            collect_text(document.root_element(), INVISIBLE_TAGS, &mut parts);
            parts.join(" ")
        }
    }
}

/// UTF-8 decode that skips invalid byte sequences; text already in the input is kept as is
fn decode_dropping_invalid(mut data: &[u8]) -> Cow<'_, str> {
    let mut decoded = match std::str::from_utf8(data) {
        Ok(text) => return Cow::Borrowed(text),
        Err(_) => String::with_capacity(data.len()),
    };

    loop {
        match std::str::from_utf8(data) {
            Ok(text) => {
                decoded.push_str(text);
                return Cow::Owned(decoded);
            }
            Err(e) => {
                let (valid, rest) = data.split_at(e.valid_up_to());
                // valid_up_to bounds a valid prefix
                decoded.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => data = &rest[len..],
                    // Truncated sequence at the end
                    None => return Cow::Owned(decoded),
                }
            }
        }
    }
}

fn main_content(document: &Html) -> Option<String> {
    for selector in SEMANTIC_MAIN.iter() {
        let best = document
            .select(selector)
            .map(|el| element_text(el, BOILERPLATE_TAGS))
            .max_by_key(|text| text.chars().count());

        if let Some(text) = best.filter(|t| t.chars().count() >= MIN_MAIN_CHARS) {
            return Some(text);
        }
    }

    densest_paragraph_block(document)
}

/// Parent element holding the most paragraph text
fn densest_paragraph_block(document: &Html) -> Option<String> {
    let paragraph = PARAGRAPH.as_ref()?;
    let mut scores: HashMap<_, (ElementRef<'_>, usize)> = HashMap::new();

    for p in document.select(paragraph) {
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let len = element_text(p, BOILERPLATE_TAGS).chars().count();
        scores.entry(parent.id()).or_insert((parent, 0)).1 += len;
    }

    let (block, score) = scores.into_values().max_by_key(|(_, score)| *score)?;
    if score < MIN_MAIN_CHARS {
        return None;
    }
    Some(element_text(block, BOILERPLATE_TAGS))
}

fn element_text(element: ElementRef<'_>, skip: &[&str]) -> String {
    let mut parts = Vec::new();
    collect_text(element, skip, &mut parts);
    parts.join(" ")
}

fn collect_text(element: ElementRef<'_>, skip: &[&str], out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if !skip.contains(&child_element.value().name()) {
                collect_text(child_element, skip, out);
            }
        } else if let Node::Text(text) = child.value() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_article_over_chrome() {
        let html = br#"<html><head><title>Site</title></head><body>
            <nav><a href="/">Home</a> <a href="/about">About</a></nav>
            <article>
              <h1>Quarterly results</h1>
              <p>Revenue grew in every region this quarter.</p>
              <aside>Related: older posts</aside>
            </article>
            <footer>Copyright 2024</footer>
        </body></html>"#;

        let text = extract_html(html);

        assert!(text.contains("Quarterly results"));
        assert!(text.contains("Revenue grew in every region"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("Related"));
    }

    #[test]
    fn test_paragraph_density_without_semantic_tags() {
        let html = br#"<body>
            <div class="menu"><p>Menu</p></div>
            <div class="story">
              <p>The first paragraph carries most of the story.</p>
              <p>The second paragraph continues it at length.</p>
            </div>
        </body>"#;

        let text = extract_html(html);

        assert!(text.starts_with("The first paragraph"));
        assert!(!text.contains("Menu"));
    }

    #[test]
    fn test_falls_back_to_visible_text() {
        let html = b"<html><body><div>Short</div><span>bits</span>\
            <script>var hidden = 1;</script><style>p{}</style></body></html>";

        let text = extract_html(html);

        assert_eq!(text, "Short bits");
    }

    #[test]
    fn test_malformed_markup_and_bad_bytes() {
        let mut html = b"<div><p>Unclosed <b>bold <i>text".to_vec();
        html.extend_from_slice(&[0xff, 0xfe]);
        html.extend_from_slice(b" tail</div></span>");

        let text = extract_html(&html);

        assert!(text.contains("Unclosed"));
        assert!(text.contains("tail"));
        assert!(!text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_literal_replacement_character_survives() {
        let mut html = "<p>Glyph \u{FFFD} kept</p>".as_bytes().to_vec();
        html.extend_from_slice(&[0xc3]);
        html.extend_from_slice(b"<p>after</p>");
        html.push(0xe2);

        let text = extract_html(&html);

        assert_eq!(text, "Glyph \u{FFFD} kept after");
    }

    #[test]
    fn test_decode_skips_only_invalid_sequences() {
        assert_eq!(decode_dropping_invalid(b"plain"), "plain");
        assert!(matches!(decode_dropping_invalid(b"plain"), Cow::Borrowed(_)));
        assert_eq!(decode_dropping_invalid(b"a\xffb\xc3\xa9c\xf0\x9f"), "ab\u{e9}c");
        assert_eq!(decode_dropping_invalid("x\u{FFFD}".as_bytes()), "x\u{FFFD}");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(extract_html(b""), "");
        assert_eq!(extract_html(b"<html><body>   </body></html>"), "");
    }
}
