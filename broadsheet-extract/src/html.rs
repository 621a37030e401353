//! Synchronous DOM helpers shared by the strategies.
//!
//! `scraper` documents are not `Send`, so every function here takes the raw
//! HTML string and finishes before the caller's next await point.
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static P_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));
static A_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static CANDIDATE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article, main, section, div").expect("valid selector"));

/// id/class fragments that mark chrome rather than article content.
const NEGATIVE_HINTS: &[&str] = &[
    "nav", "menu", "footer", "header", "sidebar", "comment", "promo", "subscribe", "related",
    "share", "social", "breadcrumb",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorApplyError {
    Invalid(String),
    NoMatch,
}

impl std::fmt::Display for SelectorApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorApplyError::Invalid(e) => write!(f, "invalid selector: {e}"),
            SelectorApplyError::NoMatch => f.write_str("selector matched nothing"),
        }
    }
}

/// Apply a CSS selector to a page and return the matched region's text.
pub fn apply_selector(html: &str, selector: &str) -> Result<String, SelectorApplyError> {
    let parsed =
        Selector::parse(selector).map_err(|e| SelectorApplyError::Invalid(e.to_string()))?;
    let document = Html::parse_document(html);

    let mut blocks = Vec::new();
    for element in document.select(&parsed) {
        let text = element_text(element);
        if !text.is_empty() {
            blocks.push(text);
        }
    }
    if blocks.is_empty() {
        return Err(SelectorApplyError::NoMatch);
    }
    Ok(blocks.join("\n\n"))
}

/// Boilerplate-removal heuristic: score candidate containers by paragraph
/// text mass against link mass and pick the densest one.
///
/// Returns `None` when the page has no plausible article region at all.
pub fn extract_readable(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let mut best: Option<(f64, String)> = None;
    for candidate in document.select(&CANDIDATE_SELECTOR) {
        if has_negative_hint(candidate) {
            continue;
        }

        let paragraphs: Vec<String> = candidate
            .select(&P_SELECTOR)
            .map(|p| squash(p.text()))
            .filter(|t| t.len() > 40)
            .collect();
        if paragraphs.is_empty() {
            continue;
        }

        let text_len: usize = paragraphs.iter().map(String::len).sum();
        let link_len: usize = candidate
            .select(&A_SELECTOR)
            .map(|a| squash(a.text()).len())
            .sum();

        let weight = match candidate.value().name() {
            "article" | "main" => 1.5,
            "section" => 1.2,
            _ => 1.0,
        };
        let score = (text_len as f64 - 2.0 * link_len as f64) * weight;
        if score <= 0.0 {
            continue;
        }

        if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, paragraphs.join("\n\n")));
        }
    }

    best.map(|(_, text)| text)
}

/// Structural skeleton of the page: tags, ids, and classes without any text,
/// capped at `max_len` bytes. This is what gets sent to the synthesis model.
pub fn page_skeleton(html: &str, max_len: usize) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    write_skeleton(document.root_element(), 0, &mut out, max_len);
    out
}

fn write_skeleton(element: ElementRef, depth: usize, out: &mut String, max_len: usize) {
    if out.len() >= max_len {
        return;
    }
    let value = element.value();
    let name = value.name();
    if matches!(name, "script" | "style" | "svg" | "noscript" | "link" | "meta" | "template") {
        return;
    }

    for _ in 0..depth.min(12) {
        out.push(' ');
    }
    out.push('<');
    out.push_str(name);
    if let Some(id) = value.attr("id") {
        out.push_str(" id=\"");
        out.push_str(id);
        out.push('"');
    }
    if let Some(class) = value.attr("class") {
        out.push_str(" class=\"");
        out.push_str(class);
        out.push('"');
    }
    out.push_str(">\n");

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            write_skeleton(child_element, depth + 1, out, max_len);
        }
    }
}

fn element_text(element: ElementRef) -> String {
    let paragraphs: Vec<String> = element
        .select(&P_SELECTOR)
        .map(|p| squash(p.text()))
        .filter(|t| !t.is_empty())
        .collect();
    if paragraphs.is_empty() {
        squash(element.text())
    } else {
        paragraphs.join("\n\n")
    }
}

fn has_negative_hint(element: ElementRef) -> bool {
    let value = element.value();
    let mut hints = String::new();
    if let Some(id) = value.attr("id") {
        hints.push_str(&id.to_ascii_lowercase());
    }
    if let Some(class) = value.attr("class") {
        hints.push(' ');
        hints.push_str(&class.to_ascii_lowercase());
    }
    NEGATIVE_HINTS.iter().any(|h| hints.contains(h))
}

fn squash<'a>(text: impl Iterator<Item = &'a str>) -> String {
    text.collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="site-nav"><a href="/a">Politics</a><a href="/b">Sports</a><a href="/c">Weather</a></div>
          <article id="story">
            <p>The city council voted on Tuesday night to approve the riverfront redevelopment plan after months of contentious public hearings and debate.</p>
            <p>Supporters argued the project would bring thousands of construction jobs to the region and revitalize a long-neglected stretch of the waterfront district.</p>
            <p>Opponents countered that the plan displaces longtime residents and hands public land to private developers without adequate community oversight provisions.</p>
          </article>
          <div class="footer-links"><a href="/about">About</a><a href="/contact">Contact</a></div>
        </body></html>
    "#;

    #[test]
    fn readable_extraction_picks_the_article() {
        let text = extract_readable(PAGE).unwrap();
        assert!(text.contains("city council voted"));
        assert!(!text.contains("Politics"));
        assert!(!text.contains("Contact"));
    }

    #[test]
    fn selector_application_returns_matched_text() {
        let text = apply_selector(PAGE, "#story").unwrap();
        assert!(text.contains("riverfront redevelopment"));
        assert!(text.contains("\n\n"));
    }

    #[test]
    fn bad_selector_is_invalid_not_panic() {
        assert!(matches!(
            apply_selector(PAGE, "!!!"),
            Err(SelectorApplyError::Invalid(_))
        ));
    }

    #[test]
    fn missing_region_reports_no_match() {
        assert_eq!(
            apply_selector(PAGE, "#does-not-exist"),
            Err(SelectorApplyError::NoMatch)
        );
    }

    #[test]
    fn skeleton_has_structure_but_no_text() {
        let skeleton = page_skeleton(PAGE, 10_000);
        assert!(skeleton.contains("id=\"story\""));
        assert!(skeleton.contains("class=\"site-nav\""));
        assert!(!skeleton.contains("city council"));
    }

    #[test]
    fn skeleton_respects_size_cap() {
        let skeleton = page_skeleton(PAGE, 64);
        assert!(skeleton.len() <= 64 + 128); // one element may straddle the cap
    }
}
