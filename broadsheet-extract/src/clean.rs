//! Text normalization and fingerprinting.
//!
//! `clean` is idempotent: cleaning already-clean text returns it unchanged,
//! so downstream stages can re-run it safely.
use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Lines at most this many words are candidates for boilerplate trimming.
const BOILERPLATE_LINE_MAX_WORDS: usize = 6;

/// Normalize extracted text: strip residual markup, collapse whitespace,
/// drop duplicated leading/trailing boilerplate lines.
pub fn clean(raw: &str) -> String {
    let stripped = TAG_RE.replace_all(raw, " ");

    // Collapse intra-line whitespace; fold blank-line runs into one break.
    let mut lines: Vec<String> = Vec::new();
    let mut last_blank = true; // suppress leading blanks
    for line in stripped.lines() {
        let squashed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if squashed.is_empty() {
            if !last_blank {
                lines.push(String::new());
                last_blank = true;
            }
        } else {
            lines.push(squashed);
            last_blank = false;
        }
    }
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }

    // Consecutive duplicate lines are extraction artifacts.
    lines.dedup();

    // Short lines that repeat elsewhere in the document are site chrome that
    // got glued to the head or tail of the article.
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for line in &lines {
        *counts.entry(line.clone()).or_default() += 1;
    }
    let is_chrome = |line: &String| {
        !line.is_empty()
            && line.split_whitespace().count() <= BOILERPLATE_LINE_MAX_WORDS
            && counts.get(line).copied().unwrap_or(0) >= 2
    };
    while lines.first().map(&is_chrome).unwrap_or(false) {
        lines.remove(0);
    }
    while lines.last().map(&is_chrome).unwrap_or(false) {
        lines.pop();
    }
    while lines.first().map(|l| l.is_empty()).unwrap_or(false) {
        lines.remove(0);
    }
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }

    lines.join("\n")
}

/// Content fingerprint for downstream deduplication.
pub fn fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_is_idempotent() {
        let messy = "  Top Stories \n\n\nThe   mayor <b>announced</b> a new\u{a0}budget today.\n\n\nMore details followed in the evening session.\n Top Stories \n";
        let once = clean(messy);
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn strips_residual_markup() {
        let got = clean("The <em>plan</em> passed <span class=\"x\">narrowly</span>.");
        assert_eq!(got, "The plan passed narrowly.");
    }

    #[test]
    fn collapses_blank_runs() {
        let got = clean("para one\n\n\n\npara two");
        assert_eq!(got, "para one\n\npara two");
    }

    #[test]
    fn trims_duplicated_chrome_lines() {
        let got = clean("Site Menu\nA long opening paragraph about the storm response effort.\nSite Menu");
        assert_eq!(
            got,
            "A long opening paragraph about the storm response effort."
        );
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }

    #[test]
    fn counts_words() {
        assert_eq!(word_count("one  two\nthree"), 3);
    }
}
