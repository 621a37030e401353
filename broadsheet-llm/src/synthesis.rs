//! Selector synthesis: ask a model for a CSS selector that isolates the
//! article body, given only the page's structural skeleton.
//!
//! The skeleton (tags, ids, and classes, no text) is built by the caller so that
//! article content never leaves the process. The model must answer with
//! strict JSON; a null selector or unusable answer is a typed refusal, not an
//! error, so the cascade can skip straight to the archival fallback.

use crate::traits::{LlmClient, LlmError};
use regex::Regex;

const SELECTOR_SYSTEM_PROMPT: &str = r#"
Your task is to analyze the provided HTML structure and return a CSS selector
for the main article body region.
Your response must be a single JSON object with two keys, "selector" and "reason".
If a suitable selector exists, "selector" must be the CSS selector string; prefer
stable ids and semantic classes over positional selectors.
If no selector can isolate the article body, "selector" must be null and "reason"
must briefly say why.
Do not provide any other text, explanation, or markdown.
"#;

/// Outcome of one synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorProposal {
    Selector(String),
    /// The model declined or produced nothing usable.
    Refusal(String),
}

/// Ask the model to propose a selector for the given page skeleton.
pub async fn propose_selector(
    llm: &dyn LlmClient,
    skeleton: &str,
) -> Result<SelectorProposal, LlmError> {
    let prompt = serde_json::to_string(&serde_json::json!({
        "task": "analyze_structure_for_selector",
        "query": "the main article body text of a news story",
        "html_skeleton": skeleton,
    }))
    .map_err(|e| LlmError::Api(format!("prompt encode failed: {e}")))?;

    let response = llm
        .generate(&prompt, Some(SELECTOR_SYSTEM_PROMPT), Some(500), Some(0.0))
        .await?;

    Ok(parse_proposal(&response.text))
}

fn parse_proposal(raw: &str) -> SelectorProposal {
    let json = extract_json_block(raw).unwrap_or_else(|| raw.trim().to_string());
    let val: serde_json::Value = match serde_json::from_str(&json) {
        Ok(v) => v,
        Err(e) => return SelectorProposal::Refusal(format!("unparseable answer: {e}")),
    };

    let reason = val
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or("no reason given")
        .to_string();

    match val.get("selector").and_then(|s| s.as_str()) {
        Some(sel) if usable_selector(sel) => SelectorProposal::Selector(sel.trim().to_string()),
        Some(sel) => SelectorProposal::Refusal(format!("unusable selector {sel:?}: {reason}")),
        None => SelectorProposal::Refusal(reason),
    }
}

/// Cheap plausibility gate; real CSS validation happens when the selector is
/// applied to a document.
fn usable_selector(sel: &str) -> bool {
    let sel = sel.trim();
    !sel.is_empty() && sel.len() <= 256 && !sel.contains('\n') && !sel.contains('{')
}

/// Try to extract a ```json ... ``` fenced block; fall back to the first
/// top-level object.
fn extract_json_block(text: &str) -> Option<String> {
    let re_fence = Regex::new("(?s)```json\\s*(\\{.*?\\})\\s*```").ok()?;
    if let Some(caps) = re_fence.captures(text) {
        return Some(caps.get(1)?.as_str().to_string());
    }
    let re_plain = Regex::new("(?s)(\\{.*\\})").ok()?;
    re_plain
        .captures(text)
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_selector() {
        let got = parse_proposal(r#"{"selector": "article .story-body", "reason": "ok"}"#);
        assert_eq!(
            got,
            SelectorProposal::Selector("article .story-body".to_string())
        );
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"selector\": \"#content\", \"reason\": \"id is stable\"}\n```";
        assert_eq!(
            parse_proposal(raw),
            SelectorProposal::Selector("#content".to_string())
        );
    }

    #[test]
    fn null_selector_is_refusal() {
        let got = parse_proposal(r#"{"selector": null, "reason": "page is a login form"}"#);
        assert!(matches!(got, SelectorProposal::Refusal(reason) if reason.contains("login form")));
    }

    #[test]
    fn garbage_is_refusal_not_error() {
        assert!(matches!(
            parse_proposal("I cannot help with that."),
            SelectorProposal::Refusal(_)
        ));
    }

    #[test]
    fn rejects_css_block_masquerading_as_selector() {
        let got = parse_proposal(r#"{"selector": "article { color: red }"}"#);
        assert!(matches!(got, SelectorProposal::Refusal(_)));
    }
}
