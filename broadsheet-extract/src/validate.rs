//! Multi-signal content validation.
//!
//! Pure functions over text plus lightweight metadata: validation never
//! touches the cache or session state, and identical input always yields the
//! same outcome.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Marker phrases that show up on subscription prompts instead of articles.
const PAYWALL_MARKERS: &[&str] = &[
    "subscribe to continue",
    "subscribe now to read",
    "subscription required",
    "sign in to continue reading",
    "create a free account to continue",
    "already a subscriber",
    "this article is for subscribers",
    "to enjoy unlimited access",
    "please enable javascript and cookies",
];

/// Lines this short are navigation, bylines, or section labels, not prose.
const NAV_LINE_MAX_WORDS: usize = 4;
/// Above this share of nav-like lines the "content" is a menu, not a story.
const NAV_LINE_RATIO: f64 = 0.6;
/// Below this unique-word ratio the text is a repeated site template.
const UNIQUE_WORD_FLOOR: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Ok,
    TooShort,
    PaywallDetected,
    BoilerplateOnly,
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationOutcome::Ok => "ok",
            ValidationOutcome::TooShort => "too_short",
            ValidationOutcome::PaywallDetected => "paywall_detected",
            ValidationOutcome::BoilerplateOnly => "boilerplate_only",
        };
        f.write_str(name)
    }
}

impl ValidationOutcome {
    /// Failures that suggest the page withheld content from an anonymous
    /// reader; these are the ones worth an authenticated retry.
    pub fn suggests_paywall(&self) -> bool {
        matches!(
            self,
            ValidationOutcome::PaywallDetected | ValidationOutcome::TooShort
        )
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    pub min_word_count: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            min_word_count: 120,
        }
    }
}

impl Validator {
    pub fn new(min_word_count: usize) -> Self {
        Self { min_word_count }
    }

    pub fn validate(&self, text: &str) -> ValidationOutcome {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() < self.min_word_count {
            return ValidationOutcome::TooShort;
        }

        let lower = text.to_lowercase();
        if PAYWALL_MARKERS.iter().any(|m| lower.contains(m)) {
            return ValidationOutcome::PaywallDetected;
        }

        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() >= 8 {
            let nav_like = lines
                .iter()
                .filter(|l| l.split_whitespace().count() <= NAV_LINE_MAX_WORDS)
                .count();
            if nav_like as f64 / lines.len() as f64 > NAV_LINE_RATIO {
                return ValidationOutcome::PaywallDetected;
            }
        }

        let unique: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
        if (unique.len() as f64) / (words.len() as f64) < UNIQUE_WORD_FLOOR {
            return ValidationOutcome::BoilerplateOnly;
        }

        ValidationOutcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(words: usize) -> String {
        // Varied vocabulary so the unique-word ratio stays realistic.
        (0..words)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn long_varied_text_passes() {
        let v = Validator::default();
        assert_eq!(v.validate(&prose(1200)), ValidationOutcome::Ok);
    }

    #[test]
    fn short_text_is_too_short() {
        let v = Validator::default();
        assert_eq!(v.validate(&prose(40)), ValidationOutcome::TooShort);
    }

    #[test]
    fn marker_phrase_means_paywall() {
        let v = Validator::default();
        let text = format!("{} Already a subscriber? Sign in here.", prose(300));
        assert_eq!(v.validate(&text), ValidationOutcome::PaywallDetected);
    }

    #[test]
    fn navigation_dump_means_paywall() {
        let v = Validator::new(20);
        let text = (0..30)
            .map(|i| format!("Section {i}\n"))
            .collect::<String>();
        assert_eq!(v.validate(&text), ValidationOutcome::PaywallDetected);
    }

    #[test]
    fn repeated_template_is_boilerplate() {
        let v = Validator::default();
        let text = "breaking news latest updates ".repeat(100);
        assert_eq!(v.validate(&text), ValidationOutcome::BoilerplateOnly);
    }

    #[test]
    fn validation_is_deterministic() {
        let v = Validator::default();
        let text = format!("{} subscribe to continue", prose(500));
        assert_eq!(v.validate(&text), v.validate(&text));
    }

    #[test]
    fn too_short_wins_over_other_signals() {
        // Scenario: a 40-word subscription prompt reports too_short, which
        // still counts as a paywall suggestion for the retry rule.
        let v = Validator::default();
        let outcome = v.validate("subscribe to continue reading this story");
        assert_eq!(outcome, ValidationOutcome::TooShort);
        assert!(outcome.suggests_paywall());
    }
}
