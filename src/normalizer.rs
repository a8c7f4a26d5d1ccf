// src/normalizer.rs
// Pure text normalization: raw subject/body -> canonical text (spec §4.1).

use crate::error::CoreError;
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_CANONICAL_LEN: usize = 10_500;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap());
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn scrub(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let no_tags = HTML_TAG.replace_all(&decoded, " ");
    let no_urls = URL_PATTERN.replace_all(&no_tags, "<URL>");
    let no_emails = EMAIL_PATTERN.replace_all(&no_urls, "<EMAIL>");
    let collapsed = WHITESPACE.replace_all(&no_emails, " ");
    collapsed.trim().to_string()
}

/// The output of normalization. `full` is the single canonical string spec
/// §4.1 describes (`subject + "\n" + body`, scrubbed, bounded). `subject`
/// and `body` are the same scrubbing applied to each half individually and
/// are kept only so backends that care about provenance within the
/// document (the category keyword scorer's subject/body weighting, spec
/// §4.2) don't need to re-derive it by guessing at a boundary inside
/// `full` — every predictor that doesn't need that distinction uses `full`
/// exclusively and is oblivious to this split.
#[derive(Debug, Clone)]
pub struct CanonicalText {
    pub full: String,
    pub subject: String,
    pub body: String,
}

impl CanonicalText {
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

/// Normalizes a raw subject/body pair into canonical text (spec §4.1).
/// Deterministic, pure, side-effect free.
pub fn normalize(subject: &str, body: &str) -> Result<CanonicalText, CoreError> {
    let subject_scrubbed = scrub(subject);
    let body_scrubbed = scrub(body);

    let full_raw = if subject_scrubbed.is_empty() {
        body_scrubbed.clone()
    } else if body_scrubbed.is_empty() {
        subject_scrubbed.clone()
    } else {
        format!("{} {}", subject_scrubbed, body_scrubbed)
    };

    if full_raw.is_empty() {
        return Err(CoreError::invalid_input(
            "subject and body are both empty after normalization",
        ));
    }

    let full: String = full_raw.chars().take(MAX_CANONICAL_LEN).collect();

    Ok(CanonicalText {
        full,
        subject: subject_scrubbed,
        body: body_scrubbed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases_nothing_itself() {
        let text = normalize("Hello   World", "  Line one\n\nLine two  ").unwrap();
        assert_eq!(text.full, "Hello World Line one Line two");
    }

    #[test]
    fn strips_html_tags() {
        let text = normalize("subj", "<b>bold</b> and <i>italic</i> text").unwrap();
        assert_eq!(text.full, "subj bold and italic text");
    }

    #[test]
    fn masks_urls_and_emails() {
        let text = normalize(
            "subj",
            "visit https://example.com/path or www.example.org, or email me at a.b@example.com",
        )
        .unwrap();
        assert!(text.full.contains("<URL>"));
        assert!(text.full.contains("<EMAIL>"));
        assert!(!text.full.contains("example.com"));
    }

    #[test]
    fn rejects_empty_input() {
        let err = normalize("   ", "\n\t").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn truncates_to_upper_bound() {
        let body = "x".repeat(20_000);
        let text = normalize("s", &body).unwrap();
        assert_eq!(text.full.chars().count(), MAX_CANONICAL_LEN);
    }

    #[test]
    fn preserves_subject_body_split_for_weighting() {
        let text = normalize("urgent issue", "please help").unwrap();
        assert_eq!(text.subject, "urgent issue");
        assert_eq!(text.body, "please help");
    }
}
