// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Input validation and sanitization
//
// Responsibilities:
// - Normalize raw user text: trim, strip ASCII control characters,
//   collapse whitespace runs, truncate to the configured maximum
// - Reject empty input after sanitization
// - Scan sanitized text against the unsafe-content patterns; on a
//   match, reject and return the text with the match stripped so the
//   caller can show a cleaned value without resubmission risk
//
// Pure: no I/O, no shared mutable state, safe to call concurrently.

use regex::Regex;

/// Default maximum message length in characters. Truncation is applied
/// before the empty check, so length alone never rejects.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Outcome of validating one raw user message.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub is_valid: bool,
    /// Normalized text; on an unsafe-pattern rejection this has the
    /// matched pattern stripped out.
    pub sanitized: String,
    /// Human-readable reason when `is_valid` is false.
    pub error: Option<String>,
}

impl Validation {
    fn ok(sanitized: String) -> Self {
        Self {
            is_valid: true,
            sanitized,
            error: None,
        }
    }

    fn rejected(sanitized: String, reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            sanitized,
            error: Some(reason.into()),
        }
    }
}

/// Validates and sanitizes user input before it may trigger generation.
///
/// Constructed once and injected wherever admission runs; holds only
/// pre-compiled patterns, so sharing an instance across tasks is free.
pub struct Validator {
    max_chars: usize,
    unsafe_patterns: Vec<Regex>,
}

impl Validator {
    pub fn new() -> Self {
        Self::with_max_chars(MAX_MESSAGE_CHARS)
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            max_chars,
            unsafe_patterns: default_unsafe_patterns(),
        }
    }

    /// Validate one raw message.
    ///
    /// Sanitization order: trim, strip control characters, collapse
    /// whitespace runs to a single space, truncate. Because truncation
    /// runs first, the only length-based rejection is the empty case.
    pub fn validate(&self, raw: &str) -> Validation {
        let sanitized = self.sanitize(raw);

        if sanitized.is_empty() {
            return Validation::rejected(sanitized, "message must not be empty");
        }

        for pattern in &self.unsafe_patterns {
            if pattern.is_match(&sanitized) {
                let cleaned = pattern.replace_all(&sanitized, "").into_owned();
                return Validation::rejected(cleaned, "message contains unsafe content");
            }
        }

        Validation::ok(sanitized)
    }

    fn sanitize(&self, raw: &str) -> String {
        let trimmed = raw.trim();

        let mut out = String::with_capacity(trimmed.len());
        let mut pending_space = false;
        for ch in trimmed.chars() {
            // ASCII control characters (0x00-0x1F, 0x7F) are dropped
            // outright, newlines and tabs included; the strip runs
            // before whitespace collapsing, so they never become
            // spaces.
            if ch.is_ascii_control() {
                continue;
            }
            if ch.is_whitespace() {
                pending_space = true;
                continue;
            }
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }

        if out.chars().count() > self.max_chars {
            out.chars().take(self.max_chars).collect()
        } else {
            out
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Patterns that make sanitized text unsafe to echo into a rendering
/// context: script elements, scheme-prefixed script references, inline
/// event-handler attributes, and html data URIs.
fn default_unsafe_patterns() -> Vec<Regex> {
    [
        r"(?is)<script\b[^>]*>.*?</script>",
        r"(?is)<script\b[^>]*>",
        r"(?i)javascript:",
        r"(?i)\bon\w+\s*=",
        r"(?i)data:text/html",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("built-in unsafe pattern must compile"))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new()
    }

    // ---------------------------------------------------------------
    // 1. Clean input passes through whitespace-normalized
    // ---------------------------------------------------------------

    #[test]
    fn clean_input_is_valid_and_normalized() {
        let v = validator();
        let result = v.validate("  Hello   world  ");
        assert!(result.is_valid);
        assert_eq!(result.sanitized, "Hello world");
        assert_eq!(result.error, None);
    }

    #[test]
    fn control_characters_are_stripped() {
        let v = validator();
        let result = v.validate("he\x00ll\x1Fo\x7F");
        assert!(result.is_valid);
        assert_eq!(result.sanitized, "hello");
    }

    #[test]
    fn newlines_and_tabs_are_stripped_not_spaced() {
        let v = validator();
        let result = v.validate("line one\n\n\tline two");
        assert!(result.is_valid);
        assert_eq!(result.sanitized, "line oneline two");
    }

    #[test]
    fn spaces_around_a_newline_still_collapse() {
        let v = validator();
        let result = v.validate("line one \n line two");
        assert!(result.is_valid);
        assert_eq!(result.sanitized, "line one line two");
    }

    // ---------------------------------------------------------------
    // 2. Empty after sanitization is rejected
    // ---------------------------------------------------------------

    #[test]
    fn empty_input_rejected() {
        let v = validator();
        let result = v.validate("");
        assert!(!result.is_valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn whitespace_only_input_rejected() {
        let v = validator();
        let result = v.validate("   \n\t  ");
        assert!(!result.is_valid);
        assert_eq!(result.sanitized, "");
    }

    #[test]
    fn control_chars_only_input_rejected() {
        let v = validator();
        let result = v.validate("\x01\x02\x03");
        assert!(!result.is_valid);
    }

    // ---------------------------------------------------------------
    // 3. Truncation runs before the length check
    // ---------------------------------------------------------------

    #[test]
    fn over_long_input_truncated_not_rejected() {
        let v = validator();
        let long = "a".repeat(5000);
        let result = v.validate(&long);
        assert!(result.is_valid);
        assert_eq!(result.sanitized.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let v = Validator::with_max_chars(3);
        let result = v.validate("héllo");
        assert!(result.is_valid);
        assert_eq!(result.sanitized, "hél");
    }

    // ---------------------------------------------------------------
    // 4. Unsafe patterns rejected, with the match stripped
    // ---------------------------------------------------------------

    #[test]
    fn script_element_rejected_and_stripped() {
        let v = validator();
        let result = v.validate("before <script>alert(1)</script> after");
        assert!(!result.is_valid);
        assert!(!result.sanitized.to_lowercase().contains("<script"));
        assert!(result.sanitized.contains("before"));
        assert!(result.sanitized.contains("after"));
    }

    #[test]
    fn unterminated_script_tag_rejected() {
        let v = validator();
        let result = v.validate("look <script src=\"x\"> at this");
        assert!(!result.is_valid);
        assert!(!result.sanitized.to_lowercase().contains("<script"));
    }

    #[test]
    fn javascript_scheme_rejected() {
        let v = validator();
        let result = v.validate("click javascript:alert(1) now");
        assert!(!result.is_valid);
        assert!(!result.sanitized.to_lowercase().contains("javascript:"));
    }

    #[test]
    fn inline_event_handler_rejected() {
        let v = validator();
        let result = v.validate("img onerror=steal()");
        assert!(!result.is_valid);
        assert!(!result.sanitized.contains("onerror="));
    }

    #[test]
    fn html_data_uri_rejected() {
        let v = validator();
        let result = v.validate("open data:text/html;base64,PHNjcmlwdD4=");
        assert!(!result.is_valid);
        assert!(!result.sanitized.contains("data:text/html"));
    }

    #[test]
    fn case_variations_still_match() {
        let v = validator();
        assert!(!v.validate("<ScRiPt>x</sCrIpT>").is_valid);
        assert!(!v.validate("JAVASCRIPT:void(0)").is_valid);
    }

    // ---------------------------------------------------------------
    // 5. Benign look-alikes are not rejected
    // ---------------------------------------------------------------

    #[test]
    fn ordinary_text_about_code_is_allowed() {
        let v = validator();
        // No markup, no scheme, no attribute syntax.
        assert!(v.validate("how do I center a div in css").is_valid);
        assert!(v.validate("the word javascript by itself").is_valid);
    }

    // ---------------------------------------------------------------
    // 6. Pure: repeated calls agree
    // ---------------------------------------------------------------

    #[test]
    fn validation_is_deterministic() {
        let v = validator();
        let a = v.validate("  some   input  ");
        let b = v.validate("  some   input  ");
        assert_eq!(a, b);
    }
}
