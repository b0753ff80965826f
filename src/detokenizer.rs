//! Marker restoration for translated text
//!
//! Translated text comes back with markers in arbitrary order: word order
//! changes in the target language move protected fragments around, and a
//! provider may drop a marker altogether. Restoration is a pure
//! marker → fragment substitution, so token order never matters.
//!
//! # Example: Japanese reordering
//!
//! ```ignore
//! Tokenized:   "{0} sent {1}"
//! Translated:  "{1} を {0} が送信しました"
//! Restored:    "#general を @alice が送信しました"
//! ```

use crate::token::{NOTRANSLATE_FLAG, TokenStream};
use std::collections::HashMap;

/// Result of restoring markers in one text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetokenizeReport {
    /// Text with every known marker replaced
    pub text: String,
    /// Number of marker occurrences that were replaced
    pub restored: usize,
    /// Markers from the stream that never appeared in the text
    pub missing_markers: Vec<String>,
}

/// Replace every marker from `tokens` with its override or original fragment
///
/// Markers absent from the text are ignored; markers in the text that are
/// unknown to the stream are left as they are.
pub fn detokenize(text: &str, tokens: &TokenStream) -> String {
    detokenize_with_report(text, tokens).text
}

/// Same as `detokenize`, also reporting markers the provider dropped
pub fn detokenize_with_report(text: &str, tokens: &TokenStream) -> DetokenizeReport {
    let replacements: HashMap<&str, &str> = tokens
        .iter()
        .map(|t| (t.marker.as_str(), t.replacement()))
        .collect();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some((start, len)) = next_marker(rest) {
        let candidate = &rest[start..start + len];
        out.push_str(&rest[..start]);
        match replacements.get_key_value(candidate) {
            Some((marker, replacement)) => {
                out.push_str(replacement);
                *seen.entry(*marker).or_default() += 1;
            }
            None => out.push_str(candidate),
        }
        rest = &rest[start + len..];
    }
    out.push_str(rest);

    let missing_markers = tokens
        .iter()
        .filter(|t| !seen.contains_key(t.marker.as_str()))
        .map(|t| t.marker.clone())
        .collect();

    DetokenizeReport {
        text: out,
        restored: seen.values().sum(),
        missing_markers,
    }
}

/// Locate the next `<i class=notranslate>{N}</i>` in `text`
///
/// Returns the byte offset and length of the whole marker.
fn next_marker(text: &str) -> Option<(usize, usize)> {
    let open = format!("<i class={}>{{", NOTRANSLATE_FLAG);
    const CLOSE: &str = "}</i>";

    let mut offset = 0;
    while let Some(found) = text[offset..].find(&open) {
        let start = offset + found;
        let digits_start = start + open.len();
        let digits = text[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let close_start = digits_start + digits;
        if digits > 0 && text[close_start..].starts_with(CLOSE) {
            return Some((start, close_start + CLOSE.len() - start));
        }
        offset = digits_start;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Token, marker};

    fn stream(fragments: &[&str]) -> TokenStream {
        let mut tokens = TokenStream::new();
        for fragment in fragments {
            tokens.protect(fragment);
        }
        tokens
    }

    #[test]
    fn test_restores_all_markers() {
        let tokens = stream(&["@alice", ":smile:"]);
        let text = format!("Hi {}, {}", marker(0), marker(1));

        assert_eq!(detokenize(&text, &tokens), "Hi @alice, :smile:");
    }

    #[test]
    fn test_restores_reordered_and_repeated_markers() {
        let tokens = stream(&["@alice", "#general"]);
        let text = format!("{} を {} が送信 {}", marker(1), marker(0), marker(1));

        let report = detokenize_with_report(&text, &tokens);
        assert_eq!(report.text, "#general を @alice が送信 #general");
        assert_eq!(report.restored, 3);
        assert!(report.missing_markers.is_empty());
    }

    #[test]
    fn test_order_independent() {
        let ordered = stream(&["[", "](https://x.io)", ":x:"]);
        let reversed: TokenStream = ordered.iter().rev().cloned().collect::<Vec<Token>>().into();
        let text = format!("{}link{} {}", marker(0), marker(1), marker(2));

        assert_eq!(detokenize(&text, &ordered), detokenize(&text, &reversed));
    }

    #[test]
    fn test_dropped_marker_is_reported_not_fatal() {
        let tokens = stream(&["@alice", ":smile:"]);
        let text = format!("Bonjour {}", marker(0));

        let report = detokenize_with_report(&text, &tokens);
        assert_eq!(report.text, "Bonjour @alice");
        assert_eq!(report.missing_markers, vec![marker(1)]);
    }

    #[test]
    fn test_unknown_marker_left_untouched() {
        let tokens = stream(&["@alice"]);
        let text = format!("{} {}", marker(0), marker(7));

        assert_eq!(detokenize(&text, &tokens), format!("@alice {}", marker(7)));
    }

    #[test]
    fn test_override_wins() {
        let tokens: TokenStream =
            vec![Token::with_override(marker(0), "<code>ls</code>", "`ls`")].into();
        let text = format!("run {}", marker(0));

        assert_eq!(detokenize(&text, &tokens), "run `ls`");
    }

    #[test]
    fn test_idempotent_without_markers() {
        let tokens = stream(&["@alice"]);
        let once = detokenize(&format!("hi {}", marker(0)), &tokens);
        let twice = detokenize(&once, &tokens);

        assert_eq!(once, "hi @alice");
        assert_eq!(twice, once);
    }

    #[test]
    fn test_malformed_markers_ignored() {
        let tokens = stream(&["@alice"]);
        let text =
            "<i class=notranslate>{}</i> <i class=notranslate>{0</i> <i class=notranslate>{x}</i>";

        assert_eq!(detokenize(text, &tokens), text);
    }

    #[test]
    fn test_empty_stream() {
        let tokens = TokenStream::new();
        let report = detokenize_with_report("plain", &tokens);

        assert_eq!(report.text, "plain");
        assert_eq!(report.restored, 0);
        assert!(report.missing_markers.is_empty());
    }
}
