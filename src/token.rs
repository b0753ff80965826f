//! Marker tokens for protecting message fragments during machine translation
//!
//! A marker is a small inline element carrying the `notranslate` flag and a
//! numeric index in braces. Providers are expected to pass any span carrying
//! the flag through unchanged, so each protected fragment can be restored
//! after translation.
//!
//! Format: `<i class=notranslate>{index}</i>`
//! Examples: `<i class=notranslate>{0}</i>`, `<i class=notranslate>{12}</i>`
//!
//! User text that already contains this exact wrapper form is not escaped and
//! can collide with generated markers. This is a known limitation.
use serde::{Deserialize, Serialize};

/// Flag that marks a span as non-translatable
pub const NOTRANSLATE_FLAG: &str = "notranslate";

/// Build the marker string for an index
pub fn marker(index: usize) -> String {
    format!("<i class={}>{{{}}}</i>", NOTRANSLATE_FLAG, index)
}

/// Whether a span carries the non-translatable flag
pub fn is_marker(span: &str) -> bool {
    span.contains(NOTRANSLATE_FLAG)
}

/// A protected fragment and the marker that stands in for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The marker string substituted into the text
    pub marker: String,
    /// The original text of the protected span
    pub fragment: String,
    /// Replacement used by detokenization instead of `fragment`, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_override: Option<String>,
}

impl Token {
    pub fn new(marker: impl Into<String>, fragment: impl Into<String>) -> Self {
        Token {
            marker: marker.into(),
            fragment: fragment.into(),
            render_override: None,
        }
    }

    pub fn with_override(
        marker: impl Into<String>,
        fragment: impl Into<String>,
        render_override: impl Into<String>,
    ) -> Self {
        Token {
            marker: marker.into(),
            fragment: fragment.into(),
            render_override: Some(render_override.into()),
        }
    }

    /// The text that replaces this token's marker on restoration
    pub fn replacement(&self) -> &str {
        self.render_override.as_deref().unwrap_or(&self.fragment)
    }
}

/// Ordered record of the tokens extracted from one message
///
/// The stream owns the marker counter for the message. Every allocation
/// starts from the larger of the counter and the current length, so indices
/// only ever grow, even when a renderer appends tokens of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStream {
    tokens: Vec<Token>,
    next_index: usize,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Find the token currently registered under `marker`
    pub fn get(&self, marker: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.marker == marker)
    }

    fn allocate(&mut self) -> String {
        let index = self.next_index.max(self.tokens.len());
        self.next_index = index + 1;
        marker(index)
    }

    /// Record a fragment under a freshly allocated marker and return the marker
    pub fn protect(&mut self, fragment: &str) -> String {
        let marker = self.allocate();
        self.tokens.push(Token::new(marker.clone(), fragment));
        marker
    }

    /// Append a token as-is, keeping whatever marker it already carries
    ///
    /// Used for tokens produced by a renderer with its own placeholders.
    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Give the token registered under `old_marker` a fresh marker
    ///
    /// The token keeps its position, fragment and override. Returns the new
    /// marker, or `None` if no token carries `old_marker`.
    pub fn remark(&mut self, old_marker: &str) -> Option<String> {
        let position = self.tokens.iter().position(|t| t.marker == old_marker)?;
        let fresh = self.allocate();
        self.tokens[position].marker = fresh.clone();
        Some(fresh)
    }

    /// Markers of tokens that do not carry the non-translatable flag
    pub fn unflagged_markers(&self) -> Vec<String> {
        self.tokens
            .iter()
            .filter(|t| !is_marker(&t.marker))
            .map(|t| t.marker.clone())
            .collect()
    }
}

impl<'a> IntoIterator for &'a TokenStream {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

impl From<Vec<Token>> for TokenStream {
    fn from(tokens: Vec<Token>) -> Self {
        let next_index = tokens.len();
        TokenStream { tokens, next_index }
    }
}
