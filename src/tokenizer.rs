//! Message tokenization
//!
//! Protected spans of a message are replaced with markers before the text is
//! sent to a translation provider. Four passes run in a fixed order, each one
//! consuming the output of the previous pass and appending to the message's
//! `TokenStream`:
//!
//! 1. **Emoji** - shortcodes such as `:smile:` or `:+1:`
//! 2. **Links** - the syntax around `[text](scheme://target)` and
//!    `<scheme://target|text>`, leaving the visible text translatable
//! 3. **Markup** - the message is rendered, markup tags produced by rendering
//!    become tokens, and markers from passes 1-2 are re-issued against the
//!    rendered output
//! 4. **Mentions** - literal `@username` and `#channel` occurrences
//!
//! Markers never match any pass's pattern as plain text, so a later pass
//! cannot split or re-tokenize an earlier marker.
//!
//! # Example
//!
//! ```ignore
//! let tokenizer = Tokenizer::new("http,https", Arc::new(CommonMarkRenderer::new()))?;
//! let message = Message::new("m1", "r1", "check :smile: and [this](https://x.io/a)");
//! let tokenized = tokenizer.tokenize(message);
//! // "check {3} and {4}this{5}", each {N} in its notranslate wrapper
//! ```

use crate::error::{TranslateError, TranslateResult};
use crate::message::Message;
use crate::services::MessageRenderer;
use crate::settings::{LINK_SCHEMES_KEY, Settings, setting_str};
use crate::token::{TokenStream, is_marker};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Pattern matching one complete marker
const MARKER_PATTERN: &str = r"<i class=notranslate>\{\d+\}</i>";

pub struct Tokenizer {
    renderer: Arc<dyn MessageRenderer>,
    emoji: Regex,
    markdown_link: Regex,
    angle_link: Regex,
    markup: Regex,
}

impl Tokenizer {
    /// Build a tokenizer for a comma-separated list of link schemes
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - Ready to tokenize
    /// * `Err(TranslateError::InvalidLinkSchemes)` - If the list holds no scheme
    pub fn new(link_schemes: &str, renderer: Arc<dyn MessageRenderer>) -> TranslateResult<Self> {
        let schemes = scheme_alternation(link_schemes)?;

        Ok(Tokenizer {
            renderer,
            emoji: compile(r":[+\w]+:")?,
            markdown_link: compile(&format!(
                r"(!?\[)([^\]]+)(\]\((?:{})://[^)]+\))",
                schemes
            ))?,
            angle_link: compile(&format!(
                r"((?:<|&lt;)(?:{})://[^|<>]+\|)((?:{}|[^<>])+?)(>|&gt;)",
                schemes, MARKER_PATTERN
            ))?,
            markup: compile(&format!(r"{}|<[^<>]+>", MARKER_PATTERN))?,
        })
    }

    /// Build a tokenizer from the link schemes setting
    pub fn from_settings(
        settings: &dyn Settings,
        renderer: Arc<dyn MessageRenderer>,
    ) -> TranslateResult<Self> {
        let schemes = setting_str(settings.get(LINK_SCHEMES_KEY).as_ref()).ok_or_else(|| {
            TranslateError::InvalidLinkSchemes(format!("{} is not set", LINK_SCHEMES_KEY))
        })?;
        Self::new(&schemes, renderer)
    }

    /// Run all four passes over a message
    ///
    /// The returned message carries the marked text in `text` and the
    /// protected fragments in `tokens`.
    pub fn tokenize(&self, message: Message) -> Message {
        let mut message = message;
        message.text = self.tokenize_emoji(&message.text, &mut message.tokens);
        message.text = self.tokenize_links(&message.text, &mut message.tokens);
        let message = self.tokenize_markup(message);
        let message = tokenize_mentions(message);
        debug!(
            message_id = %message.id,
            tokens = message.tokens.len(),
            "tokenized message"
        );
        message
    }

    /// Replace every emoji shortcode with a marker
    pub fn tokenize_emoji(&self, text: &str, tokens: &mut TokenStream) -> String {
        self.emoji
            .replace_all(text, |caps: &Captures| tokens.protect(&caps[0]))
            .into_owned()
    }

    /// Protect link syntax, keeping the link text between two markers
    pub fn tokenize_links(&self, text: &str, tokens: &mut TokenStream) -> String {
        let text = self
            .markdown_link
            .replace_all(text, |caps: &Captures| bracket(tokens, caps))
            .into_owned();
        self.angle_link
            .replace_all(&text, |caps: &Captures| bracket(tokens, caps))
            .into_owned()
    }

    /// Render the message and protect everything rendering produced
    ///
    /// Rendering may move or reformat earlier markers, so each marker found in
    /// the rendered output is re-issued under a fresh index and its token is
    /// updated in place. Renderer tokens (placeholders without the
    /// notranslate flag) get fresh markers first. Any other markup tag becomes
    /// a new token.
    pub fn tokenize_markup(&self, message: Message) -> Message {
        let mut message = message;
        message.html = Some(message.text.clone());
        let mut message = self.renderer.render(message);

        let rendered = message.html.clone().unwrap_or_else(|| message.text.clone());
        let mut text = strip_paragraph(&rendered).to_string();

        let mut settled = HashSet::new();
        for placeholder in message.tokens.unflagged_markers() {
            if let Some(fresh) = message.tokens.remark(&placeholder) {
                text = text.replace(&placeholder, &fresh);
                settled.insert(fresh);
            }
        }

        let tokens = &mut message.tokens;
        let mut remarked: HashMap<String, String> = HashMap::new();
        let text = self
            .markup
            .replace_all(&text, |caps: &Captures| {
                let span = &caps[0];
                if !is_marker(span) {
                    return tokens.protect(span);
                }
                if settled.contains(span) {
                    return span.to_string();
                }
                if let Some(fresh) = remarked.get(span) {
                    return fresh.clone();
                }
                match tokens.remark(span) {
                    Some(fresh) => {
                        remarked.insert(span.to_string(), fresh.clone());
                        fresh
                    }
                    // Not ours: user text that happens to look like a marker
                    None => span.to_string(),
                }
            })
            .into_owned();

        message.text = text;
        message
    }
}

/// Replace every literal `@username` and `#channel` with a marker
pub fn tokenize_mentions(message: Message) -> Message {
    let mut message = message;
    let needles: Vec<String> = message
        .mentions
        .iter()
        .filter(|m| !m.username.is_empty())
        .map(|m| format!("@{}", m.username))
        .chain(
            message
                .channels
                .iter()
                .filter(|c| !c.name.is_empty())
                .map(|c| format!("#{}", c.name)),
        )
        .collect();

    for needle in needles {
        message.text = protect_literal(&message.text, &needle, &mut message.tokens);
    }
    message
}

/// Tokenize a message in one call, building the tokenizer on the way
pub fn tokenize(
    message: Message,
    link_schemes: &str,
    renderer: Arc<dyn MessageRenderer>,
) -> TranslateResult<Message> {
    Ok(Tokenizer::new(link_schemes, renderer)?.tokenize(message))
}

fn compile(pattern: &str) -> TranslateResult<Regex> {
    Regex::new(pattern).map_err(|e| TranslateError::InvalidPattern(e.to_string()))
}

/// Turn `"http, https"` into the regex alternation `http|https`
fn scheme_alternation(link_schemes: &str) -> TranslateResult<String> {
    let schemes: Vec<String> = link_schemes
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(regex::escape)
        .collect();

    if schemes.is_empty() {
        return Err(TranslateError::InvalidLinkSchemes(format!(
            "no schemes in {:?}",
            link_schemes
        )));
    }
    Ok(schemes.join("|"))
}

fn bracket(tokens: &mut TokenStream, caps: &Captures) -> String {
    let pre = tokens.protect(&caps[1]);
    let post = tokens.protect(&caps[3]);
    format!("{}{}{}", pre, &caps[2], post)
}

fn strip_paragraph(html: &str) -> &str {
    let trimmed = html.trim();
    match trimmed
        .strip_prefix("<p>")
        .and_then(|inner| inner.strip_suffix("</p>"))
    {
        Some(inner) if !inner.contains("<p>") => inner,
        _ => trimmed,
    }
}

fn protect_literal(text: &str, needle: &str, tokens: &mut TokenStream) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, matched) in text.match_indices(needle) {
        out.push_str(&text[last..start]);
        out.push_str(&tokens.protect(matched));
        last = start + matched.len();
    }
    out.push_str(&text[last..]);
    out
}
