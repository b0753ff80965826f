//! CommonMark rendering for the markup pass
//!
//! Raw inline HTML, marker wrappers included, passes through unchanged.
//! Code spans and code blocks are lifted out of the rendered output into
//! renderer tokens, so their content never reaches a translation provider.
//!
//! Input is expected to be HTML-escaped already. CommonMark keeps entity
//! references in code verbatim, so code content is emitted as given.

use crate::detokenizer::detokenize;
use crate::message::Message;
use crate::services::MessageRenderer;
use crate::token::{Token, TokenStream};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};

/// Markdown renderer backed by pulldown-cmark
#[derive(Debug, Clone, Copy)]
pub struct CommonMarkRenderer {
    options: Options,
}

impl Default for CommonMarkRenderer {
    fn default() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);
        CommonMarkRenderer { options }
    }
}

impl CommonMarkRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `source` to HTML, appending one token per lifted code element
    ///
    /// Markers from earlier passes that end up inside code are restored
    /// to their fragments first, so code shows what the author typed.
    pub fn render_html(&self, source: &str, tokens: &mut TokenStream) -> String {
        let mut lifted: Vec<Token> = Vec::new();
        let mut block: Option<String> = None;
        let mut events: Vec<Event> = Vec::new();

        for event in Parser::new_ext(source, self.options) {
            match event {
                Event::Start(Tag::CodeBlock(_)) => block = Some(String::new()),
                Event::End(TagEnd::CodeBlock) => {
                    let content = block.take().unwrap_or_default();
                    let fragment = format!(
                        "<pre><code>{}</code></pre>",
                        detokenize(&content, tokens)
                    );
                    let placeholder = lift(&mut lifted, fragment);
                    events.push(Event::Html(CowStr::from(format!("{}\n", placeholder))));
                }
                Event::Text(text) if block.is_some() => {
                    block.get_or_insert_with(String::new).push_str(&text);
                }
                Event::Code(code) => {
                    let fragment = format!("<code>{}</code>", detokenize(&code, tokens));
                    let placeholder = lift(&mut lifted, fragment);
                    events.push(Event::InlineHtml(CowStr::from(placeholder)));
                }
                other => events.push(other),
            }
        }

        let mut output = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut output, events.into_iter());
        for token in lifted {
            tokens.push(token);
        }
        output
    }
}

impl MessageRenderer for CommonMarkRenderer {
    fn render(&self, mut message: Message) -> Message {
        let source = message.html.take().unwrap_or_else(|| message.text.clone());
        let html = self.render_html(&source, &mut message.tokens);
        message.html = Some(html);
        message
    }
}

/// Record a code fragment under a renderer placeholder
fn lift(lifted: &mut Vec<Token>, fragment: String) -> String {
    let placeholder = format!("=!=code-{}=!=", lifted.len());
    lifted.push(Token::new(placeholder.clone(), fragment));
    placeholder
}
