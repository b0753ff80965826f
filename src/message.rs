//! Chat message data model
//!
//! A `Message` carries the text under transformation together with the token
//! stream produced while tokenizing it. The stream is never serialized: it
//! only lives as long as one translation dispatch.

use crate::token::TokenStream;
use serde::{Deserialize, Serialize};

/// A user mentioned in a message (`@username`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub username: String,
}

/// A channel referenced in a message (`#name`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub name: String,
}

/// Attachment translated independently of the message body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Attachment {
    /// The text a provider should translate: the description, else the text
    pub fn translatable_text(&self) -> Option<&str> {
        [self.description.as_deref(), self.text.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Room { id: id.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    /// Id of the author, excluded from room language lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    pub text: String,
    /// Rendered form of `text`, set while tokenizing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub channels: Vec<ChannelRef>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(skip)]
    pub tokens: TokenStream,
}

impl Message {
    pub fn new(id: impl Into<String>, room_id: impl Into<String>, text: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            room_id: room_id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn with_mention(mut self, username: impl Into<String>) -> Self {
        self.mentions.push(Mention {
            username: username.into(),
        });
        self
    }

    pub fn with_channel(mut self, name: impl Into<String>) -> Self {
        self.channels.push(ChannelRef { name: name.into() });
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Escape the characters that would otherwise be read as markup
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
