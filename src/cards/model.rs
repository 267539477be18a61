//! Card data model — the render request and its output.

use chrono::{DateTime, Utc};

/// One flagged message to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Display name of the author.
    pub author_name: String,
    /// Platform-specific tag shown after `#`. Empty to show the name alone.
    pub discriminator: String,
    /// Encoded avatar image (PNG, JPEG, WebP or GIF).
    pub avatar: Vec<u8>,
    /// When the message was sent.
    pub timestamp: DateTime<Utc>,
    /// Message body, one entry per line break in the original text.
    pub body: Vec<String>,
}

impl Card {
    pub fn new(
        author_name: impl Into<String>,
        discriminator: impl Into<String>,
        avatar: Vec<u8>,
        timestamp: DateTime<Utc>,
        content: &str,
    ) -> Self {
        Self {
            author_name: author_name.into(),
            discriminator: discriminator.into(),
            avatar,
            timestamp,
            body: split_lines(content),
        }
    }

    /// Author label as drawn in the header: `name#discriminator`.
    pub fn label(&self) -> String {
        if self.discriminator.is_empty() {
            self.author_name.clone()
        } else {
            format!("{}#{}", self.author_name, self.discriminator)
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.body
    }
}

/// Split message content on line breaks (`\n`, `\r\n`, lone `\r`).
/// A trailing line break does not produce an extra empty line.
pub fn split_lines(content: &str) -> Vec<String> {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    unified.lines().map(String::from).collect()
}

/// Encoded card image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    /// PNG bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RenderedImage {
    pub fn mime_type(&self) -> &'static str {
        "image/png"
    }
}
