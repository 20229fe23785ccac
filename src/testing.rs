//! Token factories for tests.
//!
//! [`Tok`] is a plain owned [`SourceToken`] implementation with chained
//! constructors, so unit and integration tests can assemble token streams
//! without depending on any tokenizer front-end. Line ranges are inclusive
//! and heading openers span their own line, matching common markup
//! tokenizer output.

use crate::token::SourceToken;

/// An owned test token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tok {
    /// Type tag.
    pub token_type: String,
    /// Rendered tag name.
    pub tag: String,
    /// Nesting delta.
    pub nesting: i8,
    /// Inclusive line range.
    pub lines: Option<(i64, i64)>,
    /// Heading level.
    pub level: Option<u8>,
    /// Free text content.
    pub content: String,
    /// Markup/info string.
    pub info: String,
    /// Named attributes in insertion order.
    pub attrs: Vec<(String, String)>,
}

impl Tok {
    /// A bare token with a type tag and nesting delta.
    pub fn new(token_type: &str, nesting: i8) -> Self {
        Self {
            token_type: token_type.to_string(),
            nesting,
            ..Self::default()
        }
    }

    /// An opener (+1).
    pub fn open(token_type: &str) -> Self {
        Self::new(token_type, 1)
    }

    /// A closer (-1).
    pub fn close(token_type: &str) -> Self {
        Self::new(token_type, -1)
    }

    /// A flat token carrying content.
    pub fn leaf(token_type: &str, content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Self::new(token_type, 0)
        }
    }

    /// An `inline` content token.
    pub fn inline(content: &str) -> Self {
        Self::leaf("inline", content)
    }

    /// A `heading_open` token at a given level and line.
    pub fn heading_open(level: u8, line: i64) -> Self {
        Self {
            tag: format!("h{}", level),
            lines: Some((line, line)),
            level: Some(level),
            ..Self::new("heading_open", 1)
        }
    }

    /// A `heading_close` token.
    pub fn heading_close() -> Self {
        Self::new("heading_close", -1)
    }

    /// A `fence` token with an info string and inclusive line range.
    pub fn fence(info: &str, start: i64, end: i64) -> Self {
        Self {
            info: info.to_string(),
            lines: Some((start, end)),
            ..Self::new("fence", 0)
        }
    }

    /// Sets the inclusive line range.
    pub fn with_lines(mut self, start: i64, end: i64) -> Self {
        self.lines = Some((start, end));
        self
    }

    /// Appends a named attribute.
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the content.
    pub fn with_content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }
}

impl SourceToken for Tok {
    fn token_type(&self) -> &str {
        &self.token_type
    }

    fn nesting(&self) -> i8 {
        self.nesting
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn line_range(&self) -> Option<(i64, i64)> {
        self.lines
    }

    fn level(&self) -> Option<u8> {
        self.level
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn info(&self) -> &str {
        &self.info
    }

    fn attrs(&self) -> Vec<(String, String)> {
        self.attrs.clone()
    }
}
