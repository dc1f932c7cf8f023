//! Document model for posts stored in the content API

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A post document as returned by the content store
///
/// Built only through [`crate::content::schema::parse_document`], so every
/// instance carries a non-empty `id` and `uid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Store identity, used as the anchor of pagination cursors
    pub id: String,

    /// Unique slug
    pub uid: String,

    /// Custom type name (`post`)
    #[serde(rename = "type")]
    pub doc_type: String,

    /// First publication timestamp; absent for never-published previews
    pub first_publication_date: Option<DateTime<Utc>>,

    /// Timestamp of the latest edit
    pub last_publication_date: Option<DateTime<Utc>>,

    pub data: PostData,
}

/// Structured payload of a post
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostData {
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub banner: Option<Banner>,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Banner {
    pub url: String,
    pub alt: Option<String>,
}

/// One section of a post: a heading followed by rich text
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentBlock {
    pub heading: String,
    pub body: Vec<RichTextBlock>,
}

/// A block of structured text (paragraph, heading, list item, ...)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichTextBlock {
    pub kind: BlockKind,
    pub text: String,
    pub spans: Vec<Span>,
}

impl RichTextBlock {
    /// Plain paragraph without formatting
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
            spans: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    ListItem,
    OrderedListItem,
    Preformatted,
    Other(String),
}

impl BlockKind {
    /// Map the API's block type name
    pub fn from_api(name: &str) -> Self {
        match name {
            "paragraph" => Self::Paragraph,
            "list-item" => Self::ListItem,
            "o-list-item" => Self::OrderedListItem,
            "preformatted" => Self::Preformatted,
            h if h.starts_with("heading") => match h["heading".len()..].parse::<u8>() {
                Ok(level @ 1..=6) => Self::Heading(level),
                _ => Self::Other(h.to_string()),
            },
            other => Self::Other(other.to_string()),
        }
    }
}

/// Inline formatting over `[start, end)`, counted in characters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanKind {
    Strong,
    Em,
    Hyperlink { url: String },
    Label(String),
    Other(String),
}
