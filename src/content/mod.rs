//! Content module - the typed post model and its validation boundary

mod document;
pub mod richtext;
pub mod schema;

pub use document::{
    Banner, BlockKind, ContentBlock, Document, PostData, RichTextBlock, Span, SpanKind,
};
pub use schema::{parse_document, parse_documents};
