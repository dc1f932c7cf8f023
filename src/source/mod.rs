//! Content source adapters
//!
//! A [`ContentSource`] answers predicate queries over the document store.
//! Two implementations exist:
//!
//! - [`HttpSource`] talks to the content API over HTTP,
//! - [`MemorySource`] serves raw documents held in memory (tests, offline
//!   builds from a JSON dump).
//!
//! Neither keeps state between calls: every query reads fresh from the store.

mod error;
mod http;
mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::SourceConfig;
use crate::content::Document;

pub use error::SourceError;
pub use http::HttpSource;
pub use memory::MemorySource;

/// Custom type of blog posts
pub const POST_TYPE: &str = "post";

/// Opaque pagination token; absence means the collection is exhausted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque capability selecting a draft version of the content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewRef(String);

impl PreviewRef {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Document filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Equality on a field path such as `document.type` or `my.post.uid`
    At { path: String, value: String },
}

impl Predicate {
    pub fn at(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::At {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn document_type(doc_type: &str) -> Self {
        Self::at("document.type", doc_type)
    }

    pub fn uid(doc_type: &str, uid: &str) -> Self {
        Self::at(format!("my.{}.uid", doc_type), uid)
    }

    /// Query-language form, e.g. `[at(document.type, "post")]`
    pub fn to_query(&self) -> String {
        match self {
            Self::At { path, value } => format!(
                "[at({}, \"{}\")]",
                path,
                value.replace('\\', "\\\\").replace('"', "\\\"")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort directive on the first publication date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub direction: SortDirection,
}

impl Ordering {
    pub fn first_publication_date(direction: SortDirection) -> Self {
        Self { direction }
    }

    /// Query-language form, e.g. `[document.first_publication_date desc]`
    pub fn to_query(&self) -> String {
        match self.direction {
            SortDirection::Asc => "[document.first_publication_date]".to_string(),
            SortDirection::Desc => "[document.first_publication_date desc]".to_string(),
        }
    }
}

/// Options of a [`ContentSource::query`] call
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Projection (`post.title`, ...); sources may ignore it
    pub fetch: Vec<String>,
    pub page_size: usize,
    /// Start after this cursor
    pub after: Option<Cursor>,
    pub orderings: Option<Ordering>,
    pub preview_ref: Option<PreviewRef>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            fetch: Vec::new(),
            page_size: 20,
            after: None,
            orderings: None,
            preview_ref: None,
        }
    }
}

impl QueryOptions {
    pub fn page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn fetch<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetch = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn after(mut self, cursor: Option<Cursor>) -> Self {
        self.after = cursor;
        self
    }

    pub fn ordered(mut self, ordering: Ordering) -> Self {
        self.orderings = Some(ordering);
        self
    }

    pub fn preview(mut self, preview_ref: Option<PreviewRef>) -> Self {
        self.preview_ref = preview_ref;
        self
    }
}

/// One page of query results
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub results: Vec<Document>,
    pub next_page: Option<Cursor>,
}

/// Read access to the document store
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Run a predicate query and return one page of documents
    async fn query(
        &self,
        predicate: &Predicate,
        options: &QueryOptions,
    ) -> Result<QueryResponse, SourceError>;

    /// Fetch a single document by its uid
    async fn get_by_uid(
        &self,
        doc_type: &str,
        uid: &str,
        preview_ref: Option<&PreviewRef>,
    ) -> Result<Document, SourceError> {
        let options = QueryOptions::page_size(1).preview(preview_ref.cloned());
        let response = self.query(&Predicate::uid(doc_type, uid), &options).await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound {
                doc_type: doc_type.to_string(),
                uid: uid.to_string(),
            })
    }
}

/// Build the source selected by the configuration
pub fn from_config(config: &SourceConfig) -> Result<Arc<dyn ContentSource>> {
    if let Some(ref fixture) = config.fixture {
        let source = MemorySource::from_file(fixture)?;
        if source.is_empty() {
            tracing::warn!("Document fixture {:?} is empty", fixture);
        }
        tracing::info!("Using document fixture {:?} ({} documents)", fixture, source.len());
        return Ok(Arc::new(source));
    }

    if config.endpoint.is_empty() {
        anyhow::bail!("No content source configured: set source.endpoint or source.fixture");
    }

    tracing::info!("Using content API at {}", config.endpoint);
    Ok(Arc::new(HttpSource::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_query_form() {
        assert_eq!(
            Predicate::document_type(POST_TYPE).to_query(),
            "[at(document.type, \"post\")]"
        );
        assert_eq!(
            Predicate::uid("post", "say \"hi\"").to_query(),
            "[at(my.post.uid, \"say \\\"hi\\\"\")]"
        );
    }

    #[test]
    fn test_ordering_query_form() {
        assert_eq!(
            Ordering::first_publication_date(SortDirection::Desc).to_query(),
            "[document.first_publication_date desc]"
        );
        assert_eq!(
            Ordering::first_publication_date(SortDirection::Asc).to_query(),
            "[document.first_publication_date]"
        );
    }

    #[test]
    fn test_from_config_requires_a_backend() {
        assert!(from_config(&SourceConfig::default()).is_err());
    }
}
