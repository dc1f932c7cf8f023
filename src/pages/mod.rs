//! Page materializer - builds the listing and post routes
//!
//! Both routes are plain async functions over a [`ContentSource`]; the HTTP
//! server and the static exporter adapt them to their own lifecycle.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SiteConfig;
use crate::content::Document;
use crate::source::{
    ContentSource, Cursor, Ordering, Predicate, PreviewRef, QueryOptions, SortDirection,
    SourceError, POST_TYPE,
};
use crate::view::{to_detail, to_summary, PostDetail, PostSummary, ViewOptions};

/// Fields needed to render a listing entry
const LISTING_FIELDS: [&str; 3] = ["post.title", "post.subtitle", "post.author"];

/// Fields needed to render a neighbor link
const NEIGHBOR_FIELDS: [&str; 1] = ["post.title"];

/// One page of the post listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub results: Vec<PostSummary>,
    pub next_page: Option<Cursor>,
}

/// A built page plus how long it may be served before rebuilding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Materialized<T> {
    pub page: T,
    #[serde(rename = "revalidate", serialize_with = "serialize_secs")]
    pub revalidate: Option<Duration>,
}

fn serialize_secs<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&d.as_secs()),
        None => serializer.serialize_none(),
    }
}

/// Result of the post route
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Found(Materialized<PostDetail>),
    /// No post has the requested slug
    NotFound,
}

/// How slugs missing from [`StaticPaths::paths`] are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    /// Built on first request, then cached under the regeneration interval
    Lazy,
}

/// Post slugs known at build time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticPaths {
    pub paths: Vec<String>,
    pub fallback: Fallback,
}

/// Builds pages from a content source
#[derive(Clone)]
pub struct Materializer {
    source: Arc<dyn ContentSource>,
    view: ViewOptions,
    revalidate: Duration,
    per_page: usize,
    prerender_count: usize,
}

impl Materializer {
    pub fn new(source: Arc<dyn ContentSource>, config: &SiteConfig) -> Self {
        Self {
            source,
            view: ViewOptions::from_config(config),
            revalidate: config.revalidate(),
            per_page: config.listing.per_page,
            prerender_count: config.listing.prerender_count,
        }
    }

    /// Configured listing page size
    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Build one listing page, starting after `after` when given
    pub async fn build_listing(
        &self,
        page_size: usize,
        after: Option<Cursor>,
    ) -> Result<Listing, SourceError> {
        let options = QueryOptions::page_size(page_size)
            .fetch(LISTING_FIELDS)
            .after(after);
        let response = self
            .source
            .query(&Predicate::document_type(POST_TYPE), &options)
            .await?;

        Ok(Listing {
            results: response
                .results
                .iter()
                .map(|doc| to_summary(doc, &self.view))
                .collect(),
            next_page: response.next_page,
        })
    }

    /// Walk the whole listing by following cursors
    pub async fn build_all_listings(&self, page_size: usize) -> Result<Vec<Listing>, SourceError> {
        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        let mut after = None;

        loop {
            let listing = self.build_listing(page_size, after).await?;
            let next = listing.next_page.clone();
            pages.push(listing);

            match next {
                Some(cursor) if !seen.insert(cursor.clone()) => {
                    return Err(SourceError::InvalidQuery(format!(
                        "cursor {} returned twice while paginating",
                        cursor
                    )));
                }
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        tracing::debug!("Listing has {} pages", pages.len());
        Ok(pages)
    }

    /// Build the post page for `slug`
    ///
    /// The pivot is fetched first (honoring the preview ref); its two
    /// neighbors are then queried concurrently from the published content.
    pub async fn build_detail(
        &self,
        slug: &str,
        preview_ref: Option<&PreviewRef>,
    ) -> Result<DetailOutcome, SourceError> {
        let pivot = match self.source.get_by_uid(POST_TYPE, slug, preview_ref).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => {
                tracing::debug!("No post for slug {:?}", slug);
                return Ok(DetailOutcome::NotFound);
            }
            Err(e) => return Err(e),
        };

        let (previous, next) = tokio::try_join!(
            self.neighbor(&pivot, SortDirection::Desc),
            self.neighbor(&pivot, SortDirection::Asc),
        )?;

        let mut detail = to_detail(&pivot, previous.as_ref(), next.as_ref(), &self.view);
        detail.preview = preview_ref.is_some();

        Ok(DetailOutcome::Found(Materialized {
            page: detail,
            revalidate: Some(self.revalidate),
        }))
    }

    /// Nearest post before (`Desc`) or after (`Asc`) the pivot
    async fn neighbor(
        &self,
        pivot: &Document,
        direction: SortDirection,
    ) -> Result<Option<Document>, SourceError> {
        let options = QueryOptions::page_size(1)
            .fetch(NEIGHBOR_FIELDS)
            .after(Some(Cursor::new(pivot.id.clone())))
            .ordered(Ordering::first_publication_date(direction));
        let response = self
            .source
            .query(&Predicate::document_type(POST_TYPE), &options)
            .await?;

        Ok(response.results.into_iter().find(|doc| doc.id != pivot.id))
    }

    /// Slugs to build ahead of time; everything else resolves lazily
    pub async fn static_paths(&self) -> Result<StaticPaths, SourceError> {
        let paths = if self.prerender_count == 0 {
            Vec::new()
        } else {
            let options = QueryOptions::page_size(self.prerender_count).fetch(NEIGHBOR_FIELDS);
            self.source
                .query(&Predicate::document_type(POST_TYPE), &options)
                .await?
                .results
                .into_iter()
                .map(|doc| doc.uid)
                .collect()
        };

        Ok(StaticPaths {
            paths,
            fallback: Fallback::Lazy,
        })
    }
}
