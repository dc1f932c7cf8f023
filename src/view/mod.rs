//! View models for the listing and post pages
//!
//! Everything here is a pure function of its inputs: the same document and
//! options always produce the same view.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SiteConfig;
use crate::content::{richtext, ContentBlock, Document, RichTextBlock};
use crate::helpers::{count_words, date_xml, format_date, post_path, reading_minutes, DateLocale};

/// Date rendering settings
#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub locale: DateLocale,
    pub timezone: chrono_tz::Tz,
    pub date_format: String,
    pub time_format: String,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            locale: DateLocale::PtBr,
            timezone: chrono_tz::UTC,
            date_format: "dd MMM yyyy".to_string(),
            time_format: "HH:mm".to_string(),
        }
    }
}

impl ViewOptions {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            locale: config.date_locale().unwrap_or(DateLocale::PtBr),
            timezone: config.tz(),
            date_format: config.date_format.clone(),
            time_format: config.time_format.clone(),
        }
    }

    /// Render a timestamp for display
    pub fn format(&self, timestamp: &DateTime<Utc>) -> FormattedDate {
        let local = timestamp.with_timezone(&self.timezone);
        FormattedDate {
            date: format_date(&local, &self.date_format, self.locale),
            time: format_date(&local, &self.time_format, self.locale),
            datetime: date_xml(&local),
        }
    }
}

/// A timestamp in display form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedDate {
    /// e.g. `10 jan 2023`
    pub date: String,
    /// e.g. `10:00`
    pub time: String,
    /// Machine-readable form for `<time datetime=...>`
    pub datetime: String,
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostSummary {
    pub uid: String,
    pub first_publication_date: Option<FormattedDate>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

/// Link to a neighboring post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavPost {
    pub title: String,
    pub uid: String,
}

impl NavPost {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            title: doc.data.title.clone(),
            uid: doc.uid.clone(),
        }
    }
}

/// Content section with its body rendered to HTML
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailBlock {
    pub heading: String,
    pub body: Vec<RichTextBlock>,
    pub body_html: String,
}

/// Post page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetail {
    pub uid: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub banner_url: Option<String>,
    /// Alternative text of the banner image
    pub banner_alt: Option<String>,
    pub first_publication_date: Option<FormattedDate>,
    /// Set when the post was edited after its first publication
    pub edited_at: Option<FormattedDate>,
    pub content: Vec<DetailBlock>,
    pub reading_time_minutes: u32,
    pub previous_post: Option<NavPost>,
    pub next_post: Option<NavPost>,
    /// Rendered from a draft version
    pub preview: bool,
    /// Route path; doubles as the comment thread identifier
    pub path: String,
}

/// Estimated reading time in minutes
///
/// Heading and body words of every block are summed and divided by 200,
/// rounding up. No blocks means 0; any block means at least 1.
pub fn reading_time(blocks: &[ContentBlock]) -> u32 {
    if blocks.is_empty() {
        return 0;
    }

    let words: usize = blocks
        .iter()
        .map(|block| count_words(&block.heading) + count_words(&richtext::as_text(&block.body)))
        .sum();

    reading_minutes(words).max(1)
}

/// Project a document into a listing entry
pub fn to_summary(doc: &Document, options: &ViewOptions) -> PostSummary {
    PostSummary {
        uid: doc.uid.clone(),
        first_publication_date: doc.first_publication_date.as_ref().map(|d| options.format(d)),
        title: doc.data.title.clone(),
        subtitle: doc.data.subtitle.clone(),
        author: doc.data.author.clone(),
    }
}

/// Project a document and its already-queried neighbors into a post page
pub fn to_detail(
    doc: &Document,
    previous: Option<&Document>,
    next: Option<&Document>,
    options: &ViewOptions,
) -> PostDetail {
    let edited_at = match (doc.first_publication_date, doc.last_publication_date) {
        (Some(first), Some(last)) if last > first => Some(options.format(&last)),
        (None, Some(last)) => Some(options.format(&last)),
        _ => None,
    };

    let content = doc
        .data
        .content
        .iter()
        .map(|block| DetailBlock {
            heading: block.heading.clone(),
            body: block.body.clone(),
            body_html: richtext::as_html(&block.body),
        })
        .collect();

    PostDetail {
        uid: doc.uid.clone(),
        title: doc.data.title.clone(),
        subtitle: doc.data.subtitle.clone(),
        author: doc.data.author.clone(),
        banner_url: doc.data.banner.as_ref().map(|b| b.url.clone()),
        banner_alt: doc.data.banner.as_ref().and_then(|b| b.alt.clone()),
        first_publication_date: doc.first_publication_date.as_ref().map(|d| options.format(d)),
        edited_at,
        content,
        reading_time_minutes: reading_time(&doc.data.content),
        previous_post: previous.map(NavPost::from_document),
        next_post: next.map(NavPost::from_document),
        preview: false,
        path: post_path(&doc.uid),
    }
}
