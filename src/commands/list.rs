//! List posts

use anyhow::Result;

use crate::pages::Listing;
use crate::source::Cursor;
use crate::Blog;

/// Print one listing page, starting after `after` when given
pub async fn run(blog: &Blog, after: Option<&str>) -> Result<()> {
    let pages = blog.materializer()?;
    let listing = pages
        .build_listing(pages.per_page(), after.map(Cursor::new))
        .await?;
    print!("{}", format_listing(&listing));
    Ok(())
}

/// Human-readable form of a listing page
pub fn format_listing(listing: &Listing) -> String {
    let mut out = format!("Posts ({}):\n", listing.results.len());
    for post in &listing.results {
        let date = post
            .first_publication_date
            .as_ref()
            .map(|d| d.date.as_str())
            .unwrap_or("unpublished");
        out.push_str(&format!(
            "  {} - {} by {} [{}]\n",
            date, post.title, post.author, post.uid
        ));
    }
    match &listing.next_page {
        Some(cursor) => out.push_str(&format!("Next page: --after {}\n", cursor)),
        None => out.push_str("No more posts.\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{FormattedDate, PostSummary};

    #[test]
    fn test_format_listing() {
        let listing = Listing {
            results: vec![PostSummary {
                uid: "mars-trip".to_string(),
                first_publication_date: Some(FormattedDate {
                    date: "10 jan 2023".to_string(),
                    time: "10:00".to_string(),
                    datetime: "2023-01-10T10:00:00+00:00".to_string(),
                }),
                title: "Mars trip".to_string(),
                subtitle: String::new(),
                author: "Ada".to_string(),
            }],
            next_page: Some(Cursor::new("M1")),
        };

        assert_eq!(
            format_listing(&listing),
            "Posts (1):\n  10 jan 2023 - Mars trip by Ada [mars-trip]\nNext page: --after M1\n"
        );
    }

    #[test]
    fn test_format_last_page() {
        let listing = Listing {
            results: vec![],
            next_page: None,
        };
        assert!(format_listing(&listing).ends_with("No more posts.\n"));
    }
}
