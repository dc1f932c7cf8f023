//! Static JSON export

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::config::CommentsConfig;
use crate::helpers::encode_segment;
use crate::pages::{DetailOutcome, Materializer};
use crate::server::PostResponse;
use crate::Blog;

/// What an export wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub listing_pages: usize,
    pub posts: usize,
}

/// Export every listing page and every post to the public directory
pub async fn run(blog: &Blog) -> Result<()> {
    let start = std::time::Instant::now();

    let pages = blog.materializer()?;
    let summary = export(&pages, &blog.config.comments, &blog.public_dir).await?;

    let duration = start.elapsed();
    tracing::info!(
        "Exported {} listing pages and {} posts in {:.2}s",
        summary.listing_pages,
        summary.posts,
        duration.as_secs_f64()
    );
    Ok(())
}

/// Walk the listing cursor by cursor and write
/// `index.json`, `page/<n>.json` (n >= 2) and `post/<uid>.json`
pub async fn export(
    pages: &Materializer,
    comments: &CommentsConfig,
    public_dir: &Path,
) -> Result<ExportSummary> {
    let listings = pages.build_all_listings(pages.per_page()).await?;
    fs::create_dir_all(public_dir)?;

    let mut summary = ExportSummary::default();
    for (i, listing) in listings.iter().enumerate() {
        let output_path = match i {
            0 => public_dir.join("index.json"),
            n => public_dir.join("page").join(format!("{}.json", n + 1)),
        };
        write_json(&output_path, listing)?;
        summary.listing_pages += 1;
    }

    for post in listings.iter().flat_map(|l| &l.results) {
        match pages.build_detail(&post.uid, None).await? {
            DetailOutcome::Found(page) => {
                let output_path = public_dir
                    .join("post")
                    .join(format!("{}.json", encode_segment(&post.uid)));
                write_json(&output_path, &PostResponse::new(&page, comments))?;
                summary.posts += 1;
            }
            // Deleted between the listing and the detail query
            DetailOutcome::NotFound => tracing::warn!("Post {} disappeared, skipped", post.uid),
        }
    }

    Ok(summary)
}

fn write_json<T: Serialize>(output_path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create dir {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(output_path, json).with_context(|| format!("Failed to write {:?}", output_path))?;
    tracing::debug!("Generated: {:?}", output_path);
    Ok(())
}
