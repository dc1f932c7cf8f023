//! Show one post page

use anyhow::Result;

use crate::pages::DetailOutcome;
use crate::source::PreviewRef;
use crate::Blog;

/// Print the materialized page for `slug` as JSON
pub async fn run(blog: &Blog, slug: &str, preview_ref: Option<&str>) -> Result<()> {
    let pages = blog.materializer()?;
    let preview_ref = preview_ref.map(PreviewRef::new);

    match pages.build_detail(slug, preview_ref.as_ref()).await? {
        DetailOutcome::Found(page) => {
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        DetailOutcome::NotFound => anyhow::bail!("No post with slug {:?}", slug),
    }
}
