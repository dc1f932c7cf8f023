//! Show the post slugs built ahead of time

use anyhow::Result;

use crate::Blog;

/// Print the static paths and the fallback policy
pub async fn run(blog: &Blog) -> Result<()> {
    let paths = blog.materializer()?.static_paths().await?;
    println!("Static paths ({}):", paths.paths.len());
    for uid in &paths.paths {
        println!("  {}", crate::helpers::post_path(uid));
    }
    println!("Fallback: {}", serde_json::to_string(&paths.fallback)?.trim_matches('"'));
    Ok(())
}
