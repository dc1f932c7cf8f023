//! Comment thread embedding (utterances)

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::CommentsConfig;
use crate::helpers::html_escape;

/// Script served by the comment widget
pub const UTTERANCES_SCRIPT: &str = "https://utteranc.es/client.js";

/// Element the widget script is injected into
pub const ANCHOR_ID: &str = "inject-comments-for-utterances";

/// Comment widget settings for one post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentThread {
    /// Stable per-post identifier handed to the widget
    pub identifier: String,
    /// Script attributes, in the order they are emitted
    pub attributes: IndexMap<String, String>,
}

impl CommentThread {
    /// Thread for the post served at `path`; `None` when comments are off
    pub fn for_post(config: &CommentsConfig, path: &str) -> Option<Self> {
        if !config.enable || config.repo.is_empty() {
            return None;
        }

        let mut attributes = IndexMap::new();
        attributes.insert("src".to_string(), UTTERANCES_SCRIPT.to_string());
        attributes.insert("repo".to_string(), config.repo.clone());
        // With `pathname` the widget derives the issue from the page path,
        // otherwise it is given the identifier explicitly
        if config.issue_term == "pathname" {
            attributes.insert("issue-term".to_string(), "pathname".to_string());
        } else {
            attributes.insert("issue-term".to_string(), path.to_string());
        }
        if !config.label.is_empty() {
            attributes.insert("label".to_string(), config.label.clone());
        }
        attributes.insert("theme".to_string(), config.theme.clone());
        attributes.insert("crossorigin".to_string(), "anonymous".to_string());
        attributes.insert("async".to_string(), "true".to_string());

        Some(Self {
            identifier: path.to_string(),
            attributes,
        })
    }

    /// Anchor element plus the widget `<script>` tag
    pub fn to_html(&self) -> String {
        let attrs: Vec<String> = self
            .attributes
            .iter()
            .map(|(k, v)| format!(r#"{}="{}""#, k, html_escape(v)))
            .collect();
        format!(
            r#"<div id="{}"><script {}></script></div>"#,
            ANCHOR_ID,
            attrs.join(" ")
        )
    }
}
