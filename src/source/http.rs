//! HTTP client for the content API (Prismic REST v2)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{ContentSource, Cursor, Predicate, QueryOptions, QueryResponse, SourceError};
use crate::config::SourceConfig;
use crate::content::parse_documents;

/// Repository description returned by the API root
#[derive(Debug, Deserialize)]
struct ApiInfo {
    #[serde(default)]
    refs: Vec<ApiRef>,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "isMasterRef", default)]
    is_master_ref: bool,
}

/// Body of `/documents/search`
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
    next_page: Option<String>,
}

/// Content source backed by the content API
///
/// The master ref is resolved on every query, so published changes are
/// visible to the next build without any local state.
pub struct HttpSource {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("spacetravelling/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let mut request = self.client.get(url).query(params);
        if let Some(ref token) = self.access_token {
            request = request.query(&[("access_token", token)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Unavailable(format!(
                "{} returned {}: {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        Ok(response.json::<T>().await?)
    }

    async fn master_ref(&self) -> Result<String, SourceError> {
        let info: ApiInfo = self.get_json(&self.endpoint, &[]).await?;
        info.refs
            .into_iter()
            .find(|r| r.is_master_ref)
            .map(|r| r.reference)
            .ok_or_else(|| SourceError::Malformed {
                path: "api.refs".to_string(),
                message: "no master ref".to_string(),
            })
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn query(
        &self,
        predicate: &Predicate,
        options: &QueryOptions,
    ) -> Result<QueryResponse, SourceError> {
        if options.page_size == 0 || options.page_size > 100 {
            return Err(SourceError::InvalidQuery(format!(
                "page size {} out of range 1..=100",
                options.page_size
            )));
        }

        let reference = match options.preview_ref {
            Some(ref preview) => preview.as_str().to_string(),
            None => self.master_ref().await?,
        };

        let mut params = vec![
            ("ref", reference),
            ("q", format!("[{}]", predicate.to_query())),
            ("pageSize", options.page_size.to_string()),
        ];
        if let Some(ref after) = options.after {
            params.push(("after", after.as_str().to_string()));
        }
        if let Some(ordering) = options.orderings {
            params.push(("orderings", ordering.to_query()));
        }
        if !options.fetch.is_empty() {
            params.push(("fetch", options.fetch.join(",")));
        }

        let url = format!("{}/documents/search", self.endpoint);
        let search: SearchResponse = self.get_json(&url, &params).await?;
        let results = parse_documents(&search.results)?;

        // The API hands out a page URL; continue from the last id instead so
        // the cursor stays usable with `after`
        let next_page = search
            .next_page
            .and_then(|_| results.last().map(|d| Cursor::new(d.id.clone())));

        tracing::debug!(
            "Query {} returned {} documents (more: {})",
            predicate.to_query(),
            results.len(),
            next_page.is_some()
        );

        Ok(QueryResponse { results, next_page })
    }
}
