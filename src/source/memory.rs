//! In-memory document store

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{
    ContentSource, Cursor, Predicate, QueryOptions, QueryResponse, SortDirection, SourceError,
};
use crate::content::{parse_document, Document};

/// Document store backed by raw JSON values
///
/// Documents are kept exactly as the API would serve them, so every query
/// goes through the same schema boundary as the HTTP source. Unordered
/// queries return documents in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: Vec<Value>,
    /// Draft versions per preview ref, overriding published documents by id
    previews: HashMap<String, Vec<Value>>,
}

impl MemorySource {
    pub fn new(documents: Vec<Value>) -> Self {
        Self {
            documents,
            previews: HashMap::new(),
        }
    }

    /// Load a JSON dump: either an array of documents or a search response
    /// with a `results` array
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {:?}", path))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture {:?}", path))?;

        let documents = match value {
            Value::Array(docs) => docs,
            Value::Object(mut obj) => match obj.remove("results") {
                Some(Value::Array(docs)) => docs,
                _ => anyhow::bail!("Fixture {:?} has no `results` array", path),
            },
            _ => anyhow::bail!("Fixture {:?} must hold an array of documents", path),
        };

        tracing::debug!("Loaded {} documents from {:?}", documents.len(), path);
        Ok(Self::new(documents))
    }

    /// Register draft documents visible under `preview_ref`
    pub fn with_preview(mut self, preview_ref: &str, drafts: Vec<Value>) -> Self {
        self.previews.insert(preview_ref.to_string(), drafts);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents visible under the given ref
    fn snapshot(&self, preview_ref: Option<&str>) -> Result<Vec<Value>, SourceError> {
        let Some(preview_ref) = preview_ref else {
            return Ok(self.documents.clone());
        };

        let drafts = self
            .previews
            .get(preview_ref)
            .ok_or_else(|| SourceError::InvalidQuery(format!("unknown ref {:?}", preview_ref)))?;

        let mut docs = self.documents.clone();
        for draft in drafts {
            match docs.iter_mut().find(|d| d.get("id") == draft.get("id")) {
                Some(existing) => *existing = draft.clone(),
                None => docs.push(draft.clone()),
            }
        }
        Ok(docs)
    }
}

fn matches(predicate: &Predicate, raw: &Value) -> bool {
    let field = |key: &str| raw.get(key).and_then(Value::as_str);

    match predicate {
        Predicate::At { path, value } => match path.as_str() {
            "document.type" => field("type") == Some(value.as_str()),
            "document.id" => field("id") == Some(value.as_str()),
            other => match other
                .strip_prefix("my.")
                .and_then(|rest| rest.split_once('.'))
            {
                Some((doc_type, "uid")) => {
                    field("type") == Some(doc_type) && field("uid") == Some(value.as_str())
                }
                Some((doc_type, name)) => {
                    field("type") == Some(doc_type)
                        && raw
                            .get("data")
                            .and_then(|d| d.get(name))
                            .and_then(Value::as_str)
                            == Some(value.as_str())
                }
                None => false,
            },
        },
    }
}

/// Keep only the `data` fields named in `fetch` (`<type>.<field>`)
fn project(mut raw: Value, fetch: &[String]) -> Value {
    if fetch.is_empty() {
        return raw;
    }

    let keep: Vec<&str> = fetch
        .iter()
        .filter_map(|f| f.split_once('.').map(|(_, field)| field))
        .collect();

    if let Some(Value::Object(data)) = raw.get_mut("data") {
        data.retain(|name, _| keep.contains(&name.as_str()));
    }
    raw
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn query(
        &self,
        predicate: &Predicate,
        options: &QueryOptions,
    ) -> Result<QueryResponse, SourceError> {
        if options.page_size == 0 {
            return Err(SourceError::InvalidQuery(
                "page size must be greater than 0".to_string(),
            ));
        }

        let preview_ref = options.preview_ref.as_ref().map(|r| r.as_str());
        let mut docs: Vec<Document> = self
            .snapshot(preview_ref)?
            .into_iter()
            .filter(|raw| matches(predicate, raw))
            .map(|raw| parse_document(&project(raw, &options.fetch)))
            .collect::<Result<_, _>>()?;

        if let Some(ordering) = options.orderings {
            // Unpublished documents sort after published ones in either direction
            docs.sort_by(|a, b| {
                let by_date = match (a.first_publication_date, b.first_publication_date) {
                    (Some(x), Some(y)) => match ordering.direction {
                        SortDirection::Asc => x.cmp(&y),
                        SortDirection::Desc => y.cmp(&x),
                    },
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                by_date.then_with(|| a.id.cmp(&b.id))
            });
        }

        let start = match options.after {
            Some(ref cursor) => match docs.iter().position(|d| d.id == cursor.as_str()) {
                Some(pos) => pos + 1,
                None => docs.len(),
            },
            None => 0,
        };

        let remaining = docs.len().saturating_sub(start);
        let results: Vec<Document> = docs
            .into_iter()
            .skip(start)
            .take(options.page_size)
            .collect();

        let next_page = if remaining > options.page_size {
            results.last().map(|d| Cursor::new(d.id.clone()))
        } else {
            None
        };

        tracing::debug!(
            "Memory query {} returned {} documents (more: {})",
            predicate.to_query(),
            results.len(),
            next_page.is_some()
        );

        Ok(QueryResponse { results, next_page })
    }
}
