//! Validation boundary between untyped API payloads and [`Document`]
//!
//! The content API answers with loosely-typed JSON. Everything that enters the
//! pipeline passes through [`parse_document`], which:
//!
//! - requires the identity fields `id` and `uid`,
//! - treats absent or `null` optional fields as empty,
//! - rejects values of the wrong shape with [`SourceError::Malformed`].
//!
//! Text fields are accepted either as plain strings or as rich-text arrays,
//! whose block texts are joined with a space.

use serde_json::{Map, Value};

use super::document::{
    Banner, BlockKind, ContentBlock, Document, PostData, RichTextBlock, Span, SpanKind,
};
use crate::helpers::parse_timestamp;
use crate::source::SourceError;

type Result<T> = std::result::Result<T, SourceError>;

fn malformed(path: &str, message: impl Into<String>) -> SourceError {
    SourceError::Malformed {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Convert one raw API document into a [`Document`]
pub fn parse_document(raw: &Value) -> Result<Document> {
    let obj = raw
        .as_object()
        .ok_or_else(|| malformed("document", "expected an object"))?;

    let id = required_string(obj, "id")?;
    let uid = required_string(obj, "uid")?;
    let path = format!("document {:?}", uid);

    let doc_type = match obj.get("type") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(malformed(&format!("{}.type", path), "expected a string")),
    };

    let first_publication_date = optional_timestamp(obj, "first_publication_date", &path)?;
    let last_publication_date = optional_timestamp(obj, "last_publication_date", &path)?;

    let data = match obj.get("data") {
        None | Some(Value::Null) => PostData::default(),
        Some(Value::Object(data)) => parse_post_data(data, &format!("{}.data", path))?,
        Some(_) => return Err(malformed(&format!("{}.data", path), "expected an object")),
    };

    Ok(Document {
        id,
        uid,
        doc_type,
        first_publication_date,
        last_publication_date,
        data,
    })
}

/// Convert a list of raw documents, failing on the first malformed one
pub fn parse_documents(raw: &[Value]) -> Result<Vec<Document>> {
    raw.iter().map(parse_document).collect()
}

fn required_string(obj: &Map<String, Value>, key: &str) -> Result<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(malformed(key, "must not be empty")),
        None | Some(Value::Null) => Err(malformed(key, "required identity field is missing")),
        Some(_) => Err(malformed(key, "expected a string")),
    }
}

fn optional_timestamp(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| malformed(&format!("{}.{}", path, key), format!("invalid timestamp {:?}", s))),
        Some(_) => Err(malformed(&format!("{}.{}", path, key), "expected a timestamp string")),
    }
}

fn parse_post_data(data: &Map<String, Value>, path: &str) -> Result<PostData> {
    let banner = match data.get("banner") {
        None | Some(Value::Null) => None,
        Some(Value::Object(banner)) => match banner.get("url") {
            Some(Value::String(url)) if !url.is_empty() => Some(Banner {
                url: url.clone(),
                alt: banner.get("alt").and_then(Value::as_str).map(str::to_string),
            }),
            // An empty image field comes back as `{}`
            None | Some(Value::Null) | Some(Value::String(_)) => None,
            Some(_) => return Err(malformed(&format!("{}.banner.url", path), "expected a string")),
        },
        Some(_) => return Err(malformed(&format!("{}.banner", path), "expected an object")),
    };

    let content = match data.get("content") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .enumerate()
            .map(|(i, b)| parse_content_block(b, &format!("{}.content[{}]", path, i)))
            .collect::<Result<_>>()?,
        Some(_) => return Err(malformed(&format!("{}.content", path), "expected an array")),
    };

    Ok(PostData {
        title: text_field(data.get("title"), &format!("{}.title", path))?,
        subtitle: text_field(data.get("subtitle"), &format!("{}.subtitle", path))?,
        author: text_field(data.get("author"), &format!("{}.author", path))?,
        banner,
        content,
    })
}

/// A key-text field (string) or a title/rich-text field (array of blocks)
fn text_field(value: Option<&Value>, path: &str) -> Result<String> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(_)) => {
            let blocks = rich_text(value, path)?;
            Ok(super::richtext::as_text(&blocks))
        }
        Some(_) => Err(malformed(path, "expected text")),
    }
}

fn parse_content_block(value: &Value, path: &str) -> Result<ContentBlock> {
    let obj = value
        .as_object()
        .ok_or_else(|| malformed(path, "expected an object"))?;

    Ok(ContentBlock {
        heading: text_field(obj.get("heading"), &format!("{}.heading", path))?,
        body: rich_text(obj.get("body"), &format!("{}.body", path))?,
    })
}

fn rich_text(value: Option<&Value>, path: &str) -> Result<Vec<RichTextBlock>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(Value::String(s)) => return Ok(vec![RichTextBlock::paragraph(s.clone())]),
        Some(_) => return Err(malformed(path, "expected rich text")),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_rich_text_block(item, &format!("{}[{}]", path, i)))
        .collect()
}

fn parse_rich_text_block(value: &Value, path: &str) -> Result<RichTextBlock> {
    let obj = value
        .as_object()
        .ok_or_else(|| malformed(path, "expected an object"))?;

    let kind = match obj.get("type") {
        None | Some(Value::Null) => BlockKind::Paragraph,
        Some(Value::String(t)) => BlockKind::from_api(t),
        Some(_) => return Err(malformed(&format!("{}.type", path), "expected a string")),
    };

    let text = match obj.get("text") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(t)) => t.clone(),
        Some(_) => return Err(malformed(&format!("{}.text", path), "expected a string")),
    };

    let spans = match obj.get("spans") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(spans)) => spans
            .iter()
            .enumerate()
            .map(|(i, s)| parse_span(s, &format!("{}.spans[{}]", path, i)))
            .collect::<Result<_>>()?,
        Some(_) => return Err(malformed(&format!("{}.spans", path), "expected an array")),
    };

    Ok(RichTextBlock { kind, text, spans })
}

fn parse_span(value: &Value, path: &str) -> Result<Span> {
    let obj = value
        .as_object()
        .ok_or_else(|| malformed(path, "expected an object"))?;

    let offset = |key: &str| {
        obj.get(key)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| malformed(&format!("{}.{}", path, key), "expected a non-negative integer"))
    };
    let start = offset("start")?;
    let end = offset("end")?;
    if end < start {
        return Err(malformed(path, format!("span end {} before start {}", end, start)));
    }

    let data = obj.get("data");
    let kind = match obj.get("type").and_then(Value::as_str) {
        Some("strong") => SpanKind::Strong,
        Some("em") => SpanKind::Em,
        Some("hyperlink") => SpanKind::Hyperlink {
            url: data
                .and_then(|d| d.get("url"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        Some("label") => SpanKind::Label(
            data.and_then(|d| d.get("label"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some(other) => SpanKind::Other(other.to_string()),
        None => return Err(malformed(&format!("{}.type", path), "missing span type")),
    };

    Ok(Span { start, end, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_parse_full_document() {
        let raw = json!({
            "id": "YFzXkBIAACMAqVGp",
            "uid": "mars-trip",
            "type": "post",
            "first_publication_date": "2023-01-10T10:00:00+0000",
            "last_publication_date": "2023-01-12T08:30:00+0000",
            "data": {
                "title": "Trip to Mars",
                "subtitle": "Pack light",
                "author": "Ada",
                "banner": { "url": "https://images.example/mars.png", "alt": null },
                "content": [{
                    "heading": "Intro to Mars",
                    "body": [{
                        "type": "paragraph",
                        "text": "Red and dusty",
                        "spans": [{ "start": 0, "end": 3, "type": "strong" }]
                    }]
                }]
            }
        });

        let doc = parse_document(&raw).unwrap();
        assert_eq!(doc.id, "YFzXkBIAACMAqVGp");
        assert_eq!(doc.uid, "mars-trip");
        assert_eq!(doc.doc_type, "post");
        assert_eq!(
            doc.first_publication_date,
            Some(Utc.with_ymd_and_hms(2023, 1, 10, 10, 0, 0).unwrap())
        );
        assert_eq!(doc.data.title, "Trip to Mars");
        assert_eq!(doc.data.banner.as_ref().unwrap().url, "https://images.example/mars.png");
        assert_eq!(doc.data.content.len(), 1);
        assert_eq!(doc.data.content[0].body[0].spans[0].kind, SpanKind::Strong);
    }

    #[test]
    fn test_absent_optional_fields_are_empty() {
        let raw = json!({ "id": "X1", "uid": "bare", "data": { "banner": {} } });
        let doc = parse_document(&raw).unwrap();
        assert_eq!(doc.data, PostData::default());
        assert!(doc.first_publication_date.is_none());

        let raw = json!({ "id": "X2", "uid": "no-data" });
        assert!(parse_document(&raw).unwrap().data.content.is_empty());
    }

    #[test]
    fn test_rich_text_title_is_flattened() {
        let raw = json!({
            "id": "X3",
            "uid": "rich-title",
            "data": { "title": [{ "type": "heading1", "text": "Hello", "spans": [] }] }
        });
        assert_eq!(parse_document(&raw).unwrap().data.title, "Hello");
    }

    #[test]
    fn test_missing_identity_fails_fast() {
        let err = parse_document(&json!({ "id": "X4", "data": {} })).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { ref path, .. } if path == "uid"));

        let err = parse_document(&json!({ "uid": "no-id" })).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { ref path, .. } if path == "id"));

        assert!(parse_document(&json!("not a document")).is_err());
    }

    #[test]
    fn test_wrong_shapes_are_malformed() {
        let raw = json!({ "id": "X5", "uid": "bad", "data": { "content": "oops" } });
        let err = parse_document(&raw).unwrap_err();
        assert!(
            matches!(err, SourceError::Malformed { ref path, .. } if path == "document \"bad\".data.content")
        );

        let raw = json!({ "id": "X6", "uid": "bad-date", "first_publication_date": "soon" });
        assert!(parse_document(&raw).is_err());

        let raw = json!({
            "id": "X7",
            "uid": "bad-span",
            "data": { "content": [{ "body": [{ "text": "x", "spans": [{ "start": 3, "end": 1, "type": "em" }] }] }] }
        });
        assert!(parse_document(&raw).is_err());
    }
}
