//! Rendering of structured rich text to plain text and HTML

use super::document::{BlockKind, RichTextBlock, Span, SpanKind};
use crate::helpers::html_escape;

/// Plain-text rendering: block texts joined with a space, formatting dropped
pub fn as_text(blocks: &[RichTextBlock]) -> String {
    blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// HTML rendering; consecutive list items are wrapped in `<ul>` / `<ol>`
pub fn as_html(blocks: &[RichTextBlock]) -> String {
    let mut html = String::new();
    let mut open_list: Option<&'static str> = None;

    for block in blocks {
        let list_tag = match block.kind {
            BlockKind::ListItem => Some("ul"),
            BlockKind::OrderedListItem => Some("ol"),
            _ => None,
        };

        if open_list != list_tag {
            if let Some(tag) = open_list {
                html.push_str(&format!("</{}>", tag));
            }
            if let Some(tag) = list_tag {
                html.push_str(&format!("<{}>", tag));
            }
            open_list = list_tag;
        }

        let inner = render_spans(&block.text, &block.spans);
        match &block.kind {
            BlockKind::Paragraph | BlockKind::Other(_) => {
                html.push_str(&format!("<p>{}</p>", inner))
            }
            BlockKind::Heading(level) => {
                html.push_str(&format!("<h{0}>{1}</h{0}>", level, inner))
            }
            BlockKind::ListItem | BlockKind::OrderedListItem => {
                html.push_str(&format!("<li>{}</li>", inner))
            }
            BlockKind::Preformatted => html.push_str(&format!("<pre>{}</pre>", inner)),
        }
    }

    if let Some(tag) = open_list {
        html.push_str(&format!("</{}>", tag));
    }

    html
}

fn open_tag(kind: &SpanKind) -> String {
    match kind {
        SpanKind::Strong => "<strong>".to_string(),
        SpanKind::Em => "<em>".to_string(),
        SpanKind::Hyperlink { url } => format!(
            r#"<a href="{}" target="_blank" rel="noopener">"#,
            html_escape(url)
        ),
        SpanKind::Label(label) => format!(r#"<span class="{}">"#, html_escape(label)),
        SpanKind::Other(_) => "<span>".to_string(),
    }
}

fn close_tag(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Strong => "</strong>",
        SpanKind::Em => "</em>",
        SpanKind::Hyperlink { .. } => "</a>",
        SpanKind::Label(_) | SpanKind::Other(_) => "</span>",
    }
}

/// A span with its offsets moved from UTF-16 code units to char indices
struct Mark<'a> {
    start: usize,
    end: usize,
    kind: &'a SpanKind,
}

/// Char index of each UTF-16 offset boundary; the last entry is the text length
fn utf16_boundaries(chars: &[char]) -> Vec<usize> {
    let mut bounds = Vec::with_capacity(chars.len() + 1);
    let mut unit = 0;
    bounds.push(0);
    for c in chars {
        unit += c.len_utf16();
        bounds.push(unit);
    }
    bounds
}

/// Apply inline spans to `text`, escaping it on the way
///
/// Span offsets count UTF-16 code units, as the content API does. An offset
/// inside a surrogate pair snaps to the end of that char. Overlapping spans
/// that do not nest are split so the output stays well formed. Spans outside
/// the text are ignored.
fn render_spans(text: &str, spans: &[Span]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let bounds = utf16_boundaries(&chars);
    let units = bounds[bounds.len() - 1];
    let to_char = |unit: usize| bounds.partition_point(|&b| b < unit);

    let mut marks: Vec<Mark> = spans
        .iter()
        .filter(|s| s.start < s.end && s.end <= units)
        .map(|s| Mark {
            start: to_char(s.start),
            end: to_char(s.end),
            kind: &s.kind,
        })
        .filter(|m| m.start < m.end)
        .collect();
    marks.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out = String::with_capacity(text.len());
    let mut open: Vec<&Mark> = Vec::new();
    let mut next = 0;

    for pos in 0..=chars.len() {
        if open.iter().any(|m| m.end == pos) {
            let mut reopen = Vec::new();
            while let Some(mark) = open.pop() {
                out.push_str(close_tag(mark.kind));
                if mark.end != pos {
                    reopen.push(mark);
                }
            }
            for mark in reopen.into_iter().rev() {
                out.push_str(&open_tag(mark.kind));
                open.push(mark);
            }
        }

        while next < marks.len() && marks[next].start == pos {
            out.push_str(&open_tag(marks[next].kind));
            open.push(&marks[next]);
            next += 1;
        }

        if let Some(&c) = chars.get(pos) {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                '\n' => out.push_str("<br />"),
                c => out.push(c),
            }
        }
    }

    out
}
