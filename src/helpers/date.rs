//! Date helper functions

use chrono::{DateTime, TimeZone};
use std::fmt::Write;

/// Locales available for date rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLocale {
    PtBr,
    EnUs,
}

impl DateLocale {
    /// Parse a language tag such as `pt-BR` or `en_US`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.replace('_', "-").to_ascii_lowercase().as_str() {
            "pt-br" | "pt" => Some(Self::PtBr),
            "en-us" | "en" => Some(Self::EnUs),
            _ => None,
        }
    }

    fn chrono_locale(self) -> chrono::Locale {
        match self {
            Self::PtBr => chrono::Locale::pt_BR,
            Self::EnUs => chrono::Locale::en_US,
        }
    }
}

/// Format a date with a date-fns style pattern
///
/// The pattern is translated to a chrono format string and rendered with the
/// locale's month names. Anything inside single quotes is copied verbatim.
/// Moment-style upper-case `YYYY` and `DD` are accepted as well.
///
/// # Examples
/// ```ignore
/// format_date(&date, "dd MMM yyyy", DateLocale::PtBr) // -> "10 jan 2023"
/// ```
pub fn format_date<Tz: TimeZone>(date: &DateTime<Tz>, pattern: &str, locale: DateLocale) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let chrono_format = date_fns_to_chrono_format(pattern);
    let mut out = String::new();
    if write!(out, "{}", date.format_localized(&chrono_format, locale.chrono_locale())).is_err() {
        tracing::warn!("Cannot render date pattern {:?}", pattern);
        return pattern.to_string();
    }
    out
}

/// Convert a date-fns pattern to a chrono format string
fn date_fns_to_chrono_format(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            let end = chars[i + 1..]
                .iter()
                .position(|&q| q == '\'')
                .map(|p| i + 1 + p)
                .unwrap_or(chars.len());
            for &lit in &chars[i + 1..end] {
                push_literal(&mut out, lit);
            }
            i = end + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let specifier = match (c, run) {
            ('y' | 'Y', 2) => "%y",
            ('y' | 'Y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d' | 'D', 1) => "%-d",
            ('d' | 'D', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            _ => "",
        };
        if specifier.is_empty() {
            (0..run).for_each(|_| out.push(c));
        } else {
            out.push_str(specifier);
        }
        i += run;
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Format a date in ISO 8601 / XML format
pub fn date_xml<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Parse a timestamp as emitted by the content API
///
/// Accepts RFC 3339 as well as the colon-less offset form
/// (`2021-03-25T19:25:28+0000`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<chrono::Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|d| d.with_timezone(&chrono::Utc))
}
