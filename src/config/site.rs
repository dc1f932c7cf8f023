//! Site configuration (_config.yml)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::helpers::DateLocale;

/// Environment variable that overrides `source.access_token`
pub const ACCESS_TOKEN_ENV: &str = "PRISMIC_ACCESS_TOKEN";

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub language: String,
    pub timezone: String,

    // Date / Time format
    pub date_format: String,
    pub time_format: String,

    // Content API
    #[serde(default)]
    pub source: SourceConfig,

    // Home page
    #[serde(default)]
    pub listing: ListingConfig,

    // Regeneration
    pub revalidate_secs: u64,

    // Comments widget
    #[serde(default)]
    pub comments: CommentsConfig,

    // Static export
    pub public_dir: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "spacetraveling".to_string(),
            language: "pt-BR".to_string(),
            timezone: "UTC".to_string(),

            date_format: "dd MMM yyyy".to_string(),
            time_format: "HH:mm".to_string(),

            source: SourceConfig::default(),
            listing: ListingConfig::default(),

            revalidate_secs: 60 * 60 * 24,

            comments: CommentsConfig::default(),

            public_dir: "public".to_string(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file (YAML, or TOML by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;

        let mut config: SiteConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse config {:?}", path))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config {:?}", path))?,
        };

        config.apply_env();
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Pick up secrets from the environment
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                self.source.access_token = Some(token);
            }
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.listing.per_page == 0 {
            anyhow::bail!("listing.per_page must be greater than 0");
        }
        if self.date_locale().is_none() {
            anyhow::bail!(
                "Unsupported language: {}. Available: pt-BR, en-US",
                self.language
            );
        }
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            anyhow::bail!("Unknown timezone: {}", self.timezone);
        }
        Ok(())
    }

    /// Locale used for month names
    pub fn date_locale(&self) -> Option<DateLocale> {
        DateLocale::from_tag(&self.language)
    }

    /// Time zone used when rendering dates
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// How long a materialized detail page stays fresh
    pub fn revalidate(&self) -> Duration {
        Duration::from_secs(self.revalidate_secs)
    }

    /// How long a listing page stays fresh, if it ever goes stale
    pub fn listing_revalidate(&self) -> Option<Duration> {
        self.listing.revalidate_secs.map(Duration::from_secs)
    }
}

/// Content API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Repository API endpoint, e.g. `https://my-repo.cdn.prismic.io/api/v2`
    pub endpoint: String,
    pub access_token: Option<String>,
    /// JSON dump of documents; when set, the in-memory store is used instead of HTTP
    pub fixture: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_token: None,
            fixture: None,
            timeout_secs: 10,
        }
    }
}

/// Listing page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub per_page: usize,
    /// Number of post slugs known at build time
    pub prerender_count: usize,
    /// Listing pages never go stale when unset
    pub revalidate_secs: Option<u64>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            per_page: 2,
            prerender_count: 1,
            revalidate_secs: None,
        }
    }
}

/// Utterances comment widget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    pub enable: bool,
    pub repo: String,
    pub issue_term: String,
    pub label: String,
    pub theme: String,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            repo: String::new(),
            issue_term: "pathname".to_string(),
            label: "Comments".to_string(),
            theme: "github-dark".to_string(),
        }
    }
}
