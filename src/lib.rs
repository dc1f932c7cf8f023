//! spacetravelling: a blog built from a headless content API
//!
//! Posts are pulled from a content source, shaped into listing and post
//! views, and served either by the regenerating HTTP server or as a static
//! JSON export.

pub mod cache;
pub mod commands;
pub mod comments;
pub mod config;
pub mod content;
pub mod helpers;
pub mod pages;
pub mod server;
pub mod source;
pub mod view;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Config files looked up in the base directory, in order
const CONFIG_FILES: [&str; 2] = ["_config.yml", "_config.toml"];

/// The main blog application
#[derive(Clone)]
pub struct Blog {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
}

impl Blog {
    /// Create a blog from a directory, reading its config file if any
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        Self::load(base_dir, None)
    }

    /// Create a blog from a directory and an explicit config file
    pub fn load<P: AsRef<Path>>(base_dir: P, config_path: Option<&Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        let config_path = match config_path {
            Some(path) => Some(base_dir.join(path)),
            None => CONFIG_FILES
                .iter()
                .map(|name| base_dir.join(name))
                .find(|path| path.exists()),
        };

        let config = match config_path {
            Some(path) => config::SiteConfig::load(&path)?,
            None => {
                tracing::debug!("No config file in {:?}, using defaults", base_dir);
                let mut config = config::SiteConfig::default();
                config.apply_env();
                config
            }
        };

        Ok(Self::with_config(base_dir, config))
    }

    /// Create a blog from an already loaded configuration
    pub fn with_config<P: AsRef<Path>>(base_dir: P, config: config::SiteConfig) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let public_dir = base_dir.join(&config.public_dir);
        Self {
            config,
            base_dir,
            public_dir,
        }
    }

    /// Page materializer over the configured content source
    pub fn materializer(&self) -> Result<pages::Materializer> {
        let mut source_config = self.config.source.clone();
        // Fixture paths are relative to the site directory
        source_config.fixture = source_config.fixture.map(|f| self.base_dir.join(f));
        let source = source::from_config(&source_config)?;
        Ok(pages::Materializer::new(source, &self.config))
    }

    /// Export every page as JSON
    pub async fn generate(&self) -> Result<()> {
        commands::generate::run(self).await
    }

    /// Clean the public directory
    pub fn clean(&self) -> Result<()> {
        commands::clean::run(self)
    }
}
