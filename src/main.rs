//! CLI entry point for spacetravelling

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spacetravelling")]
#[command(version = "0.1.0")]
#[command(about = "A blog built from a headless content API", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Config file, relative to the base directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one page of the post listing
    #[command(alias = "l")]
    List {
        /// Cursor printed by the previous page
        #[arg(short, long)]
        after: Option<String>,
    },

    /// Print the materialized page of one post
    Show {
        /// Post slug
        slug: String,

        /// Preview ref for unpublished drafts
        #[arg(short, long = "ref")]
        preview_ref: Option<String>,
    },

    /// Print the post slugs built ahead of time
    Paths,

    /// Export listing and post pages as JSON
    #[command(alias = "g")]
    Generate,

    /// Start the regenerating server
    #[command(alias = "s")]
    Server {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// IP address to bind to
        #[arg(short, long, default_value = "localhost")]
        ip: String,
    },

    /// Clean the public folder
    Clean,

    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "spacetravelling=debug,tower_http=debug,info"
    } else {
        "spacetravelling=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };

    let config_path = cli.config;
    let load = || spacetravelling::Blog::load(&base_dir, config_path.as_deref());

    match cli.command {
        Commands::List { after } => {
            let blog = load()?;
            spacetravelling::commands::list::run(&blog, after.as_deref()).await?;
        }

        Commands::Show { slug, preview_ref } => {
            let blog = load()?;
            spacetravelling::commands::show::run(&blog, &slug, preview_ref.as_deref()).await?;
        }

        Commands::Paths => {
            let blog = load()?;
            spacetravelling::commands::paths::run(&blog).await?;
        }

        Commands::Generate => {
            let blog = load()?;
            tracing::info!("Exporting pages...");
            blog.generate().await?;
            println!("Generated successfully!");
        }

        Commands::Server { port, ip } => {
            let blog = load()?;
            tracing::info!("Starting server at http://{}:{}", ip, port);
            spacetravelling::server::start(&blog, &ip, port).await?;
        }

        Commands::Clean => {
            let blog = load()?;
            tracing::info!("Cleaning public folder...");
            blog.clean()?;
            println!("Cleaned successfully!");
        }

        Commands::Version => {
            println!("spacetravelling version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
