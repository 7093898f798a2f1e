use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tantivy::tokenizer::Language;
use tracing_subscriber::EnvFilter;

use blogmirror::config::AppConfig;
use blogmirror::crawl::{CrawlEngine, CrawlOptions, RemoteClient};
use blogmirror::enrich::{CaptionStore, EnrichmentQueue};
use blogmirror::index::{BlogReader, IndexOptions};
use blogmirror::query::{SearchRequest, SortOrder, search};
use blogmirror::rebuild::RebuildEngine;

#[derive(Parser)]
#[command(name = "blogmirror", about = "Mirror and search blogs locally", version)]
struct Cli {
    /// Root directory for indexes and the caption store.
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    /// Remote API credential. Falls back to $BLOGMIRROR_API_KEY.
    #[arg(long, global = true, env = "BLOGMIRROR_API_KEY")]
    api_key: Option<String>,

    /// Stemming language for free-text analysis (e.g. "english").
    #[arg(long, global = true)]
    stemmer: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize a blog into its local index.
    Index(IndexArgs),
    /// Search a blog's index.
    Search(SearchArgs),
    /// Re-derive every document of a blog from stored payloads.
    Rebuild { blog: String },
    /// Show caption queue state counts.
    QueueStats,
}

#[derive(Args)]
struct IndexArgs {
    blog: String,
    /// Only index posts published after this unix timestamp.
    #[arg(long)]
    since: Option<i64>,
    /// Resume a backfill: only index posts published before this.
    #[arg(long)]
    until: Option<i64>,
    /// Walk the entire post stream even if the index is non-empty.
    #[arg(long)]
    full: bool,
    /// Re-index exactly these post ids.
    #[arg(long = "post-id")]
    post_ids: Vec<u64>,
    /// Disable inter-request throttling.
    #[arg(long)]
    no_throttle: bool,
}

#[derive(Args)]
struct SearchArgs {
    blog: String,
    /// Query terms, joined with spaces.
    #[arg(required = true)]
    query: Vec<String>,
    #[arg(long, default_value = "newest", value_parser = parse_sort)]
    sort: SortOrder,
    #[arg(long, default_value_t = 0)]
    offset: usize,
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

fn parse_sort(s: &str) -> Result<SortOrder, String> {
    match s {
        "newest" => Ok(SortOrder::Newest),
        "oldest" => Ok(SortOrder::Oldest),
        "relevance" => Ok(SortOrder::Relevance),
        other => Err(format!(
            "unknown sort '{other}' (expected newest, oldest, or relevance)"
        )),
    }
}

fn parse_stemmer(s: &str) -> Result<Language> {
    match s.to_ascii_lowercase().as_str() {
        "arabic" => Ok(Language::Arabic),
        "danish" => Ok(Language::Danish),
        "dutch" => Ok(Language::Dutch),
        "english" => Ok(Language::English),
        "finnish" => Ok(Language::Finnish),
        "french" => Ok(Language::French),
        "german" => Ok(Language::German),
        "greek" => Ok(Language::Greek),
        "hungarian" => Ok(Language::Hungarian),
        "italian" => Ok(Language::Italian),
        "norwegian" => Ok(Language::Norwegian),
        "portuguese" => Ok(Language::Portuguese),
        "romanian" => Ok(Language::Romanian),
        "russian" => Ok(Language::Russian),
        "spanish" => Ok(Language::Spanish),
        "swedish" => Ok(Language::Swedish),
        "tamil" => Ok(Language::Tamil),
        "turkish" => Ok(Language::Turkish),
        other => anyhow::bail!("unsupported stemming language '{other}'"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let stemming = cli.stemmer.as_deref().map(parse_stemmer).transpose()?;
    let index_options = IndexOptions { stemming };

    let mut builder = AppConfig::builder().data_dir(&cli.data_dir);
    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key);
    }
    let config = builder.build();

    match cli.command {
        Command::Index(args) => {
            let source = RemoteClient::new(&config)?;
            let store = CaptionStore::open(config.data_dir()).await?;
            let queue = EnrichmentQueue::new(store, &config, index_options.clone());
            let engine = CrawlEngine::new(config.clone(), source, Some(queue));

            let options = CrawlOptions {
                since: args.since,
                until: args.until,
                full: args.full,
                post_ids: args.post_ids,
                throttle: args.no_throttle.then_some(false),
                stemming,
            };
            let report = engine
                .run(&args.blog, &options)
                .await
                .with_context(|| format!("failed to sync '{}'", args.blog))?;
            if report.unchanged {
                println!("{}: unchanged", args.blog);
            } else {
                println!(
                    "{}: indexed {} posts over {} pages",
                    args.blog, report.indexed, report.pages
                );
            }
        }
        Command::Search(args) => {
            let reader = BlogReader::open(config.data_dir(), &args.blog, &index_options)?;
            let request = SearchRequest {
                query: args.query.join(" "),
                sort: args.sort,
                offset: args.offset,
                limit: args.limit,
            };
            match search(&reader, &request) {
                Ok(response) => {
                    eprintln!(
                        "~{} matches (offset {}, limit {})",
                        response.meta.matches, response.meta.offset, response.meta.limit
                    );
                    for post in response.posts {
                        println!("{}", serde_json::to_string(&post)?);
                    }
                }
                Err(e) if e.is_parse_error() => {
                    eprintln!("query error: {e}");
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Rebuild { blog } => {
            let store = CaptionStore::open(config.data_dir()).await?;
            let queue = EnrichmentQueue::new(store, &config, index_options.clone());
            let engine = RebuildEngine::new(config.clone(), Some(queue));
            let report = engine
                .run(&blog, &index_options)
                .await
                .with_context(|| format!("failed to rebuild '{blog}'"))?;
            println!("{blog}: rebuilt {} documents", report.rebuilt);
        }
        Command::QueueStats => {
            let store = CaptionStore::open(config.data_dir()).await?;
            let stats = store.stats().await?;
            println!(
                "available: {}\nassigned: {}\ncaptioned: {}\nerror: {}",
                stats.available, stats.assigned, stats.captioned, stats.error
            );
        }
    }

    Ok(())
}
