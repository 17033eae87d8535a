mod enrich;
mod error;
mod extract;
mod fetch;
mod gate;
mod model;
mod pipeline;
mod settings;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use fetch::HttpFetcher;
use gate::Pacer;
use pipeline::{truncate, ContributorOptions, EnrichOptions};
use settings::Settings;
use store::DatasetStore;

#[derive(Parser)]
#[command(name = "repo_scraper", about = "Refresh a tool catalog from GitHub repository pages")]
struct Cli {
    /// Config file (default: ./scraper.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dataset file, overrides the configured one
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every repository concurrently and merge the results
    Scrape {
        /// Max simultaneous fetches
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,
        /// Where to write the raw scrape results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Refresh star counts sequentially, in batches
    Stars {
        /// Max repositories to refresh (default: all)
        #[arg(short = 'n', long)]
        max: Option<usize>,
        /// Repositories per batch
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
    /// Scrape contributor avatars from repository pages
    Contributors {
        /// Only the N most-starred tools
        #[arg(long)]
        top: Option<usize>,
        /// Re-scrape tools that already list contributors
        #[arg(long)]
        force: bool,
        /// Fall back to the repository owner (labeled low confidence)
        #[arg(long)]
        owner_fallback: bool,
    },
    /// Assign the repository owner to tools without contributors (offline)
    Owners,
    /// Derive category and tags from existing fields (offline)
    Enrich {
        /// Recompute tools that already have a category
        #[arg(long)]
        force: bool,
        /// Rewrite display names from the repository name
        #[arg(long)]
        names: bool,
    },
    /// Remove tools by id (writes a .backup first)
    Prune {
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,
    },
    /// Show the most popular tools and duplicate URLs
    Top {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    apply_overrides(&mut settings, &cli);
    settings.validate()?;

    let result = match cli.command {
        Commands::Scrape { .. } => {
            let mut store = open_store(&settings)?;
            if store.is_empty() {
                println!("No tools in {}.", store.path().display());
                return Ok(());
            }
            let fetcher = Arc::new(HttpFetcher::new(&settings)?);
            println!(
                "Scraping {} tools ({} concurrent, cache {})",
                store.len(),
                settings.concurrency,
                fetcher.cache().dir().display()
            );

            let summary = pipeline::scrape_all(&mut store, fetcher, &settings).await?;
            print_scrape_summary(&summary);
            println!("\nSaved:");
            println!("  dataset:   {}", store.path().display());
            println!("  raw data:  {}", settings.raw_output.display());
            Ok(())
        }
        Commands::Stars { max, .. } => {
            let mut store = open_store(&settings)?;
            let fetcher = HttpFetcher::new(&settings)?;
            let pacer = Pacer::from_settings(&settings);
            let summary =
                pipeline::refresh_stars(&mut store, &fetcher, &settings, &pacer, max).await?;

            println!(
                "\nUpdated {} repositories ({} failed).",
                summary.updated, summary.failed
            );
            print_top(&store, 15);
            Ok(())
        }
        Commands::Contributors {
            top,
            force,
            owner_fallback,
        } => {
            let mut store = open_store(&settings)?;
            let fetcher = HttpFetcher::new(&settings)?;
            let opts = ContributorOptions {
                top,
                force,
                owner_fallback,
            };
            let summary =
                pipeline::refresh_contributors(&mut store, &fetcher, &settings, &opts).await?;

            println!("\nContributors update complete:");
            println!("  updated: {}", summary.updated);
            println!("  failed:  {}", summary.failed);
            println!("  skipped: {}", summary.skipped);
            Ok(())
        }
        Commands::Owners => {
            let mut store = open_store(&settings)?;
            let assigned = pipeline::assign_owners(&mut store)?;
            println!("\nAssigned owner fallback to {} of {} tools.", assigned, store.len());
            Ok(())
        }
        Commands::Enrich { force, names } => {
            let mut store = open_store(&settings)?;
            let summary = pipeline::enrich_all(&mut store, &EnrichOptions { force, names })?;
            println!(
                "\nEnriched {} tools ({} kept their category, {} invalid).",
                summary.updated, summary.skipped, summary.failed
            );
            Ok(())
        }
        Commands::Prune { ids } => {
            let mut store = open_store(&settings)?;
            let before = store.len();
            let backup = store.backup()?;
            println!("Backup: {}", backup.display());

            let removed = store.remove_ids(&ids);
            for tool in &removed {
                println!("  removed {}: {} ({})", tool.id(), tool.name(), tool.github_url());
            }
            store.flush()?;
            println!("{} → {} tools", before, store.len());
            print_top(&store, 10);
            Ok(())
        }
        Commands::Top { limit } => {
            let store = open_store(&settings)?;
            print_top(&store, limit);

            let dups = store.duplicate_urls();
            if !dups.is_empty() {
                println!("\n--- Duplicate URLs ---");
                for (url, ids) in &dups {
                    let ids: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
                    println!("  {}: ids {}", url, ids.join(", "));
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Command-line flags win over file and environment settings.
fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(data) = &cli.data {
        settings.data_file = data.clone();
    }
    match &cli.command {
        Commands::Scrape {
            concurrency,
            output,
        } => {
            if let Some(c) = concurrency {
                settings.concurrency = *c;
            }
            if let Some(o) = output {
                settings.raw_output = o.clone();
            }
        }
        Commands::Stars {
            batch_size: Some(b),
            ..
        } => settings.batch_size = *b,
        _ => {}
    }
}

fn open_store(settings: &Settings) -> anyhow::Result<DatasetStore> {
    DatasetStore::load(&settings.data_file)
        .with_context(|| format!("Failed to open {}", settings.data_file.display()))
}

fn print_scrape_summary(summary: &pipeline::ScrapeSummary) {
    let total_stars: u64 = summary.results.iter().map(|r| r.stars).sum();
    let avg = if summary.results.is_empty() {
        0.0
    } else {
        total_stars as f64 / summary.results.len() as f64
    };

    println!("\nScraped {} repositories:", summary.attempted);
    println!("  ok:          {}", summary.results.len());
    println!("  failed:      {}", summary.failed);
    println!("  tools updated: {}", summary.updated);
    println!("  total stars: {}", total_stars);
    println!("  avg stars:   {:.1}", avg);

    let mut top: Vec<_> = summary.results.iter().collect();
    top.sort_by(|a, b| b.stars.cmp(&a.stars));
    if !top.is_empty() {
        println!("\nTop {} repositories:", top.len().min(10));
        for (i, r) in top.iter().take(10).enumerate() {
            println!("  {:>2}. {:<30} {:>8}", i + 1, truncate(&r.slug, 30), r.stars);
        }
    }
}

fn print_top(store: &DatasetStore, n: usize) {
    println!("\n{:>3} | {:<40} | {:>8} | {:<12}", "#", "Tool", "Stars", "Language");
    println!("{}", "-".repeat(72));
    for (i, tool) in store.top(n).iter().enumerate() {
        println!(
            "{:>3} | {:<40} | {:>8} | {:<12}",
            i + 1,
            truncate(tool.name(), 40),
            tool.stars(),
            truncate(tool.language(), 12)
        );
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
