use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::enrich;
use crate::error::FetchError;
use crate::extract::{self, contributors};
use crate::fetch::{slug, PageSource};
use crate::gate::{self, Pacer};
use crate::model::ScrapeResult;
use crate::settings::Settings;
use crate::store::{self, Checkpointer, DatasetStore};

pub struct ScrapeSummary {
    pub attempted: usize,
    pub updated: usize,
    pub failed: usize,
    pub results: Vec<ScrapeResult>,
}

/// Scrape every repository URL in the store with bounded concurrency, fold
/// the results back in, and persist both the dataset and the raw results.
pub async fn scrape_all(
    store: &mut DatasetStore,
    source: Arc<dyn PageSource>,
    settings: &Settings,
) -> Result<ScrapeSummary> {
    let urls = unique_urls(store);
    let attempted = urls.len();
    info!(
        "Scraping {} repositories, {} at a time",
        attempted, settings.concurrency
    );

    let pb = progress_bar(attempted)?;
    let outcomes = gate::run_bounded(urls, settings.concurrency, &pb, |url| {
        let source = Arc::clone(&source);
        async move {
            let outcome = scrape_one(source.as_ref(), &url).await;
            (url, outcome)
        }
    })
    .await;
    pb.finish_and_clear();

    let mut results = Vec::with_capacity(outcomes.len());
    let mut failed = 0usize;
    for (url, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                info!(
                    slug = %result.slug,
                    "✓ {} stars, {} forks, {}",
                    result.stars, result.forks, result.language
                );
                results.push(result);
            }
            Err(e) => {
                warn!(%url, transient = e.is_transient(), "✗ {}", e);
                failed += 1;
            }
        }
    }

    let updated = store.merge(&results);
    store.flush().context("Failed to persist dataset")?;
    store::write_json(&settings.raw_output, &results).context("Failed to write raw results")?;

    Ok(ScrapeSummary {
        attempted,
        updated,
        failed,
        results,
    })
}

/// Fetch and extract one repository page.
pub async fn scrape_one(source: &dyn PageSource, url: &str) -> Result<ScrapeResult, FetchError> {
    let slug = slug::repo_slug(url)?;
    let markup = source.fetch_page(url).await?;
    Ok(build_result(slug, url, &markup))
}

fn build_result(slug: String, url: &str, markup: &str) -> ScrapeResult {
    let fields = extract::repo_fields(markup);
    ScrapeResult {
        slug,
        url: url.to_string(),
        stars: fields.stars,
        forks: fields.forks,
        watchers: fields.watchers,
        description: fields.description,
        language: fields.language,
        topics: fields.topics,
        license: fields.license,
        last_commit: fields.last_commit,
        scraped_at: timestamp(),
    }
}

pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn unique_urls(store: &DatasetStore) -> Vec<String> {
    let mut seen = HashSet::new();
    store
        .tools
        .iter()
        .filter(|t| t.has_url())
        .map(|t| t.github_url().to_string())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

// ── Sequential maintenance flows ──

pub struct BatchSummary {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Stars only, one repository at a time, in fixed-size batches with a pause
/// between them.
pub async fn refresh_stars(
    store: &mut DatasetStore,
    source: &dyn PageSource,
    settings: &Settings,
    pacer: &Pacer,
    max: Option<usize>,
) -> Result<BatchSummary> {
    let ids: Vec<i64> = store
        .tools
        .iter()
        .filter(|t| t.has_url())
        .map(|t| t.id())
        .take(max.unwrap_or(usize::MAX))
        .collect();

    let batches: Vec<&[i64]> = ids.chunks(settings.batch_size.max(1)).collect();
    let mut checkpoint = Checkpointer::new(settings.checkpoint_every);
    let mut summary = BatchSummary {
        processed: 0,
        updated: 0,
        failed: 0,
        skipped: 0,
    };

    for (n, batch) in batches.iter().enumerate() {
        println!("\nBatch {}/{} ({} repos)", n + 1, batches.len(), batch.len());

        for &id in batch.iter() {
            let Some((name, url)) = name_and_url(store, id) else {
                summary.skipped += 1;
                continue;
            };

            let stars = match source.fetch_page(&url).await {
                Ok(markup) => extract::stars_in(&markup),
                Err(e) => {
                    warn!(%url, "{}", e);
                    None
                }
            };

            match (stars, store.tools.iter_mut().find(|t| t.id() == id)) {
                (Some(stars), Some(tool)) => {
                    let old = tool.stars();
                    tool.set_stars(stars);
                    summary.updated += 1;
                    if stars != old {
                        println!("  {:<30} {:>8} → {:<8}", truncate(&name, 30), old, stars);
                    } else {
                        println!("  {:<30} {:>8} (no change)", truncate(&name, 30), stars);
                    }
                }
                _ => {
                    summary.failed += 1;
                    println!("  {:<30} failed", truncate(&name, 30));
                }
            }

            checkpoint.tick(store)?;
        }

        if n + 1 < batches.len() {
            pacer.between_batches().await;
        }
    }

    checkpoint.finish(store).context("Failed to persist dataset")?;
    summary.processed = checkpoint.processed();
    Ok(summary)
}

pub struct ContributorOptions {
    /// Only the N most popular records.
    pub top: Option<usize>,
    /// Re-scrape records that already have contributors.
    pub force: bool,
    /// Use the repository owner when nothing is found on the page.
    pub owner_fallback: bool,
}

pub async fn refresh_contributors(
    store: &mut DatasetStore,
    source: &dyn PageSource,
    settings: &Settings,
    opts: &ContributorOptions,
) -> Result<BatchSummary> {
    let ids: Vec<i64> = match opts.top {
        Some(n) => store.top(n).into_iter().map(|t| t.id()).collect(),
        None => store.tools.iter().map(|t| t.id()).collect(),
    };
    let total = ids.len();
    let mut checkpoint = Checkpointer::new(settings.checkpoint_every);
    let mut summary = BatchSummary {
        processed: 0,
        updated: 0,
        failed: 0,
        skipped: 0,
    };

    for (i, id) in ids.into_iter().enumerate() {
        let Some(tool) = store.tools.iter().find(|t| t.id() == id) else {
            continue;
        };
        if !tool.has_url() {
            continue;
        }
        let label = format!("[{:>3}/{}] {}", i + 1, total, truncate(tool.name(), 50));
        if tool.contributor_count() > 0 && !opts.force {
            println!("{} (has {}, skipped)", label, tool.contributor_count());
            summary.skipped += 1;
            continue;
        }
        let url = tool.github_url().to_string();

        let mut found = match source.fetch_page(&url).await {
            Ok(markup) => contributors::extract(&markup, settings.max_contributors),
            Err(e) => {
                warn!(%url, "{}", e);
                Vec::new()
            }
        };
        if found.is_empty() && opts.owner_fallback {
            found.extend(contributors::owner_fallback(&url));
        }

        if found.is_empty() {
            println!("{} no contributors found", label);
            summary.failed += 1;
        } else {
            let logins: Vec<&str> = found.iter().map(|c| c.login.as_str()).collect();
            println!("{} {}", label, logins.join(", "));
            summary.updated += 1;
            if let Some(tool) = store.tools.iter_mut().find(|t| t.id() == id) {
                tool.set_contributors(&found)?;
            }
        }

        checkpoint.tick(store)?;
    }

    checkpoint.finish(store).context("Failed to persist dataset")?;
    summary.processed = checkpoint.processed();
    Ok(summary)
}

/// Offline: the labeled owner guess for every record without contributors.
pub fn assign_owners(store: &mut DatasetStore) -> Result<usize> {
    let mut assigned = 0;
    for tool in store.tools.iter_mut().filter(|t| t.has_url()) {
        if tool.contributor_count() > 0 {
            continue;
        }
        match contributors::owner_fallback(tool.github_url()) {
            Some(owner) => {
                println!("{:<50} → {}", truncate(tool.name(), 50), owner.login);
                tool.set_contributors(&[owner])?;
                assigned += 1;
            }
            None => println!("{:<50} invalid repository url", truncate(tool.name(), 50)),
        }
    }
    store.flush().context("Failed to persist dataset")?;
    Ok(assigned)
}

pub struct EnrichOptions {
    /// Recompute records that already have a category.
    pub force: bool,
    /// Also rewrite the display name from the repository name.
    pub names: bool,
}

/// Offline: derive category, tags and optionally the display name from
/// what each record already holds.
pub fn enrich_all(store: &mut DatasetStore, opts: &EnrichOptions) -> Result<BatchSummary> {
    let mut summary = BatchSummary {
        processed: 0,
        updated: 0,
        failed: 0,
        skipped: 0,
    };

    for tool in store.tools.iter_mut().filter(|t| t.has_url()) {
        summary.processed += 1;
        if tool.category().is_some() && !opts.force {
            summary.skipped += 1;
            continue;
        }
        let Some(repo) = slug::repo_name(tool.github_url()) else {
            println!("{:<50} invalid repository url", truncate(tool.name(), 50));
            summary.failed += 1;
            continue;
        };

        let description = tool.description().to_string();
        let topics = tool.topics();
        let category = enrich::category(&repo, &description, &topics);
        let tags = enrich::tags(&repo, &description, &topics, category);

        tool.set_category(category);
        tool.set_tags(&tags);
        if opts.names {
            tool.set_name(&enrich::display_name(&repo));
        }
        println!("{:<50} {:<14} {}", truncate(tool.name(), 50), category, tags.join(", "));
        summary.updated += 1;
    }

    store.flush().context("Failed to persist dataset")?;
    Ok(summary)
}

fn name_and_url(store: &DatasetStore, id: i64) -> Option<(String, String)> {
    store
        .tools
        .iter()
        .find(|t| t.id() == id)
        .map(|t| (t.name().to_string(), t.github_url().to_string()))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
