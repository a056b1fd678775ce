//! Command line entry point
//!
//! ```text
//! article-harvester scrape <urls.txt|urls.csv> [delay-seconds]
//! article-harvester search <query> [top-k]
//! article-harvester top [top-k]
//! article-harvester status
//! article-harvester init-config
//! ```
//!
//! Settings come from `harvester.toml` in the working directory when it
//! exists, otherwise from the per-user `harvester.json`, with
//! `HARVESTER__*` environment variables applied last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use article_harvester_lib::infrastructure::{
    ConfigManager, ScoredArticle, init_logging_with_config, load_seed_urls,
};
use article_harvester_lib::{JobStatus, ScrapeService};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CONFIG_FILE: &str = "harvester.toml";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

const USAGE: &str = "usage:
  article-harvester scrape <urls.txt|urls.csv> [delay-seconds]
  article-harvester search <query> [top-k]
  article-harvester top [top-k]
  article-harvester status
  article-harvester init-config";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ConfigManager::load_preferring_local(Path::new(CONFIG_FILE), ConfigManager::for_user)
        .context("Failed to load configuration")?;
    init_logging_with_config(&config.logging)?;

    if args.first().map(String::as_str) == Some("init-config") {
        let user_settings = ConfigManager::for_user()?;
        if user_settings.write_defaults().await? {
            println!("📝 Wrote default settings to {}", user_settings.config_path().display());
        } else {
            println!("Settings already exist at {}", user_settings.config_path().display());
        }
        return Ok(());
    }

    let service = ScrapeService::from_config(&config)?;

    match args.first().map(String::as_str) {
        Some("scrape") => {
            let Some(path) = args.get(1) else {
                bail!("missing seed file\n{USAGE}");
            };
            let delay = args
                .get(2)
                .map(|d| d.parse::<f64>().with_context(|| format!("invalid delay: {d}")))
                .transpose()?;
            scrape(&service, &PathBuf::from(path), delay).await
        }
        Some("search") => {
            let Some(query) = args.get(1) else {
                bail!("missing query\n{USAGE}");
            };
            let top_k = parse_top_k(args.get(2))?;
            print_results(&service.search(query, top_k).await?);
            Ok(())
        }
        Some("top") => {
            let top_k = parse_top_k(args.get(1))?;
            print_results(&service.top_clapped(top_k).await?);
            Ok(())
        }
        Some("status") => {
            println!("📚 {} article(s) stored in {}", service.status().await?, config.store.path.display());
            Ok(())
        }
        _ => {
            println!("{USAGE}");
            Ok(())
        }
    }
}

fn parse_top_k(arg: Option<&String>) -> Result<Option<usize>> {
    arg.map(|k| k.parse::<usize>().with_context(|| format!("invalid top-k: {k}")))
        .transpose()
}

async fn scrape(service: &ScrapeService, path: &Path, delay: Option<f64>) -> Result<()> {
    let urls = load_seed_urls(path).await?;
    if urls.is_empty() {
        bail!("no http(s) URLs found in {}", path.display());
    }

    let started = service.start(urls, delay).await?;
    let Some(job_id) = started.job_id else {
        println!("✅ Nothing to do: all {} URL(s) are already stored", started.skipped);
        return Ok(());
    };
    println!("🚀 Job {job_id}: {} URL(s), {} skipped", started.total, started.skipped);

    let shutdown = CancellationToken::new();
    let cleanup = service.spawn_cleanup_task(shutdown.clone());

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                } else {
                    info!("Ctrl-C received, cancelling job {}", job_id);
                    service.cancel(&job_id).await.ok();
                }
            }
        }

        let snapshot = service.progress(&job_id).await?;
        println!(
            "⏳ {:>5.1}% {}/{} (ok {}, failed {}){}",
            snapshot.percentage,
            snapshot.completed,
            snapshot.total,
            snapshot.successful,
            snapshot.failed,
            snapshot
                .current_url
                .as_deref()
                .map(|url| format!(" -> {url}"))
                .unwrap_or_default()
        );

        if snapshot.status.is_terminal() {
            service.wait(&job_id).await;
            shutdown.cancel();
            cleanup.await.ok();

            return match snapshot.status {
                JobStatus::Failed => bail!(
                    "job {job_id} failed: {}",
                    snapshot.error.unwrap_or_default()
                ),
                _ => {
                    println!("🏁 Done: {} stored, {} failed", snapshot.successful, snapshot.failed);
                    Ok(())
                }
            };
        }
    }
}

fn print_results(results: &[ScoredArticle]) {
    if results.is_empty() {
        println!("No articles stored yet");
        return;
    }
    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{:>2}. [{:.3}] {} ({} claps)\n    {}",
            rank + 1,
            hit.score,
            if hit.record.title.is_empty() { "(untitled)" } else { hit.record.title.as_str() },
            hit.record.claps,
            hit.record.url
        );
    }
}
