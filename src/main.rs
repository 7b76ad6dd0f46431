//! # News Digest
//!
//! Fetches a list of RSS/Atom feeds, keeps the articles published in the last
//! few days, summarizes each one through an LLM and emails the result as a
//! date-grouped HTML digest.
//!
//! ## Usage
//!
//! ```sh
//! news_digest --config digest.yaml run --days 2
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: download every feed with header fallback and retries
//! 2. **Parsing**: strict XML strategies, lenient HTML parsing as a fallback
//! 3. **Aggregation**: date window, de-duplication, newest first
//! 4. **Summarization**: one LLM call per article plus a social post
//! 5. **Output**: HTML email, optional HTML file and JSON dump

use awful_aj::{config as aj_config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod feeds;
mod models;
mod outputs;
mod retry;
mod summarizer;
mod utils;

use api::{AskAsync, llm_client};
use cli::{Cli, Command, Component, ListFormat, RunArgs};
use config::{AppConfig, ConfigError, SummarizerSettings};
use feeds::diagnostics::diagnose_all;
use feeds::{Aggregator, FeedFetcher};
use outputs::{email, html, json};
use summarizer::Summarizer;
use utils::{ensure_writable_dir, truncate_for_log};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // --- Tracing init ---
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("news_digest starting up");
    debug!(config = %cli.config, command = ?cli.command(), "Parsed CLI arguments");

    let result = match cli.command() {
        Command::Run(args) => run(&cli, &args).await,
        Command::Check { component } => check(&cli, component).await,
        Command::Validate => validate(&cli),
        Command::ListFeeds { format } => list_feeds(&cli, format),
        Command::Diagnose => diagnose(&cli).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, secs = elapsed.as_secs(), "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result
}

/// Load the YAML config, apply env/CLI overrides and validate it.
fn load_config(cli: &Cli, require_email: bool) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load(&cli.config)?;
    config.apply_overrides(&cli.overrides());
    if let Err(e) = config.validate(require_email) {
        error!(error = %e, "Configuration is invalid");
        return Err(e);
    }
    Ok(config)
}

/// `awful_aj` template and backend configuration.
async fn load_llm(
    settings: &SummarizerSettings,
) -> Result<(AwfulJadeConfig, ChatTemplate), Box<dyn Error>> {
    let template = template::load_template(&settings.template).await?;
    info!(template = %settings.template, "Loaded template");
    let conf_file = config_dir()?.join("config.yaml");
    let config_path = conf_file
        .to_str()
        .ok_or("awful_aj config path is not valid UTF-8")?;
    let config = aj_config::load_config(config_path)?;
    info!(config_path, "Loaded LLM configuration");
    Ok((config, template))
}

async fn check_llm(settings: &SummarizerSettings) -> Result<(), Box<dyn Error>> {
    let (config, template) = load_llm(settings).await?;
    let client = llm_client(&config, &template);
    let reply = client.ask("Reply with the single word OK.").await?;
    info!(reply = %truncate_for_log(&reply, 80), "LLM backend reachable");
    Ok(())
}

async fn check_smtp(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    if email::check_connection(&config.email).await? {
        Ok(())
    } else {
        Err("SMTP server rejected the connection".into())
    }
}

#[instrument(level = "info", skip_all, fields(days = args.days, dry_run = args.dry_run))]
async fn run(cli: &Cli, args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli, !args.dry_run)?;

    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "JSON output directory is not writable");
            return Err(e);
        }
    }

    if args.skip_check || args.dry_run {
        debug!("Skipping connection checks");
    } else {
        check_llm(&config.summarizer).await?;
        check_smtp(&config).await?;
    }

    // ---- Fetch and aggregate ----
    let fetcher = FeedFetcher::new(config.to_fetch_config())?;
    let aggregator = Aggregator::new(fetcher, config.fetch.concurrency);
    let aggregation = aggregator.fetch_all(&config.feeds, args.days).await;

    if aggregation.articles.is_empty() {
        warn!(
            days = args.days,
            failed_feeds = aggregation.stats.failed_feeds,
            "No articles in range; nothing to send"
        );
        return Ok(());
    }

    // ---- Summarize ----
    let (llm_config, template) = load_llm(&config.summarizer).await?;
    let summarizer = Summarizer::new(
        llm_client(&llm_config, &template),
        config.summarizer.language.clone(),
        config.summarizer.concurrency,
    );
    let digest = summarizer.build_digest(&aggregation.articles).await;
    info!(
        articles = digest.stats.total_articles,
        days = digest.stats.total_days,
        sources = digest.stats.total_sources,
        "Digest built"
    );

    // ---- Outputs ----
    if let Some(path) = &args.html_out {
        let rendered = html::render_digest(&digest)?;
        match tokio::fs::write(path, rendered).await {
            Ok(()) => info!(path = %path, "Wrote HTML digest"),
            Err(e) => error!(path = %path, error = %e, "Failed writing HTML digest"),
        }
    }

    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = json::write_digest(&digest, dir).await {
            error!(error = %e, "Failed to write digest JSON");
        }
    }

    if args.dry_run {
        for day in &digest.days {
            info!(date = %day.date, articles = day.articles.len(), "Dry run: day in digest");
        }
        info!(subject = %digest.subject(), "Dry run: email not sent");
        return Ok(());
    }

    email::send_digest(&config.email, &digest).await?;
    Ok(())
}

async fn check(cli: &Cli, component: Component) -> Result<(), Box<dyn Error>> {
    let require_email = matches!(component, Component::All | Component::Smtp);
    let config = load_config(cli, require_email)?;
    info!(feeds = config.feeds.len(), "Configuration OK");

    if matches!(component, Component::All | Component::Llm) {
        check_llm(&config.summarizer).await?;
    }
    if matches!(component, Component::All | Component::Smtp) {
        check_smtp(&config).await?;
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli, true)?;
    println!(
        "Configuration valid: {} feeds, {} recipients",
        config.feeds.len(),
        config.email.recipients.len()
    );
    Ok(())
}

fn list_feeds(cli: &Cli, format: ListFormat) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli, false)?;
    let status = |url: &str| {
        if config.fetch.blocked.iter().any(|b| b == url) {
            "blocked"
        } else if config.fetch.known_empty.iter().any(|k| k == url) {
            "known-empty"
        } else {
            "active"
        }
    };

    match format {
        ListFormat::Simple => {
            for feed in &config.feeds {
                println!("{feed}");
            }
        }
        ListFormat::Detailed => {
            for (i, feed) in config.feeds.iter().enumerate() {
                println!("{:>3}. [{:<11}] {}", i + 1, status(feed), feed);
            }
            println!("{} feeds", config.feeds.len());
        }
        ListFormat::Json => {
            let entries: Vec<serde_json::Value> = config
                .feeds
                .iter()
                .map(|f| serde_json::json!({ "url": f, "status": status(f) }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

async fn diagnose(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli, false)?;
    let fetcher = FeedFetcher::new(config.to_fetch_config())?;
    let (results, summary) = diagnose_all(&fetcher, &config.feeds, config.fetch.concurrency).await;

    for r in &results {
        println!("{}", r.url);
        if !r.accessible {
            println!("  not accessible: {}", r.error.as_deref().unwrap_or("unknown error"));
            continue;
        }
        println!("  format: {}  strategy: {}  items: {}", r.format, r.strategy, r.items_found);
        for title in &r.sample_titles {
            println!("  - {title}");
        }
        let shapes: Vec<String> = r.date_shapes.iter().map(ToString::to_string).collect();
        println!("  date formats: {}", shapes.join(", "));
    }

    println!();
    println!(
        "{} feeds: {} working, {} blocked, {} empty ({:.1}% success)",
        summary.total_feeds,
        summary.working.len(),
        summary.blocked.len(),
        summary.empty.len(),
        summary.success_rate()
    );
    Ok(())
}
