//! Command-line interface definitions for News Digest.
//!
//! Every subcommand shares the global `--config` and `--debug` flags and the
//! environment overrides. Running without a subcommand is the same as `run`.

use crate::config::Overrides;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for the News Digest application.
///
/// # Examples
///
/// ```sh
/// # Today's digest, emailed to RECIPIENT_EMAIL
/// news_digest --config digest.yaml
///
/// # Last three days, rendered to a file but never sent
/// news_digest run --days 3 --dry-run --html-out digest.html
///
/// # Why is a feed silent?
/// news_digest diagnose --feeds https://example.com/rss.xml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, env = "NEWS_DIGEST_CONFIG", default_value = "digest.yaml")]
    pub config: String,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub debug: bool,

    /// SMTP password, overrides the config file
    #[arg(long, global = true, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Recipients, comma or semicolon separated
    #[arg(long, global = true, env = "RECIPIENT_EMAIL")]
    pub recipients: Option<String>,

    /// Feed URLs, comma or semicolon separated, replacing the configured list
    #[arg(long, global = true, env = "NEWS_DIGEST_FEEDS")]
    pub feeds: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            smtp_password: self.smtp_password.clone(),
            recipients: self.recipients.clone(),
            feeds: self.feeds.clone(),
        }
    }

    /// The subcommand to run, `run` with defaults when none was given.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch, summarize and email the digest
    Run(RunArgs),
    /// Check connectivity of the configured services
    Check {
        #[arg(long, value_enum, default_value_t = Component::All)]
        component: Component,
    },
    /// Validate the configuration file and exit
    Validate,
    /// Print the configured feeds
    ListFeeds {
        #[arg(long, value_enum, default_value_t = ListFormat::Simple)]
        format: ListFormat,
    },
    /// Fetch every feed and report format, strategy and date shapes
    Diagnose,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of days to include, counting back from now
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(1..=365))]
    pub days: i64,

    /// Render the digest but do not send it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the LLM and SMTP checks before running
    #[arg(long)]
    pub skip_check: bool,

    /// Also write the HTML digest to this file
    #[arg(long)]
    pub html_out: Option<String>,

    /// Output directory for the JSON digest
    #[arg(short, long)]
    pub json_output_dir: Option<String>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            days: 1,
            dry_run: false,
            skip_check: false,
            html_out: None,
            json_output_dir: None,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    All,
    Llm,
    Smtp,
    Config,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    Simple,
    Detailed,
    Json,
}
