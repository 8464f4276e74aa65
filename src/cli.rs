//! Command-line interface definitions.
//!
//! Every option can also be supplied through the environment variable named
//! next to it.

use crate::analysis::CountMode;
use crate::config::{
    DEFAULT_HUB_URL, DEFAULT_MAX_ARTICLES, DEFAULT_SECTION_URL, DEFAULT_TARGET_TIMEOUT_SECS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TRANSLATION_ENDPOINT, RunConfiguration, default_targets,
    load_targets,
};
use crate::error::PipelineError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Scrape El País opinion headlines, translate them to English and report
/// repeated words.
///
/// # Examples
///
/// ```sh
/// # One local headless Chromium
/// opinion_digest local
///
/// # Five grid targets in parallel, results also written as JSON
/// BROWSERSTACK_USERNAME=me BROWSERSTACK_ACCESS_KEY=secret \
///     opinion_digest distributed --json-output-dir ./runs
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run once against a local Chromium
    Local(RunArgs),
    /// Run against every remote grid target in parallel
    Distributed(DistributedArgs),
}

impl Command {
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Command::Local(args) => args,
            Command::Distributed(args) => &args.run,
        }
    }

    /// Short name used in output file names.
    pub fn mode(&self) -> &'static str {
        match self {
            Command::Local(_) => "local",
            Command::Distributed(_) => "distributed",
        }
    }
}

/// Options shared by both modes.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of articles to scrape from the listing
    #[arg(long, env = "MAX_ARTICLES", default_value_t = DEFAULT_MAX_ARTICLES)]
    pub max_articles: usize,

    /// Run the browser without a window (the default)
    #[arg(long, overrides_with = "no_headless")]
    pub headless: bool,

    /// Show the browser window (local mode only)
    #[arg(long, overrides_with = "headless")]
    pub no_headless: bool,

    /// Seconds to wait for any single page or element
    #[arg(long, env = "PAGE_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Opinion section listing URL
    #[arg(long, env = "SECTION_URL", default_value = DEFAULT_SECTION_URL)]
    pub section_url: String,

    /// Translation service endpoint
    #[arg(long, env = "TRANSLATION_ENDPOINT", default_value = DEFAULT_TRANSLATION_ENDPOINT)]
    pub translation_endpoint: String,

    /// Directory for downloaded cover images
    #[arg(long, env = "IMAGE_DIR", default_value = "./downloaded_images")]
    pub image_dir: PathBuf,

    /// Do not download cover images
    #[arg(long)]
    pub no_images: bool,

    /// Count a word at most once per headline
    #[arg(long)]
    pub once_per_title: bool,

    /// Also write the run results as JSON under this directory
    #[arg(short, long, env = "JSON_OUTPUT_DIR")]
    pub json_output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DistributedArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// YAML file with a top-level `targets:` list; defaults to the five
    /// built-in targets
    #[arg(long, env = "TARGETS_FILE")]
    pub targets: Option<PathBuf>,

    /// Seconds one target's run may take in total
    #[arg(long, env = "TARGET_TIMEOUT", default_value_t = DEFAULT_TARGET_TIMEOUT_SECS)]
    pub target_timeout: u64,

    /// WebDriver hub URL
    #[arg(long, env = "HUB_URL", default_value = DEFAULT_HUB_URL)]
    pub hub_url: String,

    /// Grid user name
    #[arg(long, env = "BROWSERSTACK_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// Grid access key
    #[arg(long, env = "BROWSERSTACK_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,
}

impl Cli {
    /// Build the immutable configuration for this invocation. Reads the
    /// targets file, if one was given.
    pub fn configuration(&self) -> Result<RunConfiguration, PipelineError> {
        let args = self.command.run_args();
        let mut config = RunConfiguration {
            max_articles: args.max_articles,
            headless: args.headless || !args.no_headless,
            timeout: Duration::from_secs(args.timeout),
            section_url: args.section_url.clone(),
            translation_endpoint: args.translation_endpoint.clone(),
            image_dir: (!args.no_images).then(|| args.image_dir.clone()),
            count_mode: if args.once_per_title {
                CountMode::OncePerTitle
            } else {
                CountMode::AllOccurrences
            },
            ..RunConfiguration::default()
        };

        if let Command::Distributed(dist) = &self.command {
            config.target_timeout = Duration::from_secs(dist.target_timeout);
            config.targets = match &dist.targets {
                Some(path) => load_targets(path)?,
                None => default_targets(),
            };
        }

        config.validate()?;
        Ok(config)
    }
}
