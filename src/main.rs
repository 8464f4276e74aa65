//! # Opinion Digest
//!
//! Scrapes the opinion section of El País, translates the headlines from
//! Spanish to English and reports which words repeat across them.
//!
//! ## Features
//!
//! - Drives a real browser: a local Chromium over CDP, or sessions on a
//!   remote W3C WebDriver grid
//! - Downloads each article's cover image
//! - Translates headlines with one retry, keeping the original on failure
//! - Counts words over the translated headlines and lists those seen more
//!   than twice
//! - Distributed mode runs five browser/platform targets in parallel, each
//!   isolated from the others' failures
//!
//! ## Usage
//!
//! ```sh
//! opinion_digest local --max-articles 5
//! opinion_digest distributed --json-output-dir ./runs
//! ```
//!
//! ## Architecture
//!
//! Every run is a small state machine:
//! 1. **Session**: acquire a browser session for the target
//! 2. **Extraction**: index the section listing, then fetch each article
//! 3. **Translation**: translate every title, falling back to the original
//! 4. **Analysis**: count words over the translated titles
//! 5. **Release**: report the outcome to the session and close it

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analysis;
mod browser;
mod cli;
mod config;
mod error;
mod images;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod translate;
mod utils;

use browser::local::LocalChromium;
use browser::remote::{GridCredentials, RemoteGrid};
use cli::{Cli, Command};
use config::RunConfiguration;
use images::{DiscardImages, ImageDownloader, ImageSink};
use models::RunResult;
use outputs::{json, report};
use pipeline::Pipeline;
use translate::{MyMemoryClient, Translator};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("opinion_digest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = match args.configuration() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(
        mode = args.command.mode(),
        max_articles = config.max_articles,
        timeout = ?config.timeout,
        targets = config.targets.len(),
        "Configuration loaded"
    );

    let results = match &config.image_dir {
        Some(dir) => {
            if let Err(e) = ensure_writable_dir(dir).await {
                error!(
                    path = %dir.display(),
                    error = %e,
                    "Image directory is not writable (fix perms, choose another path or pass --no-images)"
                );
                return Err(e);
            }
            let downloader = ImageDownloader::new(dir)?;
            run(&args.command, &config, &downloader).await?
        }
        None => {
            info!("Cover image downloads disabled");
            run(&args.command, &config, &DiscardImages).await?
        }
    };

    for result in &results {
        println!("{}", report::render_run(result));
    }
    if let Command::Distributed(_) = &args.command {
        println!("{}", report::render_distributed(&results));
    }

    if let Some(dir) = &args.command.run_args().json_output_dir {
        if let Err(e) = json::write_results(&results, dir, args.command.mode()).await {
            error!(error = %e, "Failed to write JSON results");
        }
    }

    let productive = results.iter().filter(|r| r.is_productive()).count();
    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        runs = results.len(),
        productive,
        "Execution complete"
    );

    if productive == 0 {
        warn!("No run produced an analysis of any articles");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Build the translator and browser backend for the chosen mode and run.
async fn run<I: ImageSink>(
    command: &Command,
    config: &RunConfiguration,
    images: &I,
) -> Result<Vec<RunResult>, Box<dyn Error>> {
    let translator = Translator::new(MyMemoryClient::new(&config.translation_endpoint)?);
    let pipeline = Pipeline::new(config, &translator, images);

    match command {
        Command::Local(_) => {
            let factory = LocalChromium::new(config.headless, config.timeout);
            Ok(vec![pipeline.run_local(&factory).await])
        }
        Command::Distributed(args) => {
            let (Some(username), Some(access_key)) = (&args.username, &args.access_key) else {
                error!("BROWSERSTACK_USERNAME and BROWSERSTACK_ACCESS_KEY must both be set");
                return Err("missing grid credentials".into());
            };
            let credentials = GridCredentials {
                username: username.clone(),
                access_key: access_key.clone(),
            };
            let grid = RemoteGrid::new(&args.hub_url, credentials, config.timeout)?;
            Ok(pipeline.run_distributed(&grid, &config.targets).await)
        }
    }
}
