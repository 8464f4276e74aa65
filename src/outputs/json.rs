//! JSON output of run results.
//!
//! # Output Structure
//!
//! Files are organized by local date, one file per invocation:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── local_09-15-02.json
//!     └── distributed_18-40-11.json
//! ```

use crate::models::RunResult;
use chrono::Local;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Serialize `results` to `{json_output_dir}/{date}/{mode}_{time}.json`.
///
/// Creates the date directory when needed and returns the written path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display(), %mode))]
pub async fn write_results(
    results: &[RunResult],
    json_output_dir: &Path,
    mode: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(results)?;

    let now = Local::now();
    let full_json_dir = json_output_dir.join(now.format("%Y-%m-%d").to_string());

    info!(full_json_dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(full_json_dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let output_json_filename =
        full_json_dir.join(format!("{mode}_{}.json", now.format("%H-%M-%S")));

    info!(path = %output_json_filename.display(), "Writing JSON");
    fs::write(&output_json_filename, json).await?;
    info!(path = %output_json_filename.display(), runs = results.len(), "Wrote run results");

    Ok(output_json_filename)
}
