//! JSON dump of the digest.
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-23/
//!     └── digest.json
//! ```
//!
//! The directory is named after the newest day in the digest, or today (UTC)
//! when the digest is empty.

use crate::models::Digest;
use chrono::Utc;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `digest` to `{json_output_dir}/{date}/digest.json` and return the path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_digest(
    digest: &Digest,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(digest)?;

    let date = digest
        .days
        .first()
        .map(|d| d.date)
        .unwrap_or_else(|| Utc::now().date_naive());
    let full_json_dir = PathBuf::from(json_output_dir).join(date.format("%Y-%m-%d").to_string());

    info!(full_json_dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(full_json_dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = full_json_dir.join("digest.json");
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote digest JSON");

    Ok(path)
}
