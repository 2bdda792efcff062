//! Batched record upload.
//!
//! Records go out in ordered windows of `upload_batch_size`. A 422
//! response names the offending records by index, so only those are
//! failed; transport errors and 429/5xx get a short linear backoff.
//! Every failed record ends up, once, in `failed_player_urls.txt`.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use rinkscout_common::{store::WRAPPER_KEY, Config};

use crate::sanitize::{profile_link, sanitize_records};

const MAX_ATTEMPTS: u32 = 3;
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const INTER_WINDOW_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct UploadStats {
    pub records_in: usize,
    pub excluded: usize,
    pub windows: usize,
    pub windows_ok: usize,
    pub windows_failed: usize,
    pub records_uploaded: usize,
    pub records_failed: usize,
}

impl UploadStats {
    /// A run succeeds when no window failed. Excluded records are
    /// already in the failed-URLs file and do not fail the run.
    pub fn is_success(&self) -> bool {
        self.windows_failed == 0
    }
}

impl std::fmt::Display for UploadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Upload Complete ===")?;
        writeln!(f, "Records read:     {}", self.records_in)?;
        writeln!(f, "Excluded:         {}", self.excluded)?;
        writeln!(f, "Windows:          {} ({} ok, {} failed)", self.windows, self.windows_ok, self.windows_failed)?;
        writeln!(f, "Records uploaded: {}", self.records_uploaded)?;
        writeln!(f, "Records failed:   {}", self.records_failed)?;
        Ok(())
    }
}

/// How one window's response was classified.
#[derive(Debug, PartialEq)]
pub enum WindowOutcome {
    Accepted,
    /// `profile_link`s of the records the API rejected individually.
    RecordsRejected(Vec<String>),
    Failed(String),
}

pub struct BatchUploader {
    client: reqwest::Client,
    endpoint: String,
    batch_size: usize,
    failed_urls: PathBuf,
}

impl BatchUploader {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .context("building upload client")?;
        Ok(Self {
            client,
            endpoint: config.upload_endpoint.clone(),
            batch_size: config.upload_batch_size.max(1),
            failed_urls: config.paths.failed_urls.clone(),
        })
    }

    pub async fn upload(&self, records: Vec<Value>) -> Result<UploadStats> {
        let mut stats = UploadStats {
            records_in: records.len(),
            ..Default::default()
        };

        let sanitized = sanitize_records(records);
        stats.excluded = sanitized.excluded.len();
        let mut failed_links: Vec<String> = sanitized.excluded;

        let windows: Vec<&[Value]> = sanitized.kept.chunks(self.batch_size).collect();
        stats.windows = windows.len();
        info!(
            records = sanitized.kept.len(),
            windows = windows.len(),
            batch_size = self.batch_size,
            "Starting upload"
        );

        for (i, window) in windows.iter().enumerate() {
            match self.send_window(i, window).await {
                WindowOutcome::Accepted => {
                    stats.windows_ok += 1;
                    stats.records_uploaded += window.len();
                    info!(window = i, records = window.len(), "Window accepted");
                }
                WindowOutcome::RecordsRejected(links) => {
                    stats.windows_failed += 1;
                    stats.records_uploaded += window.len() - links.len();
                    stats.records_failed += links.len();
                    warn!(window = i, rejected = links.len(), "Window partially rejected");
                    failed_links.extend(links);
                }
                WindowOutcome::Failed(reason) => {
                    stats.windows_failed += 1;
                    stats.records_failed += window.len();
                    warn!(window = i, "Window failed: {reason}");
                    failed_links.extend(window.iter().map(profile_link));
                }
            }
            if i + 1 < windows.len() {
                tokio::time::sleep(INTER_WINDOW_DELAY).await;
            }
        }

        append_failed_links(&self.failed_urls, &failed_links)?;
        Ok(stats)
    }

    async fn send_window(&self, index: usize, window: &[Value]) -> WindowOutcome {
        let payload = json!({ WRAPPER_KEY: window });
        let mut attempt: u32 = 1;
        loop {
            let response = self.client.post(&self.endpoint).json(&payload).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if (status == 429 || status >= 500) && attempt < MAX_ATTEMPTS {
                        warn!(window = index, status, attempt, "Retryable upload status");
                        tokio::time::sleep(Duration::from_secs(u64::from(attempt) * 2)).await;
                        attempt += 1;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return classify_response(status, &body, window);
                }
                Err(e) => {
                    if attempt < MAX_ATTEMPTS {
                        warn!(window = index, attempt, "Upload transport error: {e}");
                        tokio::time::sleep(Duration::from_secs(u64::from(attempt) * 2)).await;
                        attempt += 1;
                        continue;
                    }
                    return WindowOutcome::Failed(format!("transport error after {MAX_ATTEMPTS} attempts: {e}"));
                }
            }
        }
    }
}

/// Classify one HTTP response for a window. Pure so the 422 parsing
/// is testable without a server.
pub fn classify_response(status: u16, body: &str, window: &[Value]) -> WindowOutcome {
    if (200..300).contains(&status) {
        return WindowOutcome::Accepted;
    }
    if status == 422 {
        return match rejected_indices(body) {
            Some(indices) if !indices.is_empty() => {
                let links = indices
                    .into_iter()
                    .filter_map(|i| window.get(i))
                    .map(profile_link)
                    .collect();
                WindowOutcome::RecordsRejected(links)
            }
            _ => WindowOutcome::Failed(
                "validation failure could not be attributed to records".to_string(),
            ),
        };
    }
    let hint = match status {
        401 | 403 => "authentication rejected by the API",
        404 => "endpoint not found, check API_ENDPOINT",
        413 => "payload too large, lower UPLOAD_BATCH_SIZE",
        429 => "rate limited after retries",
        500..=599 => "server error after retries",
        _ => "unexpected status",
    };
    WindowOutcome::Failed(format!("status {status}: {hint}"))
}

/// Record indices named by a 422 `errors` map, whose keys look like
/// `recentlyUpdatedPlayers.<index>.<field>`.
fn rejected_indices(body: &str) -> Option<Vec<usize>> {
    let doc: Value = serde_json::from_str(body).ok()?;
    let errors = doc.get("errors")?.as_object()?;
    let mut indices: Vec<usize> = errors
        .keys()
        .filter_map(|key| {
            let rest = key.strip_prefix(WRAPPER_KEY)?.strip_prefix('.')?;
            rest.split('.').next()?.parse().ok()
        })
        .collect();
    indices.sort_unstable();
    indices.dedup();
    Some(indices)
}

/// Append links to the failed-URLs file, skipping ones already there.
pub fn append_failed_links(path: &Path, links: &[String]) -> Result<()> {
    if links.is_empty() {
        return Ok(());
    }
    let mut seen: HashSet<String> = std::fs::read_to_string(path)
        .map(|raw| raw.lines().map(str::to_string).collect())
        .unwrap_or_default();
    let fresh: Vec<&String> = links.iter().filter(|l| seen.insert((*l).clone())).collect();
    if fresh.is_empty() {
        return Ok(());
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    for link in fresh {
        writeln!(file, "{link}").with_context(|| format!("appending to {}", path.display()))?;
    }
    Ok(())
}
