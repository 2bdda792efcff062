//! Recent-games extraction pipeline.
//!
//! Walks the games listing for yesterday's date window, visits each
//! game's team pages, discovers players of the wanted nationality,
//! fetches their profiles under a bounded worker pool, and persists
//! every success immediately. All progress markers go through the
//! status store so an interrupted run resumes where it stopped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use scraper::Html;
use tracing::{info, warn};

use rinkscout_common::{
    extract_player_id, extract_player_slug, Config, PendingPlayer, PlayerRecord,
};

use crate::dedup::Deduplicator;
use crate::failed::{FailedPlayer, FailureLog};
use crate::games::{self, WindowEnd};
use crate::profile::{fetch_profile, FetchOutcome};
use crate::session::Session;
use crate::sink::RecordSinks;
use crate::stats::StatsClient;
use crate::status::StatusStore;

/// Concurrent profile fetches per listing page.
const FETCH_WORKERS: usize = 8;
/// Delay before each retry-pass fetch.
const RETRY_PASS_DELAY: Duration = Duration::from_secs(1);

const FLAG_ALT: &str = "Sweden flag";

#[derive(Debug, Default)]
pub struct ExtractStats {
    pub pages_walked: u32,
    pub teams_visited: u32,
    pub teams_skipped: u32,
    pub players_discovered: u32,
    pub players_fetched: u32,
    pub players_failed: u32,
    pub retries_resolved: u32,
    pub retries_failed: u32,
}

impl std::fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Extraction Complete ===")?;
        writeln!(f, "Pages walked:       {}", self.pages_walked)?;
        writeln!(f, "Teams visited:      {}", self.teams_visited)?;
        writeln!(f, "Teams skipped:      {}", self.teams_skipped)?;
        writeln!(f, "Players discovered: {}", self.players_discovered)?;
        writeln!(f, "Players fetched:    {}", self.players_fetched)?;
        writeln!(f, "Players failed:     {}", self.players_failed)?;
        writeln!(f, "Retries resolved:   {}", self.retries_resolved)?;
        writeln!(f, "Retries failed:     {}", self.retries_failed)?;
        Ok(())
    }
}

/// One parsed listing page, reduced to owned data so fetching can
/// proceed after the document is dropped.
struct PageScan {
    teams: Vec<String>,
    next_page: Option<String>,
}

pub struct RecentExtractor {
    config: Config,
    session: Session,
    stats_client: StatsClient,
    sinks: Arc<RecordSinks>,
    status: Arc<Mutex<StatusStore>>,
    dedup: Deduplicator,
    failures: FailureLog,
}

impl RecentExtractor {
    pub fn new(config: Config, session: Session) -> Self {
        let stats_client = StatsClient::new(session.client().clone(), &config);
        let sinks = Arc::new(RecordSinks::new(&config.paths));
        let status = Arc::new(Mutex::new(StatusStore::load(&config.paths.extractor_status)));
        let failures = FailureLog::new(&config.paths.failed_players);
        Self {
            config,
            session,
            stats_client,
            sinks,
            status,
            dedup: Deduplicator::new(),
            failures,
        }
    }

    /// Run a full extraction cycle: walk, fetch, retry pass, marker.
    pub async fn run(&self) -> Result<ExtractStats> {
        let mut stats = ExtractStats::default();

        let target_date = Utc::now()
            .date_naive()
            .checked_sub_days(Days::new(1))
            .context("computing target date")?;
        let display_target = target_date.format("%B %-d").to_string();
        info!(%target_date, %display_target, "Walking games listing for the target window");

        let mut page_url = self.config.games_url.clone();
        let mut saw_header_once = false;
        let mut walk_completed = true;

        while stats.pages_walked < games::MAX_PAGES {
            stats.pages_walked += 1;
            self.lock_status().set_current_page(stats.pages_walked);

            let body = match self.session.fetch_html(&page_url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %page_url, "Listing page fetch failed: {e}");
                    walk_completed = false;
                    break;
                }
            };
            let scan = scan_page(
                &body,
                target_date,
                &display_target,
                saw_header_once,
                &self.config.base_url,
            );
            let Some(scan) = scan else {
                info!(page = stats.pages_walked, "No rows for the target window, stopping");
                break;
            };
            saw_header_once = true;
            info!(
                page = stats.pages_walked,
                teams = scan.teams.len(),
                "Listing page scanned"
            );

            let mut page_pending: Vec<PendingPlayer> = Vec::new();
            for team_url in &scan.teams {
                if self.lock_status().is_team_processed(team_url) {
                    stats.teams_skipped += 1;
                    continue;
                }
                self.lock_status().set_current_team(team_url);
                match self.visit_team(team_url).await {
                    Ok(mut discovered) => {
                        stats.teams_visited += 1;
                        stats.players_discovered += discovered.len() as u32;
                        page_pending.append(&mut discovered);
                    }
                    Err(e) => warn!(team_url = %team_url, "Team visit failed: {e}"),
                }
                self.lock_status().mark_team_processed(team_url);
            }

            // Fetch this page's discoveries before advancing, so the
            // page marker only moves once its records are persisted.
            let outcomes = stream::iter(page_pending)
                .map(|pending| self.process_player(pending, "games"))
                .buffer_unordered(FETCH_WORKERS)
                .collect::<Vec<bool>>()
                .await;
            for fetched in outcomes {
                if fetched {
                    stats.players_fetched += 1;
                } else {
                    stats.players_failed += 1;
                }
            }

            match scan.next_page {
                Some(next) => {
                    info!(next = %next, "Target window continues on the next page");
                    page_url = next;
                }
                None => break,
            }
        }

        self.retry_failed(&mut stats).await;
        let mut status = self.lock_status();
        status.save();
        info!(players_total = status.scraped_count(), "Final status saved");
        drop(status);

        // The marker opens the uploader gate, so an aborted walk must
        // not leave one behind.
        if !walk_completed {
            anyhow::bail!("listing walk aborted on a page fetch failure, success marker withheld");
        }
        std::fs::write(
            &self.config.paths.success_marker,
            format!("{}\n", Utc::now().to_rfc3339()),
        )
        .context("writing extraction success marker")?;

        Ok(stats)
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, StatusStore> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Visit one team page and return its not-yet-seen players. Each
    /// discovery is persisted the moment it is found.
    async fn visit_team(&self, team_url: &str) -> Result<Vec<PendingPlayer>> {
        self.sinks.append_team(team_url);
        let body = self
            .session
            .fetch_html(team_url)
            .await
            .map_err(|e| anyhow::anyhow!("fetching {team_url}: {e}"))?;

        let links = {
            let doc = Html::parse_document(&body);
            games::team_player_links(&doc, FLAG_ALT, &self.config.base_url)
        };

        let mut discovered = Vec::new();
        for url in links {
            let Some(id) = extract_player_id(&url) else {
                continue;
            };
            if self.lock_status().is_player_scraped(&id) || !self.dedup.mark_seen(&id) {
                continue;
            }
            let pending = PendingPlayer {
                slug: extract_player_slug(&url).unwrap_or_default(),
                url: url.clone(),
                id,
                discovered_at: Utc::now(),
            };
            self.sinks.append_discovery(&pending);
            discovered.push(pending);
        }
        Ok(discovered)
    }

    /// Fetch, enrich and persist one player. Returns whether the
    /// record made it to the sinks; failures land in the failure log.
    async fn process_player(&self, pending: PendingPlayer, context: &str) -> bool {
        match fetch_profile(&self.session, &pending.url, &pending.id).await {
            FetchOutcome::Fetched(profile) => {
                let mut profile = *profile;
                match self.stats_client.fetch_skills(&pending.id).await {
                    Ok(skills) => profile.skills = skills,
                    Err(e) => warn!(player_id = %pending.id, "Skills fetch failed: {e}"),
                }
                let position = self
                    .stats_client
                    .position_with_stats(&pending.id, &profile.position)
                    .await;
                let record = PlayerRecord::from_profile(&profile, &pending.url, position);
                if let Err(e) = self.sinks.append_record(&record, &profile) {
                    warn!(player_id = %pending.id, "Persisting record failed: {e}");
                    self.failures.append(&FailedPlayer::new(
                        &pending.id,
                        &pending.slug,
                        context,
                        &e.to_string(),
                    ));
                    return false;
                }
                self.lock_status().mark_player_scraped(&pending.id);
                info!(player_id = %pending.id, name = %record.name, "Player persisted");
                true
            }
            FetchOutcome::Failed(message) => {
                warn!(player_id = %pending.id, "Player fetch failed: {message}");
                self.failures.append(&FailedPlayer::new(
                    &pending.id,
                    &pending.slug,
                    context,
                    &message,
                ));
                false
            }
        }
    }

    /// Re-attempt everything in the failure log, rewriting it with
    /// the survivors (or deleting it when all are resolved).
    async fn retry_failed(&self, stats: &mut ExtractStats) {
        if !self.failures.exists() {
            return;
        }
        let entries = self.failures.load();
        if entries.is_empty() {
            return;
        }
        info!(count = entries.len(), "Retrying failed players");

        let mut survivors = Vec::new();
        for entry in entries {
            if self.lock_status().is_player_scraped(&entry.id) {
                stats.retries_resolved += 1;
                continue;
            }
            let url = if entry.username.is_empty() {
                format!("{}/player/{}", self.config.base_url, entry.id)
            } else {
                format!("{}/player/{}/{}", self.config.base_url, entry.id, entry.username)
            };
            tokio::time::sleep(RETRY_PASS_DELAY).await;

            let pending = PendingPlayer {
                id: entry.id.clone(),
                slug: entry.username.clone(),
                url,
                discovered_at: Utc::now(),
            };
            if self.process_player(pending, "retry").await {
                stats.retries_resolved += 1;
            } else {
                stats.retries_failed += 1;
                survivors.push(entry);
            }
        }

        if let Err(e) = self.failures.rewrite(&survivors) {
            warn!("Failed to rewrite failure log: {e}");
        }
    }
}

/// Parse one listing page into the target window's team URLs and the
/// follow-up page, if the window continues. `None` means the page
/// contributes nothing and the walk should stop.
fn scan_page(
    body: &str,
    target_date: NaiveDate,
    display_target: &str,
    saw_header_once: bool,
    base_url: &str,
) -> Option<PageScan> {
    let doc = Html::parse_document(body);

    let headers = games::date_headers(&doc);
    if headers.is_empty() {
        return None;
    }

    let header = games::find_target_header(&headers, target_date, display_target, !saw_header_once);
    let rows = match header {
        Some(header) => games::rows_for_header(header),
        // The window started on an earlier page; its tail is at the
        // top of this one.
        None if saw_header_once => games::rows_from_top(&doc),
        None => return None,
    };
    if rows.is_empty() {
        return None;
    }

    let mut teams = Vec::new();
    for row in &rows {
        for url in games::row_team_links(*row, base_url) {
            if !teams.contains(&url) {
                teams.push(url);
            }
        }
    }

    let last_row = *rows.last()?;
    let next_page = match games::window_end(last_row) {
        WindowEnd::PageEnd => games::next_page_url(&doc, base_url),
        WindowEnd::NextDateHeader | WindowEnd::OtherContent => None,
    };

    Some(PageScan { teams, next_page })
}
