//! Position/birth-year search sweep (the historical backfill).
//!
//! Pages through the player search for one `position_year`
//! combination at a time, fetching every profile not already in the
//! CSV under the shared worker pool. The search status file records
//! the next page after each completed page, so an interrupted sweep
//! resumes mid-combination.

use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use tracing::{info, warn};

use rinkscout_common::{extract_player_id, extract_player_slug, Config};

use crate::dedup::Deduplicator;
use crate::failed::{FailedPlayer, FailureLog};
use crate::games::absolutize;
use crate::profile::{fetch_profile, FetchOutcome};
use crate::session::Session;
use crate::sink::{load_scraped_ids, CsvSink};
use crate::stats::StatsClient;
use crate::status::SearchStatusStore;

const SEARCH_WORKERS: usize = 8;
/// Per-record pause to stay under the site's rate limits.
const PER_PLAYER_DELAY: Duration = Duration::from_millis(500);
/// Consecutive page-fetch failures before giving up on a sweep.
const MAX_PAGE_ERRORS: u32 = 3;

#[derive(Debug, Default)]
pub struct SearchStats {
    pub sweeps: u32,
    pub pages: u32,
    pub players_scraped: u32,
    pub players_skipped: u32,
    pub players_failed: u32,
}

impl std::fmt::Display for SearchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Search Sweep Complete ===")?;
        writeln!(f, "Sweeps:          {}", self.sweeps)?;
        writeln!(f, "Pages:           {}", self.pages)?;
        writeln!(f, "Players scraped: {}", self.players_scraped)?;
        writeln!(f, "Players skipped: {}", self.players_skipped)?;
        writeln!(f, "Players failed:  {}", self.players_failed)?;
        Ok(())
    }
}

pub struct SearchWalker {
    config: Config,
    session: Session,
    stats_client: StatsClient,
    csv: CsvSink,
    dedup: Deduplicator,
    failures: FailureLog,
    status: SearchStatusStore,
}

impl SearchWalker {
    pub fn new(config: Config, session: Session) -> Self {
        let stats_client = StatsClient::new(session.client().clone(), &config);
        let csv = CsvSink::new(&config.paths.output_csv);
        let dedup = Deduplicator::with_initial(load_scraped_ids(&config.paths.output_csv));
        let failures = FailureLog::new(&config.paths.failed_players);
        let status = SearchStatusStore::load(&config.paths.search_status);
        Self {
            config,
            session,
            stats_client,
            csv,
            dedup,
            failures,
            status,
        }
    }

    /// Sweep every position over the year range, in order.
    pub async fn run_sweep(
        &mut self,
        positions: &[String],
        from_year: i32,
        to_year: i32,
    ) -> Result<SearchStats> {
        let mut stats = SearchStats::default();
        info!(
            positions = %positions.join(","),
            from_year, to_year, "Starting search sweep"
        );
        for position in positions {
            for year in from_year..=to_year {
                stats.sweeps += 1;
                self.run_search(position, year, &mut stats).await;
            }
        }
        Ok(stats)
    }

    async fn run_search(&mut self, position: &str, year: i32, stats: &mut SearchStats) {
        let search_key = format!("{position}_{year}");
        let mut page = self.status.page_for(&search_key);
        self.status.set(&search_key, page);
        info!(search_key = %search_key, page, "Searching");

        let mut page_errors: u32 = 0;
        loop {
            let url = search_url(&self.config.base_url, position, year, page);
            let body = match self.session.fetch_html(&url).await {
                Ok(body) => {
                    page_errors = 0;
                    body
                }
                Err(e) => {
                    warn!(url = %url, "Search page fetch failed: {e}");
                    page_errors += 1;
                    if page_errors >= MAX_PAGE_ERRORS {
                        warn!(search_key = %search_key, "Too many page failures, abandoning sweep");
                        break;
                    }
                    page += 1;
                    self.status.set(&search_key, page);
                    continue;
                }
            };
            stats.pages += 1;

            let links = {
                let doc = Html::parse_document(&body);
                player_links(&doc, &self.config.base_url)
            };
            if links.is_empty() {
                info!(search_key = %search_key, page, "No players on page, sweep complete");
                break;
            }

            let mut pending = Vec::new();
            for url in links {
                let Some(id) = extract_player_id(&url) else {
                    continue;
                };
                if self.dedup.seen(&id) {
                    stats.players_skipped += 1;
                    continue;
                }
                pending.push((id, url));
            }

            let session = &self.session;
            let stats_client = &self.stats_client;
            let csv = &self.csv;
            let dedup = &self.dedup;
            let failures = &self.failures;
            let outcomes = stream::iter(pending)
                .map(|(id, url)| async move {
                    let slug = extract_player_slug(&url).unwrap_or_default();
                    match fetch_profile(session, &url, &id).await {
                        FetchOutcome::Fetched(profile) => {
                            let mut profile = *profile;
                            profile.user_name = slug;
                            match stats_client.fetch_skills(&id).await {
                                Ok(skills) => profile.skills = skills,
                                Err(e) => warn!(player_id = %id, "Skills fetch failed: {e}"),
                            }
                            let position_json = stats_client
                                .position_with_stats(&id, &profile.position)
                                .await;
                            let ok = match csv.append(&profile, &position_json) {
                                Ok(()) => {
                                    dedup.mark_seen(&id);
                                    true
                                }
                                Err(e) => {
                                    warn!(player_id = %id, "CSV write failed: {e}");
                                    failures.append(&FailedPlayer::new(
                                        &id,
                                        &profile.user_name,
                                        position,
                                        &e.to_string(),
                                    ));
                                    false
                                }
                            };
                            tokio::time::sleep(PER_PLAYER_DELAY).await;
                            ok
                        }
                        FetchOutcome::Failed(message) => {
                            warn!(player_id = %id, "Player fetch failed: {message}");
                            failures.append(&FailedPlayer::new(&id, &slug, position, &message));
                            false
                        }
                    }
                })
                .buffer_unordered(SEARCH_WORKERS)
                .collect::<Vec<bool>>()
                .await;
            for ok in outcomes {
                if ok {
                    stats.players_scraped += 1;
                } else {
                    stats.players_failed += 1;
                }
            }

            // Record the next page only after this one fully landed.
            page += 1;
            self.status.set(&search_key, page);
        }
    }
}

pub fn search_url(base_url: &str, position: &str, year: i32, page: u32) -> String {
    format!("{base_url}/search/player?position={position}&dob={year}&nation=swe&page={page}")
}

/// Profile links from a search result page (`td.name a`).
pub fn player_links(doc: &Html, base_url: &str) -> Vec<String> {
    let link = Selector::parse("td.name a").unwrap();
    doc.select(&link)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| absolutize(href, base_url))
        .collect()
}
