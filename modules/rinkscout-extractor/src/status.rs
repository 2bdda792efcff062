//! Durable resume state.
//!
//! Two small JSON documents survive crashes and interruptions: the
//! extraction status (teams and players already handled, current
//! page/team markers) and the search status (which position/year
//! sweep was in flight and on which page). Both load fresh on a
//! missing or corrupt file and never abort a run over an I/O error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// Save on every Nth player mark to bound file churn. A crash replays
// at most this many records, which the append-only sinks absorb.
const PLAYER_SAVE_INTERVAL: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorStatus {
    pub processed_teams: HashSet<String>,
    pub scraped_player_ids: HashSet<String>,
    pub current_page: u32,
    pub current_team: Option<String>,
    pub last_update: i64,
}

impl Default for ExtractorStatus {
    fn default() -> Self {
        Self {
            processed_teams: HashSet::new(),
            scraped_player_ids: HashSet::new(),
            current_page: 1,
            current_team: None,
            last_update: 0,
        }
    }
}

/// Owns the extraction status document. All mutation goes through the
/// marking methods so every meaningful transition hits disk.
pub struct StatusStore {
    path: PathBuf,
    status: ExtractorStatus,
}

impl StatusStore {
    /// Load from disk, starting fresh if the file is missing or
    /// unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let status = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(status) => status,
                Err(e) => {
                    warn!(path = %path.display(), "Status file unreadable ({e}), starting fresh");
                    ExtractorStatus::default()
                }
            },
            Err(_) => ExtractorStatus::default(),
        };
        info!(
            path = %path.display(),
            teams = status.processed_teams.len(),
            players = status.scraped_player_ids.len(),
            page = status.current_page,
            "Loaded extraction status"
        );
        Self { path, status }
    }

    /// Overwrite the file with the current state. Failures are logged
    /// and swallowed so a transient disk error never kills a run.
    pub fn save(&mut self) {
        self.status.last_update = Utc::now().timestamp_millis();
        match serde_json::to_string_pretty(&self.status) {
            Ok(body) => {
                if let Err(e) = std::fs::write(&self.path, body) {
                    warn!(path = %self.path.display(), "Failed to save status: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize status: {e}"),
        }
    }

    pub fn is_team_processed(&self, team_url: &str) -> bool {
        self.status.processed_teams.contains(team_url)
    }

    pub fn mark_team_processed(&mut self, team_url: &str) {
        self.status.processed_teams.insert(team_url.to_string());
        self.status.current_team = None;
        self.save();
    }

    pub fn set_current_team(&mut self, team_url: &str) {
        self.status.current_team = Some(team_url.to_string());
        self.save();
    }

    pub fn set_current_page(&mut self, page: u32) {
        self.status.current_page = page;
        self.save();
    }

    pub fn is_player_scraped(&self, player_id: &str) -> bool {
        self.status.scraped_player_ids.contains(player_id)
    }

    /// Record a persisted player. Saves every
    /// `PLAYER_SAVE_INTERVAL`th mark.
    pub fn mark_player_scraped(&mut self, player_id: &str) {
        self.status.scraped_player_ids.insert(player_id.to_string());
        if self.status.scraped_player_ids.len() % PLAYER_SAVE_INTERVAL == 0 {
            self.save();
        }
    }

    pub fn scraped_count(&self) -> usize {
        self.status.scraped_player_ids.len()
    }

    pub fn current_page(&self) -> u32 {
        self.status.current_page
    }

    /// Delete the status file, restarting the next run from scratch.
    pub fn reset(path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "Extraction status reset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Search sweep status
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SearchStatus {
    current_search: String,
    current_page: u32,
}

/// Resume marker for the position/birth-year search sweep. The stored
/// page only applies when the stored search key matches the sweep
/// being started.
pub struct SearchStatusStore {
    path: PathBuf,
    status: SearchStatus,
}

impl SearchStatusStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let status = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, status }
    }

    /// Page to resume from for the given `"{position}_{year}"` key;
    /// 1 when the stored state belongs to a different sweep.
    pub fn page_for(&self, search_key: &str) -> u32 {
        if self.status.current_search == search_key && self.status.current_page > 0 {
            self.status.current_page
        } else {
            1
        }
    }

    /// Record the next page to visit for a sweep.
    pub fn set(&mut self, search_key: &str, next_page: u32) {
        self.status.current_search = search_key.to_string();
        self.status.current_page = next_page;
        match serde_json::to_string_pretty(&self.status) {
            Ok(body) => {
                if let Err(e) = std::fs::write(&self.path, body) {
                    warn!(path = %self.path.display(), "Failed to save search status: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize search status: {e}"),
        }
    }
}
