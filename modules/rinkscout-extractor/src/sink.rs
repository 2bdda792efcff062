//! Incremental output sinks.
//!
//! Every successfully fetched player is persisted immediately to
//! three sinks in order: the JSONL profile log, the wrapped export
//! document, and the CSV. Discovery artifacts (player URL/id lines,
//! visited teams) are appended the moment they are found so an
//! interrupted run keeps its progress. One mutex serializes all
//! writers; a failure in one sink is logged without rolling back the
//! others.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::warn;

use rinkscout_common::{OutputPaths, PendingPlayer, PlayerProfile, PlayerRecord, WrappedArrayFile};

/// CSV column set expected by downstream consumers. The `seasone`
/// spelling is part of the established format.
pub const CSV_HEADER: &str = "User ID,Username,Name,Date of Birth,Age,Place of Birth,Nation,Youth Team,latest_team_position,latest_team,seasone,Position,Height,Weight,Shoots,Contract,Player Type,Cap Hit,Cap Hit Image,NHL Rights,Drafted,Highlights,Agency,Relation,Image URL,Skills,Status";

/// Standalone CSV sink, also used by the search sweep which has no
/// other record outputs.
pub struct CsvSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first on a fresh file.
    pub fn append(&self, profile: &PlayerProfile, position_json: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.path.exists() {
            std::fs::write(&self.path, format!("{CSV_HEADER}\n"))
                .with_context(|| format!("writing {}", self.path.display()))?;
        }
        append_line(&self.path, &csv_row(profile, position_json))
    }
}

pub struct RecordSinks {
    jsonl: PathBuf,
    wrapped: WrappedArrayFile,
    csv: CsvSink,
    urls: PathBuf,
    ids: PathBuf,
    teams: PathBuf,
    lock: Mutex<()>,
}

impl RecordSinks {
    pub fn new(paths: &OutputPaths) -> Self {
        Self {
            jsonl: paths.profiles_jsonl.clone(),
            wrapped: WrappedArrayFile::new(&paths.players_data),
            csv: CsvSink::new(&paths.output_csv),
            urls: paths.player_urls.clone(),
            ids: paths.player_ids.clone(),
            teams: paths.teams.clone(),
            lock: Mutex::new(()),
        }
    }

    /// Persist one fetched player to all three record sinks.
    pub fn append_record(&self, record: &PlayerRecord, profile: &PlayerProfile) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let json_line = serde_json::to_string(record).context("serializing record")?;
        if let Err(e) = append_line(&self.jsonl, &json_line) {
            warn!(path = %self.jsonl.display(), "JSONL append failed: {e}");
        }

        if let Err(e) = self
            .wrapped
            .append(serde_json::to_value(record).context("serializing record")?)
        {
            warn!(path = %self.wrapped.path().display(), "Export document append failed: {e}");
        }

        if let Err(e) = self.csv.append(profile, &record.position) {
            warn!(path = %self.csv.path().display(), "CSV append failed: {e}");
        }

        Ok(())
    }

    /// Record a newly discovered player (URL line plus `id,slug,url`).
    pub fn append_discovery(&self, pending: &PendingPlayer) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = append_line(&self.urls, &pending.url) {
            warn!(path = %self.urls.display(), "URL append failed: {e}");
        }
        let line = format!("{},{},{}", pending.id, pending.slug, pending.url);
        if let Err(e) = append_line(&self.ids, &line) {
            warn!(path = %self.ids.display(), "Id line append failed: {e}");
        }
    }

    /// Record a visited team page.
    pub fn append_team(&self, team_url: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = append_line(&self.teams, team_url) {
            warn!(path = %self.teams.display(), "Team append failed: {e}");
        }
    }

}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("appending to {}", path.display()))
}

/// Build one CSV row from a profile. `position_json` is the
/// stats-enriched position column value.
pub fn csv_row(profile: &PlayerProfile, position_json: &str) -> String {
    let fields = [
        profile.user_id.as_str(),
        profile.user_name.as_str(),
        profile.name.as_str(),
        profile.date_of_birth.as_str(),
        profile.age.as_str(),
        profile.place_of_birth.as_str(),
        profile.nation.as_str(),
        profile.youth_team.as_str(),
        &format_jersey(&profile.latest_team_position),
        profile.latest_team.as_str(),
        profile.season.as_str(),
        position_json,
        profile.height.as_str(),
        profile.weight.as_str(),
        profile.shoots.as_deref().unwrap_or(""),
        profile.contract.as_str(),
        &profile.player_type.join("; "),
        profile.cap_hit.as_str(),
        profile.cap_hit_image.as_str(),
        profile.nhl_rights.as_str(),
        profile.drafted.as_str(),
        &profile.highlights.join("; "),
        profile.agency.as_str(),
        profile.relation.as_str(),
        profile.image_url.as_str(),
        &profile.skills_formatted(),
        profile.status.as_str(),
    ];
    fields
        .iter()
        .map(|f| escape_csv(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Jersey number column: `"21 / F"` and `"#21"` both become `"#21"`.
fn format_jersey(raw: &str) -> String {
    let trimmed = raw.split('/').next().unwrap_or("").trim();
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{trimmed}")
    }
}

/// RFC 4180 quoting: fields containing the delimiter, quotes, or line
/// breaks are wrapped in quotes with inner quotes doubled.
pub fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Player ids already present in the CSV (first column, header
/// skipped). Seeds deduplication across runs.
pub fn load_scraped_ids(csv_path: &Path) -> HashSet<String> {
    let Ok(raw) = std::fs::read_to_string(csv_path) else {
        return HashSet::new();
    };
    raw.lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| l.split(',').next())
        .map(|id| id.trim_matches('"').trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Value;

    fn sample_paths(dir: &Path) -> OutputPaths {
        let mut paths = OutputPaths::from_env();
        paths.profiles_jsonl = dir.join("profiles.jsonl");
        paths.players_data = dir.join("data.json");
        paths.output_csv = dir.join("output.csv");
        paths.player_urls = dir.join("urls.txt");
        paths.player_ids = dir.join("ids.txt");
        paths.teams = dir.join("teams.txt");
        paths
    }

    fn sample_profile() -> PlayerProfile {
        PlayerProfile {
            user_id: "123".to_string(),
            user_name: "erik-example".to_string(),
            name: "Erik Example".to_string(),
            latest_team_position: "21 / F".to_string(),
            place_of_birth: "Stockholm, SWE".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn escape_csv_quotes_when_needed() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn jersey_number_normalized() {
        assert_eq!(format_jersey("21 / F"), "#21");
        assert_eq!(format_jersey("#9"), "#9");
        assert_eq!(format_jersey(""), "");
    }

    #[test]
    fn record_lands_in_all_three_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let paths = sample_paths(dir.path());
        let sinks = RecordSinks::new(&paths);

        let profile = sample_profile();
        let record = PlayerRecord::from_profile(
            &profile,
            "https://site.test/player/123/erik-example",
            "F".to_string(),
        );
        sinks.append_record(&record, &profile).unwrap();
        sinks.append_record(&record, &profile).unwrap();

        let jsonl = std::fs::read_to_string(&paths.profiles_jsonl).unwrap();
        assert_eq!(jsonl.lines().count(), 2);
        let first: Value = serde_json::from_str(jsonl.lines().next().unwrap()).unwrap();
        assert_eq!(first["user_id"], 123);

        let doc: Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.players_data).unwrap()).unwrap();
        assert_eq!(doc["recentlyUpdatedPlayers"].as_array().unwrap().len(), 2);

        let csv = std::fs::read_to_string(&paths.output_csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER);
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn discovery_lines_append() {
        let dir = tempfile::tempdir().unwrap();
        let paths = sample_paths(dir.path());
        let sinks = RecordSinks::new(&paths);

        sinks.append_discovery(&PendingPlayer {
            id: "11".to_string(),
            slug: "anders-a".to_string(),
            url: "https://site.test/player/11/anders-a".to_string(),
            discovered_at: Utc::now(),
        });

        let ids = std::fs::read_to_string(&paths.player_ids).unwrap();
        assert_eq!(ids.trim(), "11,anders-a,https://site.test/player/11/anders-a");
        let urls = std::fs::read_to_string(&paths.player_urls).unwrap();
        assert_eq!(urls.trim(), "https://site.test/player/11/anders-a");
    }

    #[test]
    fn scraped_ids_read_from_csv_first_column() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("output.csv");
        std::fs::write(&csv, format!("{CSV_HEADER}\n\"1\",a\n2,b\n\n")).unwrap();

        let ids = load_scraped_ids(&csv);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("2"));
    }
}
