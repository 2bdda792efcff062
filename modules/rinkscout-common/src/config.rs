use std::env;
use std::path::PathBuf;

use crate::error::RinkscoutError;

const DEFAULT_BASE_URL: &str = "https://www.eliteprospects.com";
const DEFAULT_GAMES_URL: &str =
    "https://www.eliteprospects.com/games/2025-2026/all-leagues/all-teams";
const DEFAULT_GRAPHQL_URL: &str = "https://gql.eliteprospects.com/";
const DEFAULT_UPLOAD_ENDPOINT: &str =
    "https://webdev11.mydevfactory.com/pallab/hockeybk/api/update-scrap-player-details";

/// Site login credentials (exchanged for session cookies at startup).
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Site endpoints
    pub base_url: String,
    pub games_url: String,
    pub graphql_url: String,

    // Session: either a login pair or a pre-baked cookie header
    pub login: Option<Credentials>,
    pub cookie_header: Option<String>,

    // Skill badge image base (kebab-case name + ".svg" appended)
    pub image_base_url: String,

    // Upload
    pub upload_endpoint: String,
    pub upload_batch_size: usize,
    pub upload_max_input_bytes: u64,

    pub paths: OutputPaths,
}

/// Where run artifacts live. Every file sits under `DATA_DIR`
/// (default: current directory) unless individually overridden.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub extractor_status: PathBuf,
    pub search_status: PathBuf,
    pub profiles_jsonl: PathBuf,
    pub players_data: PathBuf,
    pub output_csv: PathBuf,
    pub player_urls: PathBuf,
    pub player_ids: PathBuf,
    pub teams: PathBuf,
    pub failed_players: PathBuf,
    pub failed_urls: PathBuf,
    pub success_marker: PathBuf,
    pub uploader_lock: PathBuf,
    pub uploader_pid: PathBuf,
}

impl OutputPaths {
    pub fn from_env() -> Self {
        let dir = data_dir();
        let file = |var: &str, default: &str| {
            env::var(var)
                .map(PathBuf::from)
                .unwrap_or_else(|_| dir.join(default))
        };
        Self {
            extractor_status: file("EXTRACTOR_STATUS_FILE", "swedish_extractor_status.json"),
            search_status: file("STATUS_FILE", "status.json"),
            profiles_jsonl: file("PROFILES_JSONL_FILE", "recent_swedish_players_profiles.jsonl"),
            players_data: file("PLAYERS_DATA_FILE", "recent_swedish_players_data.json"),
            output_csv: file("OUTPUT_CSV_FILE", "output.csv"),
            player_urls: file("PLAYER_URLS_FILE", "recent_swedish_players_urls.txt"),
            player_ids: file("PLAYER_IDS_FILE", "recent_swedish_players_ids.txt"),
            teams: file("TEAMS_FILE", "team.txt"),
            failed_players: file("FAILED_PLAYERS_FILE", "failed_players.txt"),
            failed_urls: file("FAILED_URLS_FILE", "failed_player_urls.txt"),
            success_marker: file("SUCCESS_MARKER_FILE", ".extraction_success"),
            uploader_lock: file("UPLOADER_LOCK_FILE", "api_uploader.lock"),
            uploader_pid: file("UPLOADER_PID_FILE", "api_uploader.pid"),
        }
    }
}

/// Root data directory, controlled by `DATA_DIR` (default: the
/// working directory).
pub fn data_dir() -> PathBuf {
    PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| ".".to_string()))
}

impl Config {
    /// Load configuration for the extraction binaries. Requires either
    /// `EP_EMAIL`/`EP_PASSWORD` or `EP_COOKIE_HEADER` to be set.
    pub fn extractor_from_env() -> Result<Self, RinkscoutError> {
        let config = Self::base_from_env();
        if config.login.is_none() && config.cookie_header.is_none() {
            return Err(RinkscoutError::Config(
                "set EP_EMAIL and EP_PASSWORD, or EP_COOKIE_HEADER, to authenticate".to_string(),
            ));
        }
        Ok(config)
    }

    /// Load configuration for the uploader. No site credentials needed.
    pub fn uploader_from_env() -> Result<Self, RinkscoutError> {
        Ok(Self::base_from_env())
    }

    fn base_from_env() -> Self {
        let login = match (env::var("EP_EMAIL"), env::var("EP_PASSWORD")) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                Some(Credentials { email, password })
            }
            _ => None,
        };
        Self {
            base_url: env_or("BASE_URL", DEFAULT_BASE_URL),
            games_url: env_or("GAMES_URL", DEFAULT_GAMES_URL),
            graphql_url: env_or("GRAPHQL_URL", DEFAULT_GRAPHQL_URL),
            login,
            cookie_header: env::var("EP_COOKIE_HEADER").ok().filter(|v| !v.is_empty()),
            image_base_url: env_or("IMAGE_BASE_URL", "https://files.eliteprospects.com/layout/"),
            upload_endpoint: env_or("API_ENDPOINT", DEFAULT_UPLOAD_ENDPOINT),
            upload_batch_size: env_or("UPLOAD_BATCH_SIZE", "50").parse().unwrap_or(50),
            // 512 MiB of input JSON is far past anything a healthy run
            // produces; beyond it the uploader bails instead of thrashing.
            upload_max_input_bytes: env_or("UPLOAD_MAX_INPUT_BYTES", "536870912")
                .parse()
                .unwrap_or(536_870_912),
            paths: OutputPaths::from_env(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
