//! GraphQL clients for season statistics and skill endorsements.
//!
//! The position column carries a JSON document of per-season stats
//! when the stats API answers; the raw position string when it does
//! not. Every stat block is emitted with the full key set, null where
//! the response omitted a value, so downstream consumers see a stable
//! shape.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tracing::debug;

use rinkscout_common::{Config, Skill};

pub const STAT_KEYS: [&str; 16] = [
    "GP", "G", "A", "PTS", "PIM", "PM", "GAA", "SVP", "SVS", "SO", "W", "L", "T", "GD", "GA",
    "TOI",
];

const STATS_QUERY: &str = "query PlayerStatisticsDefault($player: ID) {\n  playerStats(player: $player) {\n    edges {\n      season { slug }\n      team { country { flagUrl { small } } }\n      teamName\n      leagueName\n      regularStats {\n        GP G A PTS PIM PM GAA SVP SVS SO W L T GD GA TOI\n      }\n      postseasonStats {\n        GP G A PTS PIM PM GAA SVP SVS SO W L T GD GA TOI\n      }\n    }\n  }\n}\n";

const SKILLS_QUERY: &str = "query Endorsements($profileId: ID!, $type: String!) { endorsements(id: $profileId, type: $type) { id upvotes type { id name } } }";

pub struct StatsClient {
    client: reqwest::Client,
    graphql_url: String,
    image_base_url: String,
}

impl StatsClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            graphql_url: config.graphql_url.clone(),
            image_base_url: config.image_base_url.clone(),
        }
    }

    /// Position column value: stats JSON when available, the raw
    /// position string otherwise.
    pub async fn position_with_stats(&self, player_id: &str, position: &str) -> String {
        match self.fetch_stats(player_id).await {
            Ok(response) => parse_player_stats(position, &response),
            Err(e) => {
                debug!(player_id, "Stats fetch failed ({e}), keeping raw position");
                position.to_string()
            }
        }
    }

    async fn fetch_stats(&self, player_id: &str) -> Result<Value> {
        let payload = json!({
            "query": STATS_QUERY,
            "variables": { "player": player_id },
        });
        let response = self
            .client
            .post(&self.graphql_url)
            .json(&payload)
            .send()
            .await
            .context("sending stats query")?;
        response.json().await.context("parsing stats response")
    }

    /// Skill endorsements for a player; empty on players without any.
    pub async fn fetch_skills(&self, player_id: &str) -> Result<Vec<Skill>> {
        let payload = json!({
            "query": SKILLS_QUERY,
            "variables": { "profileId": player_id, "type": "player" },
        });
        let response = self
            .client
            .post(&self.graphql_url)
            .json(&payload)
            .send()
            .await
            .context("sending endorsements query")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("endorsements query failed: HTTP {status}");
        }
        let body: Value = response
            .json()
            .await
            .context("parsing endorsements response")?;
        let Some(endorsements) = body
            .get("data")
            .and_then(|d| d.get("endorsements"))
            .and_then(Value::as_array)
        else {
            return Ok(Vec::new());
        };
        Ok(endorsements
            .iter()
            .filter_map(|e| e.get("type")?.get("name")?.as_str())
            .map(|name| Skill::new(name, &self.image_base_url))
            .collect())
    }
}

/// Reshape the stats response into `{"position": ..., "stats": [...]}`
/// with the full stat key set guaranteed per season. Any unexpected
/// shape falls back to the raw position string.
pub fn parse_player_stats(position: &str, response: &Value) -> String {
    let Some(edges) = response
        .get("data")
        .and_then(|d| d.get("playerStats"))
        .and_then(|s| s.get("edges"))
        .and_then(Value::as_array)
    else {
        return position.to_string();
    };

    let stats: Vec<Value> = edges
        .iter()
        .map(|edge| {
            json!({
                "seasonSlug": edge.get("season").and_then(|s| s.get("slug")).cloned().unwrap_or(Value::Null),
                "flagUrl": edge
                    .get("team")
                    .and_then(|t| t.get("country"))
                    .and_then(|c| c.get("flagUrl"))
                    .and_then(|f| f.get("small"))
                    .cloned()
                    .unwrap_or(Value::Null),
                "teamName": edge.get("teamName").cloned().unwrap_or(Value::Null),
                "leagueName": edge.get("leagueName").cloned().unwrap_or(Value::Null),
                "regularStats": normalized_stat_block(edge.get("regularStats")),
                "postseasonStats": normalized_stat_block(edge.get("postseasonStats")),
            })
        })
        .collect();

    let output = json!({ "position": position, "stats": stats });
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| position.to_string())
}

fn normalized_stat_block(raw: Option<&Value>) -> Value {
    let source = raw.and_then(Value::as_object);
    let mut block = Map::new();
    for key in STAT_KEYS {
        let value = source
            .and_then(|m| m.get(key))
            .cloned()
            .unwrap_or(Value::Null);
        block.insert(key.to_string(), value);
    }
    Value::Object(block)
}
