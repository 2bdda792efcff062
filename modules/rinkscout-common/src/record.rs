//! Player data model: the scraped profile, discovery bookkeeping, and
//! the serialized record shape the downstream ingest API expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A skill endorsement with its badge image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub image: String,
}

impl Skill {
    /// Build a skill with the badge URL derived from the name
    /// (kebab-cased, `.svg`) under the configured image base.
    pub fn new(name: &str, image_base_url: &str) -> Self {
        let slug = name.trim().to_lowercase().replace(' ', "-");
        Self {
            name: name.trim().to_string(),
            image: format!("{}{}.svg", image_base_url, slug),
        }
    }

    pub fn to_formatted_string(&self) -> String {
        format!("{} : {}", self.name, self.image)
    }
}

/// A player discovered on a listing page but not yet fetched.
#[derive(Debug, Clone)]
pub struct PendingPlayer {
    pub id: String,
    pub slug: String,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
}

/// Everything scraped from a single profile page.
#[derive(Debug, Clone, Default)]
pub struct PlayerProfile {
    pub user_id: String,
    pub user_name: String,
    pub name: String,
    pub date_of_birth: String,
    pub age: String,
    pub place_of_birth: String,
    pub nation: String,
    pub youth_team: String,
    pub latest_team_position: String,
    pub latest_team: String,
    pub season: String,
    pub position: String,
    pub height: String,
    pub weight: String,
    pub shoots: Option<String>,
    pub contract: String,
    pub player_type: Vec<String>,
    pub cap_hit: String,
    pub cap_hit_image: String,
    pub nhl_rights: String,
    pub drafted: String,
    pub highlights: Vec<String>,
    pub agency: String,
    pub image_url: String,
    pub relation: String,
    pub skills: Vec<Skill>,
    pub status: String,
}

impl PlayerProfile {
    /// Skills formatted for export: `"Name : URL ; Name : URL"`.
    pub fn skills_formatted(&self) -> String {
        self.skills
            .iter()
            .map(Skill::to_formatted_string)
            .collect::<Vec<_>>()
            .join(" ; ")
    }
}

/// The export object, with the wire keys the ingest API expects.
/// Field order is the serialization order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub user_id: Value,
    pub nation: String,
    pub name: String,
    pub birthdate: String,
    pub latest_team: String,
    pub profile_link: String,
    pub player_username: String,
    pub dob_profile: String,
    pub age: String,
    pub place_of_birth: String,
    pub nation_profile: String,
    pub youth_team: String,
    pub position: String,
    pub height: String,
    pub weight: String,
    pub shoots: String,
    pub contract: String,
    pub player_type: String,
    pub cap_hit: String,
    pub cap_hit_image: String,
    pub nhl_rights: String,
    pub drafted: String,
    pub agency: String,
    pub profile_picture: String,
    pub relation: String,
    pub skills: String,
    pub highlights: String,
    pub status: String,
    pub award: String,
    pub latest_team_position: String,
    pub season: String,
}

impl PlayerRecord {
    /// Assemble the export record from a scraped profile.
    /// `position` carries the season-stats JSON string when the stats
    /// API responded, otherwise the raw position text.
    pub fn from_profile(profile: &PlayerProfile, url: &str, position: String) -> Self {
        let id_source = if profile.user_id.trim().is_empty() {
            extract_player_id(url).unwrap_or_default()
        } else {
            profile.user_id.trim().to_string()
        };
        let user_id = match id_source.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(id_source),
        };

        // The ingest API rejects bare dashes; they mean "unknown" on the
        // site, so normalize them away.
        let place_of_birth = if profile.place_of_birth == "-" {
            String::new()
        } else {
            profile.place_of_birth.clone()
        };
        // Dual nationality ("USA / Sweden") keeps the first country.
        let nation_profile = profile
            .nation
            .split('/')
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        let shoots = match profile.shoots.as_deref() {
            Some(s) if !s.trim().is_empty() && s != "-" => s.to_string(),
            _ => String::new(),
        };
        let highlights = profile.highlights.join("; ");

        Self {
            user_id,
            nation: profile.nation.clone(),
            name: profile.name.clone(),
            birthdate: profile.date_of_birth.clone(),
            latest_team: profile.latest_team.clone(),
            profile_link: url.to_string(),
            player_username: profile.user_name.clone(),
            dob_profile: profile.date_of_birth.clone(),
            age: profile.age.clone(),
            place_of_birth,
            nation_profile,
            youth_team: profile.youth_team.clone(),
            position,
            height: profile.height.clone(),
            weight: profile.weight.clone(),
            shoots,
            contract: profile.contract.clone(),
            player_type: profile.player_type.join("; "),
            cap_hit: profile.cap_hit.clone(),
            cap_hit_image: profile.cap_hit_image.clone(),
            nhl_rights: profile.nhl_rights.clone(),
            drafted: profile.drafted.clone(),
            agency: profile.agency.clone(),
            profile_picture: profile.image_url.clone(),
            relation: profile.relation.clone(),
            skills: profile
                .skills
                .iter()
                .map(Skill::to_formatted_string)
                .collect::<Vec<_>>()
                .join("; "),
            highlights: highlights.clone(),
            status: profile.status.clone(),
            award: highlights,
            latest_team_position: profile.latest_team_position.clone(),
            season: profile.season.clone(),
        }
    }
}

/// Extract the numeric player id from a profile URL. Handles both the
/// modern `/player/{id}/{slug}` shape and the legacy
/// `player.php?player={id}` shape.
pub fn extract_player_id(url: &str) -> Option<String> {
    let after = url
        .split_once("/player/")
        .map(|(_, rest)| rest)
        .or_else(|| url.split_once("player.php?player=").map(|(_, rest)| rest))?;
    let id: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Extract the slug segment from a `/player/{id}/{slug}` URL.
pub fn extract_player_slug(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/player/")?;
    let mut parts = rest.split('/');
    let _id = parts.next()?;
    let slug = parts.next()?.split(['?', '#']).next()?;
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_modern_and_legacy_urls() {
        assert_eq!(
            extract_player_id("https://example.com/player/12345/john-doe"),
            Some("12345".to_string())
        );
        assert_eq!(
            extract_player_id("https://example.com/player.php?player=678"),
            Some("678".to_string())
        );
        assert_eq!(extract_player_id("https://example.com/team/99"), None);
    }

    #[test]
    fn extracts_slug_when_present() {
        assert_eq!(
            extract_player_slug("https://example.com/player/12345/john-doe?tab=stats"),
            Some("john-doe".to_string())
        );
        assert_eq!(extract_player_slug("https://example.com/player/12345"), None);
    }

    #[test]
    fn record_normalizes_dashes_and_dual_nationality() {
        let profile = PlayerProfile {
            user_id: "123".to_string(),
            nation: "USA / Sweden".to_string(),
            place_of_birth: "-".to_string(),
            shoots: Some("-".to_string()),
            highlights: vec!["Award A".to_string(), "Award B".to_string()],
            ..Default::default()
        };
        let record =
            PlayerRecord::from_profile(&profile, "https://example.com/player/123/x", "F".into());
        assert_eq!(record.user_id, Value::from(123));
        assert_eq!(record.place_of_birth, "");
        assert_eq!(record.nation_profile, "USA");
        assert_eq!(record.shoots, "");
        assert_eq!(record.highlights, "Award A; Award B");
        assert_eq!(record.award, record.highlights);
    }

    #[test]
    fn non_numeric_user_id_stays_a_string() {
        let profile = PlayerProfile {
            user_id: "abc".to_string(),
            ..Default::default()
        };
        let record =
            PlayerRecord::from_profile(&profile, "https://example.com/player/abc", "".into());
        assert_eq!(record.user_id, Value::from("abc"));
    }

    #[test]
    fn skill_badge_url_is_kebab_cased() {
        let skill = Skill::new("Heavy Shooter", "https://img.example.com/");
        assert_eq!(skill.image, "https://img.example.com/heavy-shooter.svg");
        assert_eq!(
            skill.to_formatted_string(),
            "Heavy Shooter : https://img.example.com/heavy-shooter.svg"
        );
    }
}
