//! Profile page fetching and parsing.
//!
//! Fetching wraps the session in a bounded retry loop and reports an
//! explicit per-record outcome; a failure never propagates past the
//! record it belongs to. Parsing is a pure function over the page
//! text so fixture documents test it directly.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use rinkscout_common::{extract_player_slug, PlayerProfile};

use crate::games::next_element_sibling;
use crate::session::{FetchError, Session};

const MAX_ATTEMPTS: u32 = 3;

/// Result of one record fetch. Terminal failures carry the message
/// that ends up in the failure log.
pub enum FetchOutcome {
    Fetched(Box<PlayerProfile>),
    Failed(String),
}

fn sel(raw: &str) -> Selector {
    Selector::parse(raw).unwrap()
}

/// Fetch and parse one player profile with bounded retries.
///
/// Timeouts, connection failures and throttling/server statuses back
/// off exponentially (2^attempt seconds) up to `MAX_ATTEMPTS`. A 404
/// on a slugless `/player/{id}` URL gets a single fallback attempt at
/// `/player/{id}/{id}`. Any other failure is terminal immediately.
pub async fn fetch_profile(session: &Session, url: &str, player_id: &str) -> FetchOutcome {
    let mut last_error = String::new();
    let mut attempt: u32 = 0;

    while attempt < MAX_ATTEMPTS {
        match session.fetch_html(url).await {
            Ok(body) => return parsed_outcome(&body, url, player_id),
            Err(FetchError::Status(404)) if slugless_player_url(url) => {
                let alt = format!("{url}/{player_id}");
                debug!(player_id, alt = %alt, "404 on slugless URL, trying fallback");
                match session.fetch_html(&alt).await {
                    Ok(body) => return parsed_outcome(&body, &alt, player_id),
                    Err(e) => {
                        last_error = format!("fallback {alt}: {e}");
                        attempt += 1;
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                last_error = e.to_string();
                attempt += 1;
                warn!(player_id, attempt, "Fetch failed ({last_error}), retrying");
            }
            Err(e) => return FetchOutcome::Failed(e.to_string()),
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
        }
    }

    FetchOutcome::Failed(format!(
        "failed after {MAX_ATTEMPTS} attempts: {last_error}"
    ))
}

fn parsed_outcome(body: &str, url: &str, player_id: &str) -> FetchOutcome {
    let mut profile = parse_profile(body);
    profile.user_id = player_id.to_string();
    if let Some(slug) = extract_player_slug(url) {
        profile.user_name = slug;
    }
    FetchOutcome::Fetched(Box::new(profile))
}

fn slugless_player_url(url: &str) -> bool {
    let re = Regex::new(r"/player/\d+$").expect("valid regex");
    re.is_match(url)
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().replace('\u{a0}', " ")
}

/// Direct text children only, excluding nested elements.
fn own_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|n| n.value().as_text().map(|t| t.to_string()))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Family relation labels worth keeping. The page mixes these with
/// cross-links like "Goalie profile" that are not relations at all.
const VALID_RELATIONS: &[&str] = &[
    "Father", "Mother", "Brother", "Sister", "Son", "Daughter",
    "Brothers", "Sisters", "Sons", "Daughters",
    "Grandfather", "Grandmother", "Grandparents",
    "Uncle", "Aunt", "Nephew", "Niece",
    "Uncles", "Aunts", "Nephews", "Nieces",
    "Cousin", "Cousins", "Kusin",
    "Second Cousin", "Second Cousins", "Second cousin", "Second cousins",
    "Third Cousin", "Third Cousins", "Third cousin", "Third cousins",
    "Twin-brother", "Twin-sister", "Twin brother", "Twin sister",
    "Twin", "Twins",
    "Great Uncle", "Great Aunt", "Great-Uncle", "Great-Aunt",
    "Great Grandfather", "Great Grandmother", "Great-Grandfather", "Great-Grandmother",
    "Stepfather", "Stepmother", "Stepbrother", "Stepsister",
    "Half-brother", "Half-sister", "Half brother", "Half sister",
    "Father-in-law", "Mother-in-law", "Brother-in-law", "Sister-in-law",
    "Husband", "Wife", "Spouse", "Partner",
];

/// Parse a profile page into its fields. Skills and the id/slug are
/// attached by the caller.
pub fn parse_profile(body: &str) -> PlayerProfile {
    let doc = Html::parse_document(body);

    // The facts list is a sequence of <dt>Label</dt><dd>Value</dd>
    // pairs inside #player-facts.
    let dt_sel = sel("#player-facts dt");
    let dd_sel = sel("dd");
    let mut facts: HashMap<String, ElementRef<'_>> = HashMap::new();
    for dt in doc.select(&dt_sel) {
        let label = element_text(dt);
        if label.is_empty() {
            continue;
        }
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
        let dd = match next_element_sibling(dt) {
            Some(e) if e.value().name() == "dd" => Some(e),
            _ => dt.parent().and_then(ElementRef::wrap).and_then(|p| p.select(&dd_sel).next()),
        };
        if let Some(dd) = dd {
            facts.entry(label).or_insert(dd);
        }
    }
    let fact = |label: &str| facts.get(label).map(|e| element_text(*e)).unwrap_or_default();

    let name = doc.select(&sel("h1")).next().map(element_text).unwrap_or_default();

    let mut date_of_birth = fact("Date of Birth");
    if date_of_birth.is_empty() {
        date_of_birth = fact("Born");
    }
    let mut place_of_birth = fact("Place of Birth");
    if place_of_birth.is_empty() {
        place_of_birth = fact("Born in");
    }
    let mut shoots = fact("Shoots");
    if shoots.is_empty() {
        shoots = fact("Catches");
    }

    // Subtitle: "#21 Team / League - 23/24"
    let mut latest_team_position = String::new();
    let mut latest_team = String::new();
    let mut season = String::new();
    if let Some(h2) = doc.select(&sel("h2")).next() {
        let jersey_re = Regex::new(r"#\d+").expect("valid regex");
        if let Some(m) = jersey_re.find(&own_text(h2)) {
            latest_team_position = m.as_str().to_string();
        }

        let mut links: Vec<String> = h2
            .select(&sel("a[class*=\"TextLink\"]"))
            .map(element_text)
            .collect();
        if links.is_empty() {
            links = h2.select(&sel("a")).map(element_text).collect();
        }
        latest_team = links.join(" / ");

        let full = element_text(h2);
        if let Some(idx) = full.rfind('-') {
            season = full[idx + 1..].trim().to_string();
        } else {
            let season_re =
                Regex::new(r"(\d{2}/\d{2,4}|\d{4}[-/]\d{2,4})").expect("valid regex");
            if let Some(m) = season_re.find(&full) {
                season = m.as_str().to_string();
            }
        }
    }

    // Player types are tag chips inside the fact value.
    let mut player_type = Vec::new();
    if let Some(pt) = facts.get("Player Type") {
        let tag_sel = sel("div[class*=\"Tag\"], span[class*=\"Tag\"], a[class*=\"Tag\"]");
        for tag in pt.select(&tag_sel) {
            let text = element_text(tag);
            if !text.is_empty() && !player_type.contains(&text) {
                player_type.push(text);
            }
        }
        if player_type.is_empty() {
            let raw = fact("Player Type");
            if !raw.is_empty() {
                player_type = raw
                    .split([';', ','])
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
    }

    // Highlights hide their full text in tooltip attributes.
    let mut highlights = Vec::new();
    if let Some(hi) = facts.get("Highlights") {
        for el in hi.select(&sel("[data-tooltip-content]")) {
            if let Some(v) = el.value().attr("data-tooltip-content") {
                let v = v.trim();
                if !v.is_empty() {
                    highlights.push(v.to_string());
                }
            }
        }
        if highlights.is_empty() {
            let raw = fact("Highlights");
            let counts_re = Regex::new(r"^[0-9](\s+[0-9])*\s*").expect("valid regex");
            let cleaned = counts_re.replace(&raw, "").trim().to_string();
            if !cleaned.is_empty() {
                highlights.push(cleaned);
            }
        }
    }

    let cap_hit_image = doc
        .select(&sel("#player-facts img, img[src*=\"cap\"]"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .unwrap_or_default()
        .to_string();

    let image_url = doc
        .select(&sel("figure img, img.player-image"))
        .next()
        .or_else(|| doc.select(&sel("img[src*=\"/player/\"]")).next())
        .and_then(|img| img.value().attr("src"))
        .unwrap_or_default()
        .to_string();

    let relation = doc
        .select(&sel("div[class*=\"PlayerFacts_description\"], div.Relations"))
        .next()
        .map(|div| parse_relations(&div.inner_html()))
        .unwrap_or_default();

    PlayerProfile {
        user_id: String::new(),
        user_name: String::new(),
        name,
        date_of_birth,
        age: fact("Age"),
        place_of_birth,
        nation: fact("Nation"),
        youth_team: fact("Youth Team"),
        latest_team_position,
        latest_team,
        season,
        position: fact("Position"),
        height: fact("Height"),
        weight: fact("Weight"),
        shoots: Some(shoots),
        contract: fact("Contract"),
        player_type,
        cap_hit: fact("Cap Hit"),
        cap_hit_image,
        nhl_rights: fact("NHL Rights"),
        drafted: fact("Drafted"),
        highlights,
        agency: fact("Agency"),
        image_url,
        relation,
        skills: Vec::new(),
        status: fact("Status"),
    }
}

/// Turn the relations block into `"Type: id ; Type: id"`, keeping
/// only family relation labels and their linked player ids.
fn parse_relations(html: &str) -> String {
    let br_re = Regex::new(r"<br\s*/?>").expect("valid regex");
    let tag_re = Regex::new(r"<[^>]*>").expect("valid regex");
    let id_re = Regex::new(r"/player(?:\.php\?player=|/)(\d+)").expect("valid regex");

    let mut out = String::new();
    for line in br_re.split(html) {
        if !line.contains(": <a href=\"/player.php?player=")
            && !line.contains(": <a href=\"/player/")
        {
            continue;
        }
        let clean = tag_re.replace_all(line, "").trim().to_string();
        let Some((label, _)) = clean.split_once(':') else {
            continue;
        };
        let label = label.trim();
        if !VALID_RELATIONS.contains(&label) {
            continue;
        }
        for cap in id_re.captures_iter(line) {
            if !out.is_empty() {
                out.push_str(" ; ");
            }
            out.push_str(label);
            out.push_str(": ");
            out.push_str(&cap[1]);
        }
    }
    out.replace('"', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><body>
    <h1>Erik Example</h1>
    <h2>#21 <a class="TextLink_x">SK Iron</a> <a class="TextLink_x">Division 2</a> - 23/24</h2>
    <div id="player-facts">
      <dl>
        <dt>Date of Birth</dt><dd>Feb 02, 2004</dd>
        <dt>Age</dt><dd>22</dd>
        <dt>Place of Birth</dt><dd>Stockholm, SWE</dd>
        <dt>Nation</dt><dd>Sweden</dd>
        <dt>Youth Team</dt><dd>AIK</dd>
        <dt>Position</dt><dd>F</dd>
        <dt>Height</dt><dd>183 cm</dd>
        <dt>Weight</dt><dd>84 kg</dd>
        <dt>Shoots</dt><dd>L</dd>
        <dt>Player Type</dt><dd><span class="Tag_a">Heavy Shooter</span><span class="Tag_a">PP Specialist</span></dd>
        <dt>Highlights</dt><dd><span data-tooltip-content="SHL Champion 2023">1</span><span data-tooltip-content="Rookie of the Year">1</span></dd>
        <dt>Status</dt><dd>Active</dd>
      </dl>
      <img src="https://img.test/cap-hit.png">
    </div>
    <div class="PlayerFacts_description__x">Brother: <a href="/player/555/sven-example">Sven</a><br>Goalie profile: <a href="/player/777/g">G</a></div>
    <figure><img src="https://img.test/erik.jpg"></figure>
    </body></html>"##;

    #[test]
    fn parses_facts_and_subtitle() {
        let p = parse_profile(PAGE);
        assert_eq!(p.name, "Erik Example");
        assert_eq!(p.date_of_birth, "Feb 02, 2004");
        assert_eq!(p.age, "22");
        assert_eq!(p.place_of_birth, "Stockholm, SWE");
        assert_eq!(p.nation, "Sweden");
        assert_eq!(p.youth_team, "AIK");
        assert_eq!(p.position, "F");
        assert_eq!(p.shoots.as_deref(), Some("L"));
        assert_eq!(p.latest_team_position, "#21");
        assert_eq!(p.latest_team, "SK Iron / Division 2");
        assert_eq!(p.season, "23/24");
        assert_eq!(p.status, "Active");
    }

    #[test]
    fn player_types_come_from_tag_chips() {
        let p = parse_profile(PAGE);
        assert_eq!(p.player_type, vec!["Heavy Shooter", "PP Specialist"]);
    }

    #[test]
    fn highlights_prefer_tooltip_content() {
        let p = parse_profile(PAGE);
        assert_eq!(p.highlights, vec!["SHL Champion 2023", "Rookie of the Year"]);
    }

    #[test]
    fn relations_keep_family_links_only() {
        let p = parse_profile(PAGE);
        assert_eq!(p.relation, "Brother: 555");
    }

    #[test]
    fn images_extracted() {
        let p = parse_profile(PAGE);
        assert_eq!(p.cap_hit_image, "https://img.test/cap-hit.png");
        assert_eq!(p.image_url, "https://img.test/erik.jpg");
    }

    #[test]
    fn born_label_is_a_fallback() {
        let page = r#"<html><body><h1>X</h1><div id="player-facts"><dl>
            <dt>Born</dt><dd>Jan 01, 2000</dd></dl></div></body></html>"#;
        let p = parse_profile(page);
        assert_eq!(p.date_of_birth, "Jan 01, 2000");
    }

    #[test]
    fn slugless_url_detection() {
        assert!(slugless_player_url("https://site.test/player/123"));
        assert!(!slugless_player_url("https://site.test/player/123/some-slug"));
    }

    #[test]
    fn season_regex_fallback_without_dash() {
        let page = r#"<html><body><h1>X</h1><h2>#9 <a>Team</a> 23/24</h2>
            <div id="player-facts"></div></body></html>"#;
        let p = parse_profile(page);
        assert_eq!(p.season, "23/24");
    }
}
