//! Date-window walking over the paginated games listing.
//!
//! A listing page interleaves date header rows with game rows. The
//! walker hunts for the target date's header (yesterday, in UTC),
//! collects the game rows under it, and decides whether the window
//! spills onto the next page or ended at the next header. These are
//! pure functions over parsed documents so fixtures exercise them
//! without any network.

use chrono::{DateTime, NaiveDate};
use scraper::{ElementRef, Html, Selector};

/// Hard cap on listing pages per run.
pub const MAX_PAGES: u32 = 20;

// Literal selectors are known-valid.
fn sel(raw: &str) -> Selector {
    Selector::parse(raw).unwrap()
}

/// First element sibling after `el`, skipping text nodes.
pub fn next_element_sibling(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut node = el.next_sibling();
    while let Some(n) = node {
        if let Some(e) = ElementRef::wrap(n) {
            return Some(e);
        }
        node = n.next_sibling();
    }
    None
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Date header rows: `tr.title` rows carrying the local-date
/// transform cell.
pub fn date_headers(doc: &Html) -> Vec<ElementRef<'_>> {
    let header = sel("tr.title");
    let date_cell = sel("td[data-action=\"transform-to-local-date\"]");
    doc.select(&header)
        .filter(|tr| tr.select(&date_cell).next().is_some())
        .collect()
}

/// Find the header row for the target date.
///
/// Preference order: machine-readable `data-date` attribute, then the
/// displayed text (`"February 2"` style). On the first page only, no
/// match falls back to the last header on the page, since the listing
/// opens scrolled past the target date.
pub fn find_target_header<'a>(
    headers: &[ElementRef<'a>],
    target: NaiveDate,
    display_target: &str,
    first_page: bool,
) -> Option<ElementRef<'a>> {
    let date_td = sel("td[data-date]");
    for header in headers {
        match header.select(&date_td).next() {
            Some(td) => {
                if let Some(raw) = td.value().attr("data-date") {
                    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                        if parsed.date_naive() == target {
                            return Some(*header);
                        }
                    }
                }
                if element_text(td).contains(display_target) {
                    return Some(*header);
                }
            }
            None => {
                if element_text(*header).contains(display_target) {
                    return Some(*header);
                }
            }
        }
    }
    if first_page {
        return headers.last().copied();
    }
    None
}

fn is_game_row(tr: ElementRef<'_>) -> bool {
    let team = sel("td.team");
    let result = sel("td.result");
    tr.select(&team).count() >= 2 && tr.select(&result).next().is_some()
}

fn is_date_header_row(tr: ElementRef<'_>, any_date_type: bool) -> bool {
    if has_class(tr, "title") || tr.value().attr("data-date").is_some() {
        return true;
    }
    let cell = if any_date_type {
        sel("td[data-date-type]")
    } else {
        sel("td[data-date-type=\"text\"]")
    };
    tr.select(&cell).next().is_some()
}

/// Game rows belonging to a date header: following siblings up to the
/// next header row.
pub fn rows_for_header(header: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    let mut current = next_element_sibling(header);
    while let Some(tr) = current {
        if is_date_header_row(tr, false) {
            break;
        }
        if is_game_row(tr) {
            rows.push(tr);
        }
        current = next_element_sibling(tr);
    }
    rows
}

/// Continuation collection: the window started on a previous page, so
/// its remaining rows sit at the top of this one, ending at the first
/// header.
pub fn rows_from_top(doc: &Html) -> Vec<ElementRef<'_>> {
    let table = sel("table.table");
    let body_rows = sel("tbody > tr");
    let mut rows = Vec::new();
    let Some(table) = doc.select(&table).next() else {
        return rows;
    };
    for tr in table.select(&body_rows) {
        if is_date_header_row(tr, true) {
            break;
        }
        if is_game_row(tr) {
            rows.push(tr);
        }
    }
    rows
}

/// What sits after the last collected row, deciding pagination.
#[derive(Debug, PartialEq, Eq)]
pub enum WindowEnd {
    /// A new date header follows: the window is complete.
    NextDateHeader,
    /// The table ends here: the window may continue on the next page.
    PageEnd,
    /// Something else follows (notes, ad rows): treat as complete.
    OtherContent,
}

pub fn window_end(last_row: ElementRef<'_>) -> WindowEnd {
    match next_element_sibling(last_row) {
        None => WindowEnd::PageEnd,
        Some(tr) if is_date_header_row(tr, false) => WindowEnd::NextDateHeader,
        Some(_) => WindowEnd::OtherContent,
    }
}

/// Href of the pagination link whose text contains "next", if any.
pub fn next_page_url(doc: &Html, base_url: &str) -> Option<String> {
    let link = sel(".table-pagination a");
    for a in doc.select(&link) {
        if element_text(a).to_lowercase().contains("next") {
            let href = a.value().attr("href")?;
            if href.is_empty() {
                return None;
            }
            return Some(absolutize(href, base_url));
        }
    }
    None
}

/// Both teams' page URLs from a game row. The first link in a team
/// cell is the logo; the second carries the team name.
pub fn row_team_links(row: ElementRef<'_>, base_url: &str) -> Vec<String> {
    let team = sel("td.team");
    let anchor = sel("a");
    row.select(&team)
        .take(2)
        .filter_map(|td| {
            let a = td.select(&anchor).nth(1)?;
            let href = a.value().attr("href")?;
            Some(absolutize(href, base_url))
        })
        .collect()
}

/// Player profile links from a team roster page, restricted to rows
/// carrying the wanted nationality flag.
pub fn team_player_links(doc: &Html, flag_alt: &str, base_url: &str) -> Vec<String> {
    let row = sel("tr");
    let img = sel("img[alt]");
    let player_link = sel("a[href^=\"/player/\"]");
    let mut links = Vec::new();
    for tr in doc.select(&row) {
        let flagged = tr
            .select(&img)
            .any(|i| i.value().attr("alt") == Some(flag_alt));
        if !flagged {
            continue;
        }
        if let Some(a) = tr.select(&player_link).next() {
            if let Some(href) = a.value().attr("href") {
                links.push(absolutize(href, base_url));
            }
        }
    }
    links
}

pub fn absolutize(href: &str, base_url: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{base_url}{href}")
    } else {
        format!("{base_url}/{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(body: &str) -> Html {
        Html::parse_document(&format!(
            "<html><body><table class=\"table\"><tbody>{body}</tbody></table></body></html>"
        ))
    }

    const HEADER_FEB2: &str = r#"<tr class="title"><td data-action="transform-to-local-date" data-date="2026-02-02T12:00:00+00:00">February 2</td></tr>"#;
    const HEADER_FEB3: &str = r#"<tr class="title"><td data-action="transform-to-local-date" data-date="2026-02-03T12:00:00+00:00">February 3</td></tr>"#;
    const GAME_ROW: &str = r#"<tr><td class="team"><a href="/x">L</a><a href="/team/1/alpha">Alpha</a></td><td class="result">3 - 2</td><td class="team"><a href="/y">L</a><a href="/team/2/beta">Beta</a></td></tr>"#;

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()
    }

    #[test]
    fn header_matches_by_machine_date() {
        let doc = listing(&format!("{HEADER_FEB3}{HEADER_FEB2}{GAME_ROW}"));
        let headers = date_headers(&doc);
        assert_eq!(headers.len(), 2);
        let found = find_target_header(&headers, target(), "February 2", false).unwrap();
        assert!(element_text(found).contains("February 2"));
    }

    #[test]
    fn header_matches_by_display_text_when_date_unparseable() {
        let doc = listing(
            r#"<tr class="title"><td data-action="transform-to-local-date" data-date="not-a-date">February 2</td></tr>"#,
        );
        let headers = date_headers(&doc);
        assert!(find_target_header(&headers, target(), "February 2", false).is_some());
    }

    #[test]
    fn first_page_falls_back_to_last_header() {
        let doc = listing(&format!("{HEADER_FEB3}{HEADER_FEB3}"));
        let headers = date_headers(&doc);
        assert!(find_target_header(&headers, target(), "February 2", false).is_none());
        let fallback = find_target_header(&headers, target(), "February 2", true).unwrap();
        assert!(element_text(fallback).contains("February 3"));
    }

    #[test]
    fn rows_stop_at_next_header() {
        let doc = listing(&format!("{HEADER_FEB2}{GAME_ROW}{GAME_ROW}{HEADER_FEB3}{GAME_ROW}"));
        let headers = date_headers(&doc);
        let header = find_target_header(&headers, target(), "February 2", false).unwrap();
        let rows = rows_for_header(header);
        assert_eq!(rows.len(), 2);
        assert_eq!(window_end(rows[1]), WindowEnd::NextDateHeader);
    }

    #[test]
    fn page_end_allows_continuation() {
        let doc = listing(&format!("{HEADER_FEB2}{GAME_ROW}"));
        let headers = date_headers(&doc);
        let header = find_target_header(&headers, target(), "February 2", false).unwrap();
        let rows = rows_for_header(header);
        assert_eq!(rows.len(), 1);
        assert_eq!(window_end(rows[0]), WindowEnd::PageEnd);
    }

    #[test]
    fn continuation_rows_collected_until_first_header() {
        let doc = listing(&format!("{GAME_ROW}{GAME_ROW}{GAME_ROW}{HEADER_FEB3}{GAME_ROW}"));
        let rows = rows_from_top(&doc);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn continuation_is_empty_when_page_opens_with_header() {
        let doc = listing(&format!("{HEADER_FEB3}{GAME_ROW}"));
        assert!(rows_from_top(&doc).is_empty());
    }

    #[test]
    fn team_links_take_second_anchor() {
        let doc = listing(&format!("{HEADER_FEB2}{GAME_ROW}"));
        let headers = date_headers(&doc);
        let header = find_target_header(&headers, target(), "February 2", false).unwrap();
        let rows = rows_for_header(header);
        let links = row_team_links(rows[0], "https://site.test");
        assert_eq!(
            links,
            vec![
                "https://site.test/team/1/alpha".to_string(),
                "https://site.test/team/2/beta".to_string(),
            ]
        );
    }

    #[test]
    fn next_link_found_by_text() {
        let doc = Html::parse_document(
            r#"<div class="table-pagination"><a href="/games?page=1">Prev</a><a href="/games?page=3">Next page</a></div>"#,
        );
        assert_eq!(
            next_page_url(&doc, "https://site.test"),
            Some("https://site.test/games?page=3".to_string())
        );
    }

    #[test]
    fn roster_rows_filtered_by_flag() {
        let doc = Html::parse_document(
            r#"<table><tbody>
            <tr><td><img alt="Sweden flag"></td><td><a href="/player/11/anders-a">Anders A</a></td></tr>
            <tr><td><img alt="Finland flag"></td><td><a href="/player/22/f-b">F B</a></td></tr>
            <tr><td><img alt="Sweden flag"></td><td>no link</td></tr>
            </tbody></table>"#,
        );
        let links = team_player_links(&doc, "Sweden flag", "https://site.test");
        assert_eq!(links, vec!["https://site.test/player/11/anders-a".to_string()]);
    }
}
