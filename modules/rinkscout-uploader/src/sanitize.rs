//! Pre-upload record sanitation.
//!
//! The API rejects whole batches over single malformed fields, so
//! every record is repaired or excluded before any window is sent.

use chrono::{Datelike, NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

/// Result of sanitizing the full record set. `excluded` holds the
/// `profile_link` of every record that could not be repaired.
#[derive(Debug, Default)]
pub struct SanitizeOutcome {
    pub kept: Vec<Value>,
    pub excluded: Vec<String>,
}

/// Fields the API requires to be strings; `null` becomes `""`.
const NULLABLE_STRING_FIELDS: &[&str] = &["shoots", "nation", "place_of_birth", "position"];

/// Repair each record in place, dropping the ones that cannot be
/// made acceptable.
pub fn sanitize_records(records: Vec<Value>) -> SanitizeOutcome {
    let mut outcome = SanitizeOutcome::default();
    for mut record in records {
        match sanitize_record(&mut record) {
            Ok(()) => outcome.kept.push(record),
            Err(reason) => {
                let link = profile_link(&record);
                warn!(profile_link = %link, "Excluding record from upload: {reason}");
                outcome.excluded.push(link);
            }
        }
    }
    outcome
}

fn sanitize_record(record: &mut Value) -> Result<(), String> {
    let Some(obj) = record.as_object_mut() else {
        return Err("not a JSON object".to_string());
    };

    for field in NULLABLE_STRING_FIELDS {
        if obj.get(*field).map(Value::is_null).unwrap_or(false) {
            obj.insert((*field).to_string(), Value::String(String::new()));
        }
    }

    let age = obj.get("age").map(field_text).unwrap_or_default();
    let digits = digits_only(&age);
    if !digits.is_empty() {
        obj.insert("age".to_string(), Value::String(digits));
        return Ok(());
    }

    let birthdate = obj.get("birthdate").map(field_text).unwrap_or_default();
    match derive_age_from_birthdate(&birthdate, Utc::now().date_naive()) {
        Some(age) => {
            obj.insert("age".to_string(), Value::String(age.to_string()));
            Ok(())
        }
        None => Err(format!(
            "age {age:?} has no digits and birthdate {birthdate:?} is unusable"
        )),
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Age from a `"Feb 3, 2001"` style birthdate, rejected when outside
/// a plausible 0..=90 range.
pub fn derive_age_from_birthdate(birthdate: &str, today: NaiveDate) -> Option<i32> {
    let born = NaiveDate::parse_from_str(birthdate.trim(), "%b %d, %Y").ok()?;
    let mut age = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    (0..=90).contains(&age).then_some(age)
}

pub fn profile_link(record: &Value) -> String {
    record
        .get("profile_link")
        .and_then(Value::as_str)
        .unwrap_or("<no profile_link>")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digit_ages_pass_through_cleaned() {
        let outcome = sanitize_records(vec![json!({"age": "24 yrs", "profile_link": "x"})]);
        assert_eq!(outcome.kept[0]["age"], "24");
        assert!(outcome.excluded.is_empty());
    }

    #[test]
    fn age_derived_from_birthdate_when_missing() {
        let outcome = sanitize_records(vec![json!({
            "age": "-",
            "birthdate": "Feb 3, 2001",
            "profile_link": "x"
        })]);
        let age: i32 = outcome.kept[0]["age"].as_str().unwrap().parse().unwrap();
        assert!((20..=30).contains(&age));
    }

    #[test]
    fn unusable_records_are_excluded_by_link() {
        let outcome = sanitize_records(vec![json!({
            "age": "unknown",
            "birthdate": "sometime",
            "profile_link": "https://site.test/player/9/x"
        })]);
        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.excluded, vec!["https://site.test/player/9/x"]);
    }

    #[test]
    fn null_string_fields_become_empty() {
        let outcome = sanitize_records(vec![json!({
            "age": "19",
            "shoots": null,
            "nation": null,
            "place_of_birth": "Umeå, SWE",
            "position": null
        })]);
        let kept = &outcome.kept[0];
        assert_eq!(kept["shoots"], "");
        assert_eq!(kept["nation"], "");
        assert_eq!(kept["position"], "");
        assert_eq!(kept["place_of_birth"], "Umeå, SWE");
    }

    #[test]
    fn birthdate_age_bounds_are_enforced() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(derive_age_from_birthdate("Feb 3, 2001", today), Some(25));
        assert_eq!(derive_age_from_birthdate("Sep 1, 2001", today), Some(24));
        assert_eq!(derive_age_from_birthdate("Jan 1, 1900", today), None);
        assert_eq!(derive_age_from_birthdate("garbage", today), None);
    }
}
