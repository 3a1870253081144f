//! Payload parsing for FTCScout REST responses.

use scout_core::{MatchRecord, Participation, Station, TeamBio};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::numeric::{coerce_numeric, RATING_FIELDS, SCORE_FIELDS};

/// One untyped entry from the match list. Normalized by [`normalize_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch(pub JsonValue);

/// Why a single upstream record was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("entry is not an object")]
    NotAnObject,
    #[error("entry has no usable match number")]
    MissingMatchNumber,
    #[error("match number {0} is not positive")]
    NonPositiveMatchNumber(i64),
}

/// Team numbers come as integers in some payloads and strings in others.
pub fn json_team_number(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| format!("{f:.0}"))
            }
        }
        JsonValue::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn json_match_number(value: Option<&JsonValue>) -> Option<i64> {
    match value? {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_text(value: &JsonValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// `[{teamNumber, stats: {opr}}]`; entries without a team number are dropped.
pub fn parse_participations(payload: &JsonValue) -> Vec<Participation> {
    let Some(entries) = payload.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|entry| entry.is_object())
        .filter_map(|entry| {
            let team_number = json_team_number(entry.get("teamNumber"))?;
            let opr = coerce_numeric(
                entry.get("stats").and_then(|stats| stats.get("opr")),
                RATING_FIELDS,
            );
            Some(Participation { team_number, opr })
        })
        .collect()
}

/// Null entries are dropped here; everything else is judged by [`normalize_match`].
pub fn parse_match_list(payload: &JsonValue) -> Vec<RawMatch> {
    let Some(entries) = payload.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|entry| !entry.is_null())
        .cloned()
        .map(RawMatch)
        .collect()
}

pub fn normalize_match(raw: &RawMatch) -> Result<MatchRecord, MalformedRecord> {
    let entry = &raw.0;
    if !entry.is_object() {
        return Err(MalformedRecord::NotAnObject);
    }

    let match_num =
        json_match_number(entry.get("matchNumber")).ok_or(MalformedRecord::MissingMatchNumber)?;
    if match_num <= 0 {
        return Err(MalformedRecord::NonPositiveMatchNumber(match_num));
    }

    let scores = entry.get("scores");
    let red_score = coerce_numeric(scores.and_then(|s| s.get("red")), SCORE_FIELDS) as i64;
    let blue_score = coerce_numeric(scores.and_then(|s| s.get("blue")), SCORE_FIELDS) as i64;

    let mut stations: [String; 4] = Default::default();
    for slot in entry
        .get("teams")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
    {
        let Some(station) = slot
            .get("station")
            .and_then(JsonValue::as_str)
            .and_then(Station::from_label)
        else {
            continue;
        };
        stations[station as usize] = json_team_number(slot.get("teamNumber")).unwrap_or_default();
    }

    Ok(MatchRecord::new(match_num, stations, red_score, blue_score))
}

/// A bio without a real name is treated as absent so it cannot blank out a stored one.
pub fn parse_bio(payload: &JsonValue) -> Option<TeamBio> {
    if !payload.is_object() {
        return None;
    }
    let name = json_text(payload, "name")?;
    let rookie_year = payload.get("rookieYear").and_then(|v| match v {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    Some(TeamBio {
        name,
        city: json_text(payload, "city"),
        state: json_text(payload, "state"),
        country: json_text(payload, "country"),
        rookie_year,
    })
}
