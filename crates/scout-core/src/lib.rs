//! Core domain model for the scouting mirror.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "scout-core";

/// Word the upstream uses in generated names for teams it has no real name for.
pub const PLACEHOLDER_NAME_WORD: &str = "Team";

/// Locally mirrored team row. `number` is the upstream-assigned key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub number: String,
    pub name: Option<String>,
    pub opr: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub rookie_year: Option<i64>,
    pub photo_path: Option<String>,
}

/// Biographical fields filled in by the enrichment pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBio {
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub rookie_year: Option<i64>,
}

/// One team's entry in an event snapshot, rating already normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub team_number: String,
    pub opr: f64,
}

/// Whether a stored team still needs its bio fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BioStatus {
    Missing,
    Placeholder,
    Present,
}

impl BioStatus {
    /// Classify a stored name. `None` means the team row does not exist.
    pub fn classify(stored_name: Option<Option<&str>>) -> Self {
        match stored_name {
            None | Some(None) => BioStatus::Missing,
            Some(Some(name)) if name.trim().is_empty() => BioStatus::Missing,
            Some(Some(name)) if is_placeholder_name(name) => BioStatus::Placeholder,
            Some(Some(_)) => BioStatus::Present,
        }
    }

    pub fn needs_enrichment(self) -> bool {
        !matches!(self, BioStatus::Present)
    }
}

/// `"Team 118"` is a placeholder, `"Teamwork Makes"` is not.
pub fn is_placeholder_name(name: &str) -> bool {
    name.split_whitespace().any(|word| word == PLACEHOLDER_NAME_WORD)
}

/// Driver-station slots, two per alliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Station {
    Red1,
    Red2,
    Blue1,
    Blue2,
}

impl Station {
    pub const ALL: [Station; 4] = [Station::Red1, Station::Red2, Station::Blue1, Station::Blue2];

    pub fn label(self) -> &'static str {
        match self {
            Station::Red1 => "Red1",
            Station::Red2 => "Red2",
            Station::Blue1 => "Blue1",
            Station::Blue2 => "Blue2",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

/// Persisted match row keyed by `match_num`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_num: i64,
    pub red1: String,
    pub red2: String,
    pub blue1: String,
    pub blue2: String,
    pub red_score: i64,
    pub blue_score: i64,
    pub completed: bool,
}

impl MatchRecord {
    /// Build a row from its parts; a match counts as played once either side has scored.
    pub fn new(match_num: i64, stations: [String; 4], red_score: i64, blue_score: i64) -> Self {
        let [red1, red2, blue1, blue2] = stations;
        Self {
            match_num,
            red1,
            red2,
            blue1,
            blue2,
            red_score,
            blue_score,
            completed: red_score > 0 || blue_score > 0,
        }
    }

    pub fn team_at(&self, station: Station) -> &str {
        match station {
            Station::Red1 => &self.red1,
            Station::Red2 => &self.red2,
            Station::Blue1 => &self.blue1,
            Station::Blue2 => &self.blue2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interview {
    pub team_number: String,
    pub answers: BTreeMap<String, String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drawing {
    pub team_number: String,
    pub image_data: String,
}

/// Everything the team page shows for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    pub team: Team,
    pub interview: Option<Interview>,
    pub drawing: Option<Drawing>,
}

/// Season/event selection plus sync cadence. Mutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub season: String,
    pub event_code: String,
    pub interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            season: "2025".to_string(),
            event_code: "CAABNILT1".to_string(),
            interval_secs: 300,
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub season: String,
    pub event_code: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub teams_seen: usize,
    pub bios_requested: usize,
    pub bios_applied: usize,
    pub matches_written: usize,
    pub matches_skipped: usize,
    pub schedule_refreshed: bool,
}
