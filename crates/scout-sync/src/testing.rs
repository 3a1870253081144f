//! In-memory upstream and temp-store helpers shared by the sync tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scout_adapters::parse::{parse_match_list, parse_participations};
use scout_adapters::{AdapterContext, RawMatch, UpstreamSource};
use scout_core::{Participation, TeamBio};
use scout_storage::Store;
use serde_json::Value as JsonValue;
use tempfile::{tempdir, TempDir};

pub(crate) async fn open_temp_store() -> (TempDir, Store) {
    let dir = tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("scouting.db"))
        .await
        .expect("open store");
    (dir, store)
}

#[derive(Default)]
struct FakeState {
    teams: JsonValue,
    matches: Vec<JsonValue>,
    bios: HashMap<String, String>,
    bio_requests: Vec<String>,
    last_event: Option<(String, String)>,
}

/// Serves canned payloads through the real parsers.
#[derive(Default)]
pub(crate) struct FakeUpstream {
    state: Mutex<FakeState>,
    passes: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay_ms: AtomicU64,
}

impl FakeUpstream {
    pub(crate) fn set_teams(&self, payload: JsonValue) {
        self.state.lock().unwrap().teams = payload;
    }

    pub(crate) fn set_matches(&self, entries: Vec<JsonValue>) {
        self.state.lock().unwrap().matches = entries;
    }

    pub(crate) fn set_bio(&self, team: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .bios
            .insert(team.to_string(), name.to_string());
    }

    pub(crate) fn clear_bios(&self) {
        self.state.lock().unwrap().bios.clear();
    }

    pub(crate) fn set_fetch_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    pub(crate) fn bio_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().bio_requests.clone()
    }

    pub(crate) fn last_event(&self) -> Option<(String, String)> {
        self.state.lock().unwrap().last_event.clone()
    }

    /// Number of passes that reached the team fetch.
    pub(crate) fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight_passes(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_concurrent_passes(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamSource for FakeUpstream {
    fn source_id(&self) -> &'static str {
        "fake"
    }

    async fn fetch_team_participations(
        &self,
        _ctx: &AdapterContext,
        season: &str,
        event_code: &str,
    ) -> Vec<Participation> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let parsed = {
            let mut state = self.state.lock().unwrap();
            state.last_event = Some((season.to_string(), event_code.to_string()));
            parse_participations(&state.teams)
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        parsed
    }

    async fn fetch_match_schedule(
        &self,
        _ctx: &AdapterContext,
        _season: &str,
        _event_code: &str,
    ) -> Vec<RawMatch> {
        let entries = self.state.lock().unwrap().matches.clone();
        parse_match_list(&JsonValue::Array(entries))
    }

    async fn fetch_bio(&self, _ctx: &AdapterContext, team_number: &str) -> Option<TeamBio> {
        let mut state = self.state.lock().unwrap();
        state.bio_requests.push(team_number.to_string());
        let name = state.bios.get(team_number)?.clone();
        Some(TeamBio {
            name,
            city: Some("Anytown".to_string()),
            state: None,
            country: Some("USA".to_string()),
            rookie_year: Some(2020),
        })
    }
}
