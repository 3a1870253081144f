//! Upstream source contract + the FTCScout REST adapter.
//!
//! Every fetch here is tolerant: transport errors, non-success statuses and
//! malformed bodies come back as empty lists or `None`, never as errors.

use std::time::Duration;

use async_trait::async_trait;
use scout_core::{Participation, TeamBio};
use scout_storage::HttpFetcher;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod enrich;
pub mod numeric;
pub mod parse;

pub use enrich::{fetch_bios_concurrently, DEFAULT_ENRICH_WORKERS};
pub use numeric::{coerce_numeric, RawNumeric};
pub use parse::{normalize_match, MalformedRecord, RawMatch};

pub const CRATE_NAME: &str = "scout-adapters";

pub const DEFAULT_BASE_URL: &str = "https://api.ftcscout.org/rest/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
}

impl AdapterContext {
    pub fn new(run_id: Uuid) -> Self {
        Self { run_id }
    }
}

#[async_trait]
pub trait UpstreamSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_team_participations(
        &self,
        ctx: &AdapterContext,
        season: &str,
        event_code: &str,
    ) -> Vec<Participation>;

    async fn fetch_match_schedule(
        &self,
        ctx: &AdapterContext,
        season: &str,
        event_code: &str,
    ) -> Vec<RawMatch>;

    async fn fetch_bio(&self, ctx: &AdapterContext, team_number: &str) -> Option<TeamBio>;
}

#[derive(Debug, Clone, Copy)]
pub struct FtcScoutTimeouts {
    pub snapshot: Duration,
    pub bio: Duration,
}

impl Default for FtcScoutTimeouts {
    fn default() -> Self {
        Self {
            snapshot: Duration::from_secs(10),
            bio: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub struct FtcScoutRest {
    http: HttpFetcher,
    base_url: String,
    timeouts: FtcScoutTimeouts,
}

impl FtcScoutRest {
    pub fn new(http: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeouts: FtcScoutTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: FtcScoutTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn event_url(&self, season: &str, event_code: &str, resource: &str) -> String {
        format!("{}/events/{season}/{event_code}/{resource}", self.base_url)
    }

    pub fn team_url(&self, team_number: &str) -> String {
        format!("{}/teams/{team_number}", self.base_url)
    }

    async fn get_json(&self, ctx: &AdapterContext, url: &str, timeout: Duration) -> Option<JsonValue> {
        match self.http.fetch_json(ctx.run_id, url, timeout).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(run_id = %ctx.run_id, url, error = %err, "upstream fetch failed; treating as no data");
                None
            }
        }
    }
}

#[async_trait]
impl UpstreamSource for FtcScoutRest {
    fn source_id(&self) -> &'static str {
        "ftcscout-rest"
    }

    async fn fetch_team_participations(
        &self,
        ctx: &AdapterContext,
        season: &str,
        event_code: &str,
    ) -> Vec<Participation> {
        let url = self.event_url(season, event_code, "teams");
        let Some(payload) = self.get_json(ctx, &url, self.timeouts.snapshot).await else {
            return Vec::new();
        };
        if !payload.is_array() {
            warn!(run_id = %ctx.run_id, url = %url, "team list is not an array; ignoring");
        }
        parse::parse_participations(&payload)
    }

    async fn fetch_match_schedule(
        &self,
        ctx: &AdapterContext,
        season: &str,
        event_code: &str,
    ) -> Vec<RawMatch> {
        let url = self.event_url(season, event_code, "matches");
        let Some(payload) = self.get_json(ctx, &url, self.timeouts.snapshot).await else {
            return Vec::new();
        };
        if !payload.is_array() {
            warn!(run_id = %ctx.run_id, url = %url, "match list is not an array; ignoring");
        }
        parse::parse_match_list(&payload)
    }

    async fn fetch_bio(&self, ctx: &AdapterContext, team_number: &str) -> Option<TeamBio> {
        let url = self.team_url(team_number);
        let payload = self.get_json(ctx, &url, self.timeouts.bio).await?;
        let bio = parse::parse_bio(&payload);
        if bio.is_none() {
            debug!(run_id = %ctx.run_id, team_number, "bio payload had no usable name");
        }
        bio
    }
}
