use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use scout_adapters::{
    fetch_bios_concurrently, normalize_match, AdapterContext, UpstreamSource,
    DEFAULT_ENRICH_WORKERS,
};
use scout_core::{MatchRecord, SyncRunSummary, SyncSettings, TeamBio};
use scout_storage::Store;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What a pass reports back to the scheduler or manual trigger.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Completed(SyncRunSummary),
    Failed { run_id: Uuid, error: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            SyncOutcome::Completed(summary) => summary.run_id,
            SyncOutcome::Failed { run_id, .. } => *run_id,
        }
    }
}

/// Merges upstream snapshots into the store. Sole writer of team ratings/bios and matches.
pub struct Reconciler {
    store: Store,
    source: Arc<dyn UpstreamSource>,
    enrich_workers: usize,
    pass_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: Store, source: Arc<dyn UpstreamSource>) -> Self {
        Self {
            store,
            source,
            enrich_workers: DEFAULT_ENRICH_WORKERS,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn with_enrich_workers(mut self, workers: usize) -> Self {
        self.enrich_workers = workers.max(1);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one full pass. Passes are serialized; a caller arriving mid-pass waits its turn.
    pub async fn perform_sync(&self, settings: &SyncSettings) -> SyncOutcome {
        let _pass = self.pass_lock.lock().await;
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "sync_pass",
            %run_id,
            source = self.source.source_id(),
            season = %settings.season,
            event = %settings.event_code
        );

        match self.run_pass(run_id, settings).instrument(span).await {
            Ok(summary) => {
                let elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds();
                info!(
                    %run_id,
                    teams = summary.teams_seen,
                    bios_applied = summary.bios_applied,
                    matches = summary.matches_written,
                    skipped = summary.matches_skipped,
                    schedule_refreshed = summary.schedule_refreshed,
                    elapsed_ms,
                    "sync finished"
                );
                SyncOutcome::Completed(summary)
            }
            Err(err) => {
                error!(%run_id, error = ?err, "sync pass failed; store unchanged");
                SyncOutcome::Failed {
                    run_id,
                    error: format!("{err:#}"),
                }
            }
        }
    }

    async fn run_pass(&self, run_id: Uuid, settings: &SyncSettings) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let ctx = AdapterContext::new(run_id);
        let (season, event_code) = (settings.season.as_str(), settings.event_code.as_str());
        info!("sync start");

        let participations = self
            .source
            .fetch_team_participations(&ctx, season, event_code)
            .await;
        if participations.is_empty() {
            warn!("no team participations this cycle");
        }

        let mut seen = HashSet::new();
        let mut needing_bio = Vec::new();
        for part in &participations {
            if !seen.insert(part.team_number.as_str()) {
                continue;
            }
            let status = self
                .store
                .team_bio_status(&part.team_number)
                .await
                .with_context(|| format!("reading bio status for team {}", part.team_number))?;
            if status.needs_enrichment() {
                needing_bio.push(part.team_number.clone());
            }
        }

        let bios_requested = needing_bio.len();
        let bios: Vec<(String, TeamBio)> = if needing_bio.is_empty() {
            Vec::new()
        } else {
            info!(teams = bios_requested, "fetching missing bios");
            fetch_bios_concurrently(self.source.as_ref(), &ctx, needing_bio, self.enrich_workers)
                .await
                .into_iter()
                .filter_map(|(team, bio)| bio.map(|bio| (team, bio)))
                .collect()
        };

        let raw_matches = self
            .source
            .fetch_match_schedule(&ctx, season, event_code)
            .await;
        let schedule_refreshed = !raw_matches.is_empty();
        let mut matches: Vec<MatchRecord> = Vec::with_capacity(raw_matches.len());
        let mut matches_skipped = 0usize;
        for raw in &raw_matches {
            match normalize_match(raw) {
                Ok(record) => matches.push(record),
                Err(reason) => {
                    matches_skipped += 1;
                    debug!(%reason, "skipping match entry");
                }
            }
        }

        let mut tx = self.store.begin().await.context("opening sync transaction")?;
        for part in &participations {
            tx.upsert_team_rating(&part.team_number, part.opr)
                .await
                .with_context(|| format!("writing rating for team {}", part.team_number))?;
        }

        let mut bios_applied = 0usize;
        for (team, bio) in &bios {
            if tx
                .upsert_team_bio(team, bio)
                .await
                .with_context(|| format!("writing bio for team {team}"))?
            {
                bios_applied += 1;
            }
        }

        if schedule_refreshed {
            let dropped = tx
                .delete_incomplete_matches()
                .await
                .context("clearing unplayed matches")?;
            debug!(dropped, "cleared unplayed matches");
            for record in &matches {
                tx.upsert_match(record)
                    .await
                    .with_context(|| format!("writing match {}", record.match_num))?;
            }
        } else {
            warn!("no usable match schedule this cycle; stored matches kept");
        }

        tx.commit().await.context("committing sync transaction")?;

        Ok(SyncRunSummary {
            run_id,
            season: settings.season.clone(),
            event_code: settings.event_code.clone(),
            started_at,
            finished_at: Utc::now(),
            teams_seen: seen.len(),
            bios_requested,
            bios_applied,
            matches_written: if schedule_refreshed { matches.len() } else { 0 },
            matches_skipped,
            schedule_refreshed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{open_temp_store, FakeUpstream};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<FakeUpstream>, Reconciler) {
        let (dir, store) = open_temp_store().await;
        let fake = Arc::new(FakeUpstream::default());
        let reconciler = Reconciler::new(store, fake.clone());
        (dir, fake, reconciler)
    }

    fn settings() -> SyncSettings {
        SyncSettings::default()
    }

    fn played(num: i64, red: i64, blue: i64) -> serde_json::Value {
        json!({
            "matchNumber": num,
            "teams": [
                {"station": "Red1", "teamNumber": 1},
                {"station": "Red2", "teamNumber": 2},
                {"station": "Blue1", "teamNumber": 3},
                {"station": "Blue2", "teamNumber": 4}
            ],
            "scores": {"red": red, "blue": blue}
        })
    }

    #[tokio::test]
    async fn second_pass_over_same_snapshot_is_identical() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_teams(json!([
            {"teamNumber": 1, "stats": {"opr": 10.0}},
            {"teamNumber": 2, "stats": {"opr": {"value": 20.0}}}
        ]));
        fake.set_bio("1", "Alpha");
        fake.set_bio("2", "Beta");
        fake.set_matches(vec![played(1, 10, 5), played(2, 0, 0)]);

        assert!(reconciler.perform_sync(&settings()).await.is_success());
        let first = serde_json::to_value(reconciler.store().export_snapshot().await.unwrap()).unwrap();
        assert!(reconciler.perform_sync(&settings()).await.is_success());
        let second = serde_json::to_value(reconciler.store().export_snapshot().await.unwrap()).unwrap();

        assert_eq!(first, second);
        // real names are not re-fetched
        assert_eq!(fake.bio_requests().len(), 2);
    }

    #[tokio::test]
    async fn renumbered_schedule_never_duplicates() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_matches(vec![played(1, 0, 0), played(2, 0, 0), played(2, 0, 0)]);
        reconciler.perform_sync(&settings()).await;
        fake.set_matches(vec![played(2, 0, 0), played(3, 0, 0)]);
        reconciler.perform_sync(&settings()).await;

        let nums: Vec<i64> = reconciler
            .store()
            .match_schedule()
            .await
            .unwrap()
            .iter()
            .map(|m| m.match_num)
            .collect();
        assert_eq!(nums, vec![2, 3]);
    }

    #[tokio::test]
    async fn omitted_unplayed_match_is_removed() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_matches(vec![played(42, 0, 0), played(1, 0, 0)]);
        reconciler.perform_sync(&settings()).await;
        assert!(reconciler.store().match_record(42).await.unwrap().is_some());

        fake.set_matches(vec![played(1, 0, 0)]);
        reconciler.perform_sync(&settings()).await;
        assert!(reconciler.store().match_record(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn omitted_completed_match_is_kept() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_matches(vec![played(7, 30, 12)]);
        reconciler.perform_sync(&settings()).await;
        let before = reconciler.store().match_record(7).await.unwrap().expect("match 7");
        assert!(before.completed);

        fake.set_matches(vec![played(8, 0, 0)]);
        reconciler.perform_sync(&settings()).await;
        assert_eq!(reconciler.store().match_record(7).await.unwrap(), Some(before));
    }

    #[tokio::test]
    async fn rating_shapes_are_coerced() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_teams(json!([
            {"teamNumber": 1, "stats": {"opr": {"value": 42.5}}},
            {"teamNumber": 2, "stats": {"opr": 42.5}},
            {"teamNumber": 3}
        ]));
        reconciler.perform_sync(&settings()).await;

        let store = reconciler.store();
        assert_eq!(store.team("1").await.unwrap().unwrap().opr, 42.5);
        assert_eq!(store.team("2").await.unwrap().unwrap().opr, 42.5);
        assert_eq!(store.team("3").await.unwrap().unwrap().opr, 0.0);
    }

    #[tokio::test]
    async fn latest_rating_wins_even_when_lower() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_teams(json!([{"teamNumber": 1, "stats": {"opr": 80.0}}]));
        reconciler.perform_sync(&settings()).await;
        fake.set_teams(json!([{"teamNumber": 1, "stats": {"opr": null}}]));
        reconciler.perform_sync(&settings()).await;
        assert_eq!(reconciler.store().team("1").await.unwrap().unwrap().opr, 0.0);
    }

    #[tokio::test]
    async fn absent_bio_keeps_existing_name() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_teams(json!([{"teamNumber": 118, "stats": {"opr": 1.0}}]));
        fake.set_bio("118", "Robonauts");
        reconciler.perform_sync(&settings()).await;

        fake.clear_bios();
        fake.set_teams(json!([{"teamNumber": 118, "stats": {"opr": 2.0}}]));
        assert!(reconciler.perform_sync(&settings()).await.is_success());

        let team = reconciler.store().team("118").await.unwrap().unwrap();
        assert_eq!(team.name.as_deref(), Some("Robonauts"));
        assert_eq!(team.opr, 2.0);
    }

    #[tokio::test]
    async fn placeholder_names_are_retried_until_real() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_teams(json!([{"teamNumber": 118, "stats": {"opr": 1.0}}]));
        fake.set_bio("118", "Team 118");

        for pass in 1..=3 {
            reconciler.perform_sync(&settings()).await;
            assert_eq!(fake.bio_requests().len(), pass);
        }

        fake.set_bio("118", "Robonauts");
        reconciler.perform_sync(&settings()).await;
        assert_eq!(fake.bio_requests().len(), 4);
        reconciler.perform_sync(&settings()).await;
        assert_eq!(fake.bio_requests().len(), 4);
        let team = reconciler.store().team("118").await.unwrap().unwrap();
        assert_eq!(team.name.as_deref(), Some("Robonauts"));
    }

    #[tokio::test]
    async fn partial_bio_failures_still_apply_the_rest() {
        let (_dir, fake, reconciler) = setup().await;
        let teams: Vec<_> = (1..=10)
            .map(|n| json!({"teamNumber": n, "stats": {"opr": n}}))
            .collect();
        fake.set_teams(json!(teams));
        for n in 1..=10 {
            if ![3, 6, 9].contains(&n) {
                fake.set_bio(&n.to_string(), &format!("Squad {n}"));
            }
        }

        let outcome = reconciler.perform_sync(&settings()).await;
        let SyncOutcome::Completed(summary) = outcome else {
            panic!("pass failed");
        };
        assert_eq!(summary.bios_requested, 10);
        assert_eq!(summary.bios_applied, 7);

        let named = reconciler
            .store()
            .team_directory()
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.name.is_some())
            .count();
        assert_eq!(named, 7);
    }

    #[tokio::test]
    async fn nested_scores_derive_completion() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_matches(vec![
            json!({"matchNumber": 1, "scores": {"red": {"total": 0}, "blue": {"amount": 55}}}),
            json!({"matchNumber": 2, "scores": {"red": {"total": 0}, "blue": 0}}),
            json!({"matchNumber": 0, "scores": {"red": 5, "blue": 5}}),
            json!({"matchNumber": "abc"}),
        ]);
        let SyncOutcome::Completed(summary) = reconciler.perform_sync(&settings()).await else {
            panic!("pass failed");
        };
        assert_eq!(summary.matches_skipped, 2);

        let m1 = reconciler.store().match_record(1).await.unwrap().unwrap();
        assert_eq!((m1.red_score, m1.blue_score, m1.completed), (0, 55, true));
        assert_eq!(m1.red1, "");
        let m2 = reconciler.store().match_record(2).await.unwrap().unwrap();
        assert!(!m2.completed);
        assert!(reconciler.store().match_record(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_schedule_fetch_still_updates_teams() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_matches(vec![played(5, 0, 0)]);
        reconciler.perform_sync(&settings()).await;

        fake.set_teams(json!([{"teamNumber": 1, "stats": {"opr": 9.5}}]));
        fake.set_matches(Vec::new());
        let outcome = reconciler.perform_sync(&settings()).await;

        let SyncOutcome::Completed(summary) = outcome else {
            panic!("pass failed");
        };
        assert!(!summary.schedule_refreshed);
        assert_eq!(reconciler.store().team("1").await.unwrap().unwrap().opr, 9.5);
        // unplayed match survives because no schedule arrived to replace it
        assert!(reconciler.store().match_record(5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn store_failure_rolls_back_the_whole_pass() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_teams(json!([{"teamNumber": 1, "stats": {"opr": 1.0}}]));
        reconciler.perform_sync(&settings()).await;

        drop_matches_table(reconciler.store()).await;
        fake.set_teams(json!([{"teamNumber": 1, "stats": {"opr": 99.0}}]));
        fake.set_matches(vec![played(1, 0, 0)]);
        let outcome = reconciler.perform_sync(&settings()).await;

        assert!(!outcome.is_success());
        assert_eq!(reconciler.store().team("1").await.unwrap().unwrap().opr, 1.0);
    }

    async fn drop_matches_table(store: &Store) {
        sqlx::query("DROP TABLE matches")
            .execute(store.pool())
            .await
            .expect("drop matches");
    }

    #[tokio::test]
    async fn concurrent_passes_are_serialized() {
        let (_dir, fake, reconciler) = setup().await;
        fake.set_teams(json!([{"teamNumber": 1, "stats": {"opr": 1.0}}]));
        fake.set_matches(vec![played(1, 0, 0)]);
        fake.set_fetch_delay_ms(30);
        let reconciler = Arc::new(reconciler);

        let a = tokio::spawn({
            let r = Arc::clone(&reconciler);
            async move { r.perform_sync(&SyncSettings::default()).await }
        });
        let b = tokio::spawn({
            let r = Arc::clone(&reconciler);
            async move { r.perform_sync(&SyncSettings::default()).await }
        });
        assert!(a.await.unwrap().is_success());
        assert!(b.await.unwrap().is_success());
        assert_eq!(fake.passes(), 2);
        assert_eq!(fake.peak_concurrent_passes(), 1);
    }
}
