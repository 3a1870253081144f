//! Concurrent bio lookups for teams that still lack a real name.

use futures::stream::{self, StreamExt};
use scout_core::TeamBio;
use tracing::debug;

use crate::{AdapterContext, UpstreamSource};

pub const DEFAULT_ENRICH_WORKERS: usize = 5;

/// Look up every team with at most `workers` requests in flight.
///
/// Returns exactly one outcome per input, in completion order. A failed lookup
/// is `None` and does not affect the others.
pub async fn fetch_bios_concurrently<S>(
    source: &S,
    ctx: &AdapterContext,
    team_numbers: Vec<String>,
    workers: usize,
) -> Vec<(String, Option<TeamBio>)>
where
    S: UpstreamSource + ?Sized,
{
    let requested = team_numbers.len();
    let outcomes: Vec<(String, Option<TeamBio>)> = stream::iter(team_numbers)
        .map(|team_number| async move {
            let bio = source.fetch_bio(ctx, &team_number).await;
            (team_number, bio)
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let found = outcomes.iter().filter(|(_, bio)| bio.is_some()).count();
    debug!(run_id = %ctx.run_id, requested, found, "bio enrichment batch finished");
    outcomes
}
