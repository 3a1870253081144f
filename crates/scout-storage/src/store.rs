//! SQLite-backed mirror of teams, matches and scouting annotations.
//!
//! The database runs in WAL mode so readers keep a consistent snapshot while a
//! reconciliation pass holds the single write transaction.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use scout_core::{
    BioStatus, Drawing, Interview, MatchRecord, Station, Team, TeamBio, TeamProfile,
};
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::info;

use crate::schema;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("encoding interview answers: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Full dump served by the export endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StoreExport {
    pub teams: Vec<Team>,
    pub interviews: Vec<Interview>,
    pub matches: Vec<MatchRecord>,
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file and bring the schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        schema::apply(&pool).await?;
        info!(path = %path.display(), "store opened (WAL)");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start the write transaction a reconciliation pass runs in.
    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    pub async fn upsert_team_rating(&self, number: &str, opr: f64) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_team_rating(&mut conn, number, opr).await
    }

    pub async fn upsert_team_bio(&self, number: &str, bio: &TeamBio) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_team_bio(&mut conn, number, bio).await
    }

    pub async fn team_bio_status(&self, number: &str) -> Result<BioStatus, StoreError> {
        let mut conn = self.pool.acquire().await?;
        team_bio_status(&mut conn, number).await
    }

    pub async fn delete_incomplete_matches(&self) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        delete_incomplete_matches(&mut conn).await
    }

    pub async fn upsert_match(&self, record: &MatchRecord) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_match(&mut conn, record).await
    }

    pub async fn team(&self, number: &str) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query(&format!("{TEAM_SELECT} WHERE number = ?"))
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(team_from_row).transpose()?)
    }

    pub async fn match_record(&self, match_num: i64) -> Result<Option<MatchRecord>, StoreError> {
        let row = sqlx::query(&format!("{MATCH_SELECT} WHERE match_num = ?"))
            .bind(match_num)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(match_from_row).transpose()?)
    }

    pub async fn top_teams_by_opr(&self, limit: u32) -> Result<Vec<Team>, StoreError> {
        let rows = sqlx::query(&format!("{TEAM_SELECT} ORDER BY opr DESC, number LIMIT ?"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(&rows, team_from_row)
    }

    /// Every team, ordered by its numeric team number.
    pub async fn team_directory(&self) -> Result<Vec<Team>, StoreError> {
        let rows = sqlx::query(&format!(
            "{TEAM_SELECT} ORDER BY CAST(number AS INTEGER), number"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect_rows(&rows, team_from_row)
    }

    pub async fn match_schedule(&self) -> Result<Vec<MatchRecord>, StoreError> {
        let rows = sqlx::query(&format!("{MATCH_SELECT} ORDER BY match_num ASC"))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(&rows, match_from_row)
    }

    pub async fn upcoming_matches(&self, limit: u32) -> Result<Vec<MatchRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "{MATCH_SELECT} WHERE completed = 0 ORDER BY match_num ASC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        collect_rows(&rows, match_from_row)
    }

    /// Team plus its annotations, read from one snapshot.
    pub async fn team_profile(&self, number: &str) -> Result<Option<TeamProfile>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let team = sqlx::query(&format!("{TEAM_SELECT} WHERE number = ?"))
            .bind(number)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(team) = team.as_ref().map(team_from_row).transpose()? else {
            return Ok(None);
        };
        let interview = sqlx::query("SELECT team_num, answers, notes FROM interviews WHERE team_num = ?")
            .bind(number)
            .fetch_optional(&mut *tx)
            .await?;
        let drawing = sqlx::query("SELECT team_num, image_data FROM drawings WHERE team_num = ?")
            .bind(number)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(TeamProfile {
            team,
            interview: interview.as_ref().map(interview_from_row).transpose()?,
            drawing: drawing.as_ref().map(drawing_from_row).transpose()?,
        }))
    }

    pub async fn save_interview(
        &self,
        team_number: &str,
        answers: &BTreeMap<String, String>,
        notes: &str,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(answers)?;
        sqlx::query("REPLACE INTO interviews (team_num, answers, notes) VALUES (?, ?, ?)")
            .bind(team_number)
            .bind(encoded)
            .bind(notes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn interview(&self, team_number: &str) -> Result<Option<Interview>, StoreError> {
        let row = sqlx::query("SELECT team_num, answers, notes FROM interviews WHERE team_num = ?")
            .bind(team_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(interview_from_row).transpose()?)
    }

    pub async fn save_drawing(&self, team_number: &str, image_data: &str) -> Result<(), StoreError> {
        sqlx::query("REPLACE INTO drawings (team_num, image_data) VALUES (?, ?)")
            .bind(team_number)
            .bind(image_data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn drawing(&self, team_number: &str) -> Result<Option<Drawing>, StoreError> {
        let row = sqlx::query("SELECT team_num, image_data FROM drawings WHERE team_num = ?")
            .bind(team_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(drawing_from_row).transpose()?)
    }

    /// Returns false when the team is not mirrored yet.
    pub async fn set_team_photo(&self, team_number: &str, photo_path: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE teams SET photo_path = ? WHERE number = ?")
            .bind(photo_path)
            .bind(team_number)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn export_snapshot(&self) -> Result<StoreExport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let teams = sqlx::query(&format!("{TEAM_SELECT} ORDER BY number"))
            .fetch_all(&mut *tx)
            .await?;
        let interviews = sqlx::query("SELECT team_num, answers, notes FROM interviews ORDER BY team_num")
            .fetch_all(&mut *tx)
            .await?;
        let matches = sqlx::query(&format!("{MATCH_SELECT} ORDER BY match_num"))
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(StoreExport {
            teams: collect_rows(&teams, team_from_row)?,
            interviews: collect_rows(&interviews, interview_from_row)?,
            matches: collect_rows(&matches, match_from_row)?,
        })
    }
}

/// Write half of a reconciliation pass. Dropping it without `commit` rolls back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn upsert_team_rating(&mut self, number: &str, opr: f64) -> Result<(), StoreError> {
        upsert_team_rating(&mut self.tx, number, opr).await
    }

    pub async fn upsert_team_bio(&mut self, number: &str, bio: &TeamBio) -> Result<bool, StoreError> {
        upsert_team_bio(&mut self.tx, number, bio).await
    }

    pub async fn team_bio_status(&mut self, number: &str) -> Result<BioStatus, StoreError> {
        team_bio_status(&mut self.tx, number).await
    }

    pub async fn delete_incomplete_matches(&mut self) -> Result<u64, StoreError> {
        delete_incomplete_matches(&mut self.tx).await
    }

    pub async fn upsert_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        upsert_match(&mut self.tx, record).await
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

const TEAM_SELECT: &str =
    "SELECT number, name, opr, city, state, country, rookie_year, photo_path FROM teams";
const MATCH_SELECT: &str =
    "SELECT match_num, red1, red2, blue1, blue2, red_score, blue_score, completed FROM matches";

async fn upsert_team_rating(
    conn: &mut SqliteConnection,
    number: &str,
    opr: f64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO teams (number, opr) VALUES (?, ?)
            ON CONFLICT(number) DO UPDATE SET opr = excluded.opr
        "#,
    )
    .bind(number)
    .bind(opr)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_team_bio(
    conn: &mut SqliteConnection,
    number: &str,
    bio: &TeamBio,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE teams
           SET name = ?, city = ?, state = ?, country = ?, rookie_year = ?
         WHERE number = ?
        "#,
    )
    .bind(&bio.name)
    .bind(&bio.city)
    .bind(&bio.state)
    .bind(&bio.country)
    .bind(bio.rookie_year)
    .bind(number)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn team_bio_status(conn: &mut SqliteConnection, number: &str) -> Result<BioStatus, StoreError> {
    let row = sqlx::query("SELECT name FROM teams WHERE number = ?")
        .bind(number)
        .fetch_optional(&mut *conn)
        .await?;
    let stored: Option<Option<String>> = row.map(|r| r.try_get("name")).transpose()?;
    Ok(BioStatus::classify(stored.as_ref().map(|n| n.as_deref())))
}

async fn delete_incomplete_matches(conn: &mut SqliteConnection) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM matches WHERE completed = 0")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn upsert_match(conn: &mut SqliteConnection, record: &MatchRecord) -> Result<(), StoreError> {
    // station columns follow Station::ALL order
    let mut query = sqlx::query(
        r#"
        INSERT OR REPLACE INTO matches
            (match_num, red1, red2, blue1, blue2, red_score, blue_score, completed)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.match_num);
    for station in Station::ALL {
        query = query.bind(record.team_at(station));
    }
    query
        .bind(record.red_score)
        .bind(record.blue_score)
        .bind(record.completed)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn collect_rows<T>(
    rows: &[SqliteRow],
    map: fn(&SqliteRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, StoreError> {
    Ok(rows.iter().map(map).collect::<Result<Vec<_>, _>>()?)
}

fn team_from_row(row: &SqliteRow) -> Result<Team, sqlx::Error> {
    Ok(Team {
        number: row.try_get("number")?,
        name: row.try_get("name")?,
        opr: row.try_get("opr")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        country: row.try_get("country")?,
        rookie_year: row.try_get("rookie_year")?,
        photo_path: row.try_get("photo_path")?,
    })
}

fn match_from_row(row: &SqliteRow) -> Result<MatchRecord, sqlx::Error> {
    Ok(MatchRecord {
        match_num: row.try_get("match_num")?,
        red1: row.try_get("red1")?,
        red2: row.try_get("red2")?,
        blue1: row.try_get("blue1")?,
        blue2: row.try_get("blue2")?,
        red_score: row.try_get("red_score")?,
        blue_score: row.try_get("blue_score")?,
        completed: row.try_get("completed")?,
    })
}

// Answers written by older builds may not be valid JSON; show them as empty.
fn interview_from_row(row: &SqliteRow) -> Result<Interview, sqlx::Error> {
    let answers: String = row.try_get("answers")?;
    Ok(Interview {
        team_number: row.try_get("team_num")?,
        answers: serde_json::from_str(&answers).unwrap_or_default(),
        notes: row.try_get("notes")?,
    })
}

fn drawing_from_row(row: &SqliteRow) -> Result<Drawing, sqlx::Error> {
    Ok(Drawing {
        team_number: row.try_get("team_num")?,
        image_data: row.try_get("image_data")?,
    })
}
