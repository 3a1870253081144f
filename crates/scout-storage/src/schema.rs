use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS teams (
        number      TEXT PRIMARY KEY,
        name        TEXT,
        opr         REAL NOT NULL DEFAULT 0,
        city        TEXT,
        state       TEXT,
        country     TEXT,
        rookie_year INTEGER,
        photo_path  TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        match_num  INTEGER PRIMARY KEY,
        red1       TEXT NOT NULL DEFAULT '',
        red2       TEXT NOT NULL DEFAULT '',
        blue1      TEXT NOT NULL DEFAULT '',
        blue2      TEXT NOT NULL DEFAULT '',
        red_score  INTEGER NOT NULL DEFAULT 0,
        blue_score INTEGER NOT NULL DEFAULT 0,
        completed  INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS matches_completed_idx ON matches (completed)",
    r#"
    CREATE TABLE IF NOT EXISTS interviews (
        team_num TEXT PRIMARY KEY,
        answers  TEXT NOT NULL DEFAULT '{}',
        notes    TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS drawings (
        team_num   TEXT PRIMARY KEY,
        image_data TEXT NOT NULL
    )
    "#,
];

/// Idempotent; safe on every startup.
pub(crate) async fn apply(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
