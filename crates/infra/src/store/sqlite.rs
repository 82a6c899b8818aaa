//! SQLite-backed game store.
//!
//! Tables are created on demand by [`SqliteGameStore::ensure_schema`].
//! Timestamps are stored as RFC3339 text, ids as UUID text.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};

use syndicate_core::{
    ActionLogEntry, PlayerChanges, PlayerId, PlayerRecord, StatChanges, StatsRecord,
};

use super::{FailureClass, GameStore, StoreError, StoreResult, StoreTransaction};

/// How long a connection waits on a locked database before reporting `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 5;

/// Primary result codes (the low byte of an extended code).
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Game store over a SQLite pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SqliteGameStore {
    pool: SqlitePool,
}

impl SqliteGameStore {
    /// Open (creating if missing) the database at `url` in WAL mode.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database with the schema already applied.
    ///
    /// The pool is pinned to one connection that never expires, otherwise the
    /// database would vanish with it.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id        TEXT PRIMARY KEY,
                username  TEXT NOT NULL,
                cash      INTEGER NOT NULL DEFAULT 0 CHECK (cash >= 0),
                bank      INTEGER NOT NULL DEFAULT 0 CHECK (bank >= 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_stats (
                player_id         TEXT PRIMARY KEY,
                experience        INTEGER NOT NULL DEFAULT 0 CHECK (experience >= 0),
                respect           INTEGER NOT NULL DEFAULT 0 CHECK (respect >= 0),
                heat              INTEGER NOT NULL DEFAULT 0 CHECK (heat >= 0),
                crimes_committed  INTEGER NOT NULL DEFAULT 0 CHECK (crimes_committed >= 0),
                jailed_until      TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS action_log (
                id           TEXT PRIMARY KEY,
                player_id    TEXT NOT NULL,
                action       TEXT NOT NULL,
                detail       TEXT NOT NULL,
                amount       INTEGER NULL,
                occurred_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_action_log_player ON action_log (player_id, occurred_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl GameStore for SqliteGameStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx: Some(tx) }))
    }

    async fn player(&self, id: PlayerId) -> StoreResult<Option<PlayerRecord>> {
        fetch_player(&self.pool, id).await
    }

    async fn stats(&self, player_id: PlayerId) -> StoreResult<Option<StatsRecord>> {
        fetch_stats(&self.pool, player_id).await
    }

    async fn actions(&self, player_id: PlayerId, limit: usize) -> StoreResult<Vec<ActionLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT id, player_id, action, detail, amount, occurred_at
            FROM action_log
            WHERE player_id = ?1
            ORDER BY rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(player_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(action_from_row).collect()
    }
}

struct SqliteTransaction {
    /// `None` once committed or rolled back.
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTransaction {
    fn conn(&mut self) -> StoreResult<&mut SqliteConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::permanent("transaction already finished"))
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn create_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        let record = PlayerRecord::create(id, changes)?;
        insert_player(self.conn()?, &record).await
    }

    async fn update_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        let conn = self.conn()?;
        let mut record = fetch_player(&mut *conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found("players", id))?;
        record.apply(changes)?;
        save_player(conn, &record).await
    }

    async fn upsert_player(&mut self, id: PlayerId, changes: &PlayerChanges) -> StoreResult<()> {
        let conn = self.conn()?;
        match fetch_player(&mut *conn, id).await? {
            Some(mut record) => {
                record.apply(changes)?;
                save_player(conn, &record).await
            }
            None => insert_player(conn, &PlayerRecord::create(id, changes)?).await,
        }
    }

    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM players WHERE id = ?1")
            .bind(id.to_string())
            .execute(self.conn()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("players", id));
        }
        Ok(())
    }

    async fn create_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        let record = StatsRecord::create(player_id, changes)?;
        insert_stats(self.conn()?, &record).await
    }

    async fn update_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let mut record = fetch_stats(&mut *conn, player_id)
            .await?
            .ok_or_else(|| StoreError::not_found("player_stats", player_id))?;
        record.apply(changes)?;
        save_stats(conn, &record).await
    }

    async fn upsert_stats(
        &mut self,
        player_id: PlayerId,
        changes: &StatChanges,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        match fetch_stats(&mut *conn, player_id).await? {
            Some(mut record) => {
                record.apply(changes)?;
                save_stats(conn, &record).await
            }
            None => insert_stats(conn, &StatsRecord::create(player_id, changes)?).await,
        }
    }

    async fn delete_stats(&mut self, player_id: PlayerId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM player_stats WHERE player_id = ?1")
            .bind(player_id.to_string())
            .execute(self.conn()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("player_stats", player_id));
        }
        Ok(())
    }

    async fn append_action(&mut self, entry: &ActionLogEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO action_log (id, player_id, action, detail, amount, occurred_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.player_id.to_string())
        .bind(&entry.action)
        .bind(&entry.detail)
        .bind(entry.amount)
        .bind(entry.occurred_at.to_rfc3339())
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::permanent("transaction already finished"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

async fn fetch_player<'e, E>(executor: E, id: PlayerId) -> StoreResult<Option<PlayerRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, username, cash, bank FROM players WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(player_from_row).transpose()
}

async fn insert_player(conn: &mut SqliteConnection, record: &PlayerRecord) -> StoreResult<()> {
    sqlx::query("INSERT INTO players (id, username, cash, bank) VALUES (?1, ?2, ?3, ?4)")
        .bind(record.id.to_string())
        .bind(&record.username)
        .bind(record.cash)
        .bind(record.bank)
        .execute(conn)
        .await?;
    Ok(())
}

async fn save_player(conn: &mut SqliteConnection, record: &PlayerRecord) -> StoreResult<()> {
    sqlx::query("UPDATE players SET username = ?2, cash = ?3, bank = ?4 WHERE id = ?1")
        .bind(record.id.to_string())
        .bind(&record.username)
        .bind(record.cash)
        .bind(record.bank)
        .execute(conn)
        .await?;
    Ok(())
}

async fn fetch_stats<'e, E>(executor: E, player_id: PlayerId) -> StoreResult<Option<StatsRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT player_id, experience, respect, heat, crimes_committed, jailed_until
        FROM player_stats
        WHERE player_id = ?1
        "#,
    )
    .bind(player_id.to_string())
    .fetch_optional(executor)
    .await?;
    row.as_ref().map(stats_from_row).transpose()
}

async fn insert_stats(conn: &mut SqliteConnection, record: &StatsRecord) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO player_stats (player_id, experience, respect, heat, crimes_committed, jailed_until)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(record.player_id.to_string())
    .bind(record.experience)
    .bind(record.respect)
    .bind(record.heat)
    .bind(record.crimes_committed)
    .bind(record.jailed_until.map(|at| at.to_rfc3339()))
    .execute(conn)
    .await?;
    Ok(())
}

async fn save_stats(conn: &mut SqliteConnection, record: &StatsRecord) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE player_stats
        SET experience = ?2, respect = ?3, heat = ?4, crimes_committed = ?5, jailed_until = ?6
        WHERE player_id = ?1
        "#,
    )
    .bind(record.player_id.to_string())
    .bind(record.experience)
    .bind(record.respect)
    .bind(record.heat)
    .bind(record.crimes_committed)
    .bind(record.jailed_until.map(|at| at.to_rfc3339()))
    .execute(conn)
    .await?;
    Ok(())
}

fn player_from_row(row: &SqliteRow) -> StoreResult<PlayerRecord> {
    let id: String = row.try_get("id")?;
    Ok(PlayerRecord {
        id: id.parse()?,
        username: row.try_get("username")?,
        cash: row.try_get("cash")?,
        bank: row.try_get("bank")?,
    })
}

fn stats_from_row(row: &SqliteRow) -> StoreResult<StatsRecord> {
    let player_id: String = row.try_get("player_id")?;
    let jailed_until: Option<String> = row.try_get("jailed_until")?;
    Ok(StatsRecord {
        player_id: player_id.parse()?,
        experience: row.try_get("experience")?,
        respect: row.try_get("respect")?,
        heat: row.try_get("heat")?,
        crimes_committed: row.try_get("crimes_committed")?,
        jailed_until: jailed_until.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn action_from_row(row: &SqliteRow) -> StoreResult<ActionLogEntry> {
    let id: String = row.try_get("id")?;
    let player_id: String = row.try_get("player_id")?;
    let occurred_at: String = row.try_get("occurred_at")?;
    Ok(ActionLogEntry {
        id: id.parse()?,
        player_id: player_id.parse()?,
        action: row.try_get("action")?,
        detail: row.try_get("detail")?,
        amount: row.try_get("amount")?,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::permanent(format!("malformed timestamp {raw:?}: {e}")))
}

/// Sort a driver error into retryable or not.
///
/// Busy/locked databases, pool exhaustion and I/O failures can clear up on
/// their own; constraint violations, decode errors and the rest cannot.
pub fn classify(err: &sqlx::Error) -> FailureClass {
    match err {
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(SQLITE_BUSY | SQLITE_LOCKED) => FailureClass::Transient,
                _ => FailureClass::Permanent,
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => {
            FailureClass::Transient
        }
        _ => FailureClass::Permanent,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match classify(&err) {
            FailureClass::Transient => StoreError::Transient(err.to_string()),
            FailureClass::Permanent => StoreError::Permanent(err.to_string()),
        }
    }
}
