//! Postgres-backed invite ledger storage (sqlx).
//!
//! The `invites` table carries a unique index on `code`; a racing duplicate
//! claim fails at insert time and is reported as [`InsertOutcome::Conflict`].

use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};

use invitebot_core::{
    config::DatabaseConfig,
    errors::Error,
    ledger::InviteRecord,
    ports::{InsertOutcome, InviteStore},
    Result,
};

fn storage_err(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

/// Open a connection pool from the configured URL or connection parts.
pub async fn connect(cfg: &DatabaseConfig) -> Result<PgPool> {
    let options = match &cfg.url {
        Some(url) => url
            .parse::<PgConnectOptions>()
            .map_err(|e| Error::Config(format!("invalid DATABASE_URL: {e}")))?,
        None => PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.database),
    };

    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_with(options)
        .await
        .map_err(storage_err)?;
    tracing::info!(max_connections = cfg.max_connections, "connected to postgres");
    Ok(pool)
}

/// Create the `invites` table and its indexes.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await
        .map_err(|e| Error::Storage(format!("migration failed: {e}")))?;
    Ok(())
}

pub struct PgInviteStore {
    pool: PgPool,
}

impl PgInviteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InviteStore for PgInviteStore {
    async fn find_claimed(&self, account_id: &str) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i32>(
            r#"SELECT 1 FROM invites
               WHERE (code = $1 OR account_id = $1)
                 AND attempts > 0
               LIMIT 1"#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.is_some())
    }

    async fn insert_claim(&self, record: &InviteRecord) -> Result<InsertOutcome> {
        let res = sqlx::query(
            r#"INSERT INTO invites (code, attempts, account_id, creator)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&record.code)
        .bind(record.attempts)
        .bind(&record.account_id)
        .bind(&record.creator)
        .execute(&self.pool)
        .await;

        match res {
            Ok(done) => Ok(InsertOutcome::Inserted(done.rows_affected())),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::debug!(code = %record.code, "invite code already taken");
                Ok(InsertOutcome::Conflict)
            }
            Err(e) => Err(storage_err(e)),
        }
    }
}
