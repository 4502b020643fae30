//! Postgres-backed credential store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};
use std::time::Duration;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{CredentialStore, Identity, InsertOutcome, ProfileFields, ProfileUpdate, UpdateOutcome};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS identities (
    id            UUID PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    dark_mode     BOOLEAN NOT NULL DEFAULT FALSE,
    refresh_rate  BIGINT NOT NULL DEFAULT 60000,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

const SELECT_BY_USERNAME: &str = "SELECT id, username, password_hash, first_name, last_name, dark_mode, refresh_rate FROM identities WHERE username = $1";

const INSERT: &str = "INSERT INTO identities (id, username, password_hash, first_name, last_name, dark_mode, refresh_rate) VALUES ($1, $2, $3, $4, $5, $6, $7)";

const UPDATE: &str = r"
UPDATE identities SET
    username     = COALESCE($2, username),
    first_name   = COALESCE($3, first_name),
    last_name    = COALESCE($4, last_name),
    dark_mode    = COALESCE($5, dark_mode),
    refresh_rate = COALESCE($6, refresh_rate)
WHERE id = $1";

const DELETE_BY_USERNAME: &str = "DELETE FROM identities WHERE username = $1";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and make sure the `identities` table exists.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or the schema cannot be created.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if the DDL statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .instrument(db_span("CREATE", SCHEMA))
            .await
            .context("Failed to create identities table")?;
        Ok(())
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity> {
    Ok(Identity {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        profile: ProfileFields {
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            dark_mode: row.try_get("dark_mode")?,
            refresh_rate: row.try_get("refresh_rate")?,
        },
    })
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        let row = sqlx::query(SELECT_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", SELECT_BY_USERNAME))
            .await
            .context("Failed to fetch identity")?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn insert(&self, identity: Identity) -> Result<InsertOutcome> {
        let result = sqlx::query(INSERT)
            .bind(identity.id)
            .bind(&identity.username)
            .bind(&identity.password_hash)
            .bind(&identity.profile.first_name)
            .bind(&identity.profile.last_name)
            .bind(identity.profile.dark_mode)
            .bind(identity.profile.refresh_rate)
            .execute(&self.pool)
            .instrument(db_span("INSERT", INSERT))
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("Failed to insert identity"),
        }
    }

    async fn update_fields(&self, id: Uuid, fields: &ProfileUpdate) -> Result<UpdateOutcome> {
        let result = sqlx::query(UPDATE)
            .bind(id)
            .bind(fields.username.as_deref())
            .bind(fields.first_name.as_deref())
            .bind(fields.last_name.as_deref())
            .bind(fields.dark_mode)
            .bind(fields.refresh_rate)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", UPDATE))
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(UpdateOutcome::NotFound),
            Ok(_) => Ok(UpdateOutcome::Updated),
            Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::Conflict),
            Err(err) => Err(err).context("Failed to update identity"),
        }
    }

    async fn delete_by_username(&self, username: &str) -> Result<u64> {
        let done = sqlx::query(DELETE_BY_USERNAME)
            .bind(username)
            .execute(&self.pool)
            .instrument(db_span("DELETE", DELETE_BY_USERNAME))
            .await
            .context("Failed to delete identity")?;

        Ok(done.rows_affected())
    }
}
