//! SQLite-backed prompt and guardrail registries.
//!
//! Thin read-mostly wrappers over a shared pool. The schema is created on
//! open; seeding is the caller's job. Agents treat both registries as
//! read-only after startup.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::guardrail::GuardrailPolicy;
use crate::types::{Error, Result};

/// Open (creating if missing) the registry database at `path`.
pub async fn open_pool(path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))
        .map_err(|e| Error::validation(format!("bad registry path {}: {}", path, e)))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// In-memory registry for tests and ephemeral runs.
pub async fn open_in_memory() -> Result<SqlitePool> {
    // a single connection keeps every query on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS prompts (
            name TEXT PRIMARY KEY,
            template TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS guardrails (
            name TEXT PRIMARY KEY,
            blocked_terms TEXT NOT NULL,
            reason TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Named prompt templates.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    pool: SqlitePool,
}

impl PromptRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT template FROM prompts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("template")?),
            None => None,
        })
    }

    /// Fetch a template, falling back to (and persisting) `default` when
    /// the registry has no entry yet.
    pub async fn get_or_seed(&self, name: &str, default: &str) -> Result<String> {
        if let Some(template) = self.get(name).await? {
            return Ok(template);
        }
        self.upsert(name, default).await?;
        Ok(default.to_string())
    }

    pub async fn upsert(&self, name: &str, template: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO prompts (name, template) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET template = excluded.template",
        )
        .bind(name)
        .bind(template)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Named guardrail policies.
#[derive(Debug, Clone)]
pub struct GuardrailRegistry {
    pool: SqlitePool,
}

impl GuardrailRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load_policies(&self) -> Result<Vec<GuardrailPolicy>> {
        let rows = sqlx::query("SELECT name, blocked_terms, reason FROM guardrails ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let terms_json: String = row.try_get("blocked_terms")?;
            let reason: String = row.try_get("reason")?;
            let blocked_terms: Vec<String> = serde_json::from_str(&terms_json)
                .map_err(|e| Error::decode(format!("policy {} has bad term list: {}", name, e)))?;
            policies.push(GuardrailPolicy {
                name,
                blocked_terms,
                reason,
            });
        }
        Ok(policies)
    }

    pub async fn upsert(&self, policy: &GuardrailPolicy) -> Result<()> {
        let terms_json = serde_json::to_string(&policy.blocked_terms)?;
        sqlx::query(
            "INSERT INTO guardrails (name, blocked_terms, reason) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 blocked_terms = excluded.blocked_terms,
                 reason = excluded.reason",
        )
        .bind(&policy.name)
        .bind(terms_json)
        .bind(&policy.reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
