use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection, PgPool};

use crate::config::DbConfig;

pub async fn create_pool(config: &DbConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))
}

/// Runs migrations from a runtime-loaded directory (not the compile-time
/// `sqlx::migrate!()` macro), so no live database is required at compile
/// time.
pub async fn run_migrations(pool: &PgPool, migrations_dir: &Path) -> anyhow::Result<()> {
    sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .with_context(|| format!("loading migrations from {}", migrations_dir.display()))?
        .run(pool)
        .await
        .context("running migrations")?;
    Ok(())
}

pub fn default_migrations_path() -> PathBuf {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations")).to_path_buf()
}

/// Creates `config.database_name()` if it does not already exist, connecting
/// via the maintenance database. The database name is validated against an
/// ASCII-alphanumeric-or-underscore allowlist before being interpolated into
/// `CREATE DATABASE`, since Postgres does not allow parameterizing
/// identifiers.
pub async fn ensure_database_exists(config: &DbConfig) -> anyhow::Result<()> {
    let db_name = config.database_name();
    anyhow::ensure!(
        !db_name.is_empty() && db_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "refusing to create database with unsafe name: {db_name:?}"
    );

    let mut conn = PgConnection::connect(&config.maintenance_url())
        .await
        .context("connecting to maintenance database")?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(db_name)
        .fetch_one(&mut conn)
        .await
        .context("checking pg_database")?;

    if !exists {
        sqlx::query(&format!("CREATE DATABASE {db_name}"))
            .execute(&mut conn)
            .await
            .with_context(|| format!("creating database {db_name}"))?;
    }
    Ok(())
}

/// Row counts per table, for diagnostics (`orchestrator db status`).
pub async fn table_counts(pool: &PgPool) -> anyhow::Result<Vec<(String, i64)>> {
    let tables: Vec<(String,)> =
        sqlx::query_as("SELECT tablename FROM pg_tables WHERE schemaname = 'public'")
            .fetch_all(pool)
            .await
            .context("listing tables")?;

    let mut counts = Vec::with_capacity(tables.len());
    for (table,) in tables {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("counting {table}"))?;
        counts.push((table, count));
    }
    Ok(counts)
}
