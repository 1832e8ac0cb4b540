//! Minimal embedded migration runner, following the teacher's hand-rolled
//! `Migrator`/`Migration` pair rather than pulling in a migration crate.

use eventworks_core::error::{Error, Result};
use sqlx::PgPool;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    pub fn add(&mut self, migration: Migration) -> &mut Self {
        self.migrations.push(migration);
        self.migrations.sort_by_key(|m| m.version);
        self
    }

    pub fn with_migrations(mut self, migrations: Vec<Migration>) -> Self {
        for m in migrations {
            self.add(m);
        }
        self
    }

    pub async fn run(&self, pool: &PgPool) -> Result<Vec<i64>> {
        self.ensure_migrations_table(pool).await?;
        let applied = self.applied_versions(pool).await?;
        let mut newly_applied = Vec::new();

        for migration in &self.migrations {
            if applied.contains(&migration.version) {
                continue;
            }

            let mut tx = pool
                .begin()
                .await
                .map_err(|e| Error::database_with_source("failed to start migration tx", e))?;

            sqlx::query(&migration.sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::database_with_source(
                        format!("migration {} ({}) failed", migration.version, migration.name),
                        e,
                    )
                })?;

            sqlx::query("INSERT INTO eventworks_migrations (version, name) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(&migration.name)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::database_with_source("failed to record migration", e))?;

            tx.commit()
                .await
                .map_err(|e| Error::database_with_source("failed to commit migration", e))?;

            newly_applied.push(migration.version);
        }

        Ok(newly_applied)
    }

    async fn ensure_migrations_table(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS eventworks_migrations ( \
                version BIGINT PRIMARY KEY, \
                name TEXT NOT NULL, \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW() \
            )",
        )
        .execute(pool)
        .await
        .map_err(|e| Error::database_with_source("failed to create migrations table", e))?;
        Ok(())
    }

    async fn applied_versions(&self, pool: &PgPool) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT version FROM eventworks_migrations")
            .fetch_all(pool)
            .await
            .map_err(|e| Error::database_with_source("failed to read applied migrations", e))?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("version")).collect())
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_migrations_sorted_by_version() {
        let mut migrator = Migrator::new();
        migrator.add(Migration::new(2, "second", "SELECT 2"));
        migrator.add(Migration::new(1, "first", "SELECT 1"));

        assert_eq!(migrator.migrations[0].version, 1);
        assert_eq!(migrator.migrations[1].version, 2);
    }
}
