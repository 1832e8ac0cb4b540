//! Plugin and plugin-config repository backing the load protocol
//! (`setupPlugins`): read every enabled config for a team, in pipeline
//! order, along with the plugin row it references.

use crate::models::{PluginConfigRow, PluginLogEntryRow, PluginLogLevel, PluginRow};
use crate::pool::DatabasePool;
use eventworks_core::error::{Error, Result};
use eventworks_core::ids::{PluginConfigId, TeamId};
use uuid::Uuid;

pub struct PluginRepository {
    pool: DatabasePool,
}

/// A plugin config joined with its plugin row, as needed to instantiate a
/// sandbox and run it against a team's pipeline.
#[derive(Debug, Clone)]
pub struct LoadedPluginConfig {
    pub config: PluginConfigRow,
    pub plugin: PluginRow,
}

impl PluginRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Returns every enabled plugin config for `team_id`, sorted by
    /// `(order, id)` ascending — the strict pipeline invocation order.
    pub async fn load_pipeline(&self, team_id: TeamId) -> Result<Vec<LoadedPluginConfig>> {
        let configs = sqlx::query_as::<_, PluginConfigRow>(&format!(
            "SELECT {columns} FROM plugin_configs \
             WHERE team_id = $1 AND enabled = true \
             ORDER BY \"order\" ASC, id ASC",
            columns = PluginConfigRow::COLUMNS,
        ))
        .bind(team_id.0)
        .fetch_all(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to load plugin configs", e))?;

        let mut loaded = Vec::with_capacity(configs.len());
        for config in configs {
            let plugin = sqlx::query_as::<_, PluginRow>(
                "SELECT id, name, url, source_bundle_hash, is_global, created_at, updated_at, capabilities \
                 FROM plugins WHERE id = $1",
            )
            .bind(config.plugin_id)
            .fetch_optional(self.pool.raw())
            .await
            .map_err(|e| Error::database_with_source("failed to load plugin", e))?
            .ok_or_else(|| Error::not_found("plugin", config.plugin_id.to_string()))?;

            loaded.push(LoadedPluginConfig { config, plugin });
        }

        Ok(loaded)
    }

    /// Every team with at least one enabled plugin config, for the
    /// server's startup/reload sweep that calls `setup_plugins` per team.
    pub async fn list_team_ids_with_enabled_plugins(&self) -> Result<Vec<TeamId>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT DISTINCT team_id FROM plugin_configs WHERE enabled = true",
        )
        .fetch_all(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to list teams with plugins", e))?;

        Ok(rows.into_iter().map(|(id,)| TeamId(id)).collect())
    }

    /// Records an error against a config without disturbing its
    /// `updated_at` — a plugin that merely threw once during event
    /// processing keeps its compiled VM on the next reload, per the
    /// "plugin runtime error" taxonomy: the event passes through
    /// unchanged and nothing else about the plugin is disturbed.
    pub async fn record_error(
        &self,
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
        error: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE plugin_configs SET error = $1 WHERE id = $2")
            .bind(serde_json::json!({ "message": error }))
            .bind(plugin_config_id.0)
            .execute(self.pool.raw())
            .await
            .map_err(|e| Error::database_with_source("failed to record plugin error", e))?;

        self.append_log(
            team_id,
            plugin_config_id,
            Uuid::nil(),
            PluginLogLevel::Error,
            error,
        )
        .await
    }

    /// Persists a newly observed capability descriptor for a plugin,
    /// called after a successful compile whenever it differs from the
    /// previously stored one.
    pub async fn update_capabilities(&self, plugin_id: i64, capabilities: serde_json::Value) -> Result<()> {
        sqlx::query("UPDATE plugins SET capabilities = $1 WHERE id = $2")
            .bind(capabilities)
            .bind(plugin_id)
            .execute(self.pool.raw())
            .await
            .map_err(|e| Error::database_with_source("failed to persist plugin capabilities", e))?;
        Ok(())
    }

    /// Disables a plugin config after permanent init failure, so the next
    /// `setupPlugins` load (which only selects `enabled = true` rows)
    /// drops it entirely instead of retrying compilation.
    pub async fn disable(&self, plugin_config_id: PluginConfigId) -> Result<()> {
        sqlx::query("UPDATE plugin_configs SET enabled = false, updated_at = NOW() WHERE id = $1")
            .bind(plugin_config_id.0)
            .execute(self.pool.raw())
            .await
            .map_err(|e| Error::database_with_source("failed to disable plugin config", e))?;
        Ok(())
    }

    pub async fn append_log(
        &self,
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
        instance_id: Uuid,
        level: PluginLogLevel,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO plugin_log_entries (id, team_id, plugin_config_id, instance_id, timestamp, level, message) \
             VALUES ($1, $2, $3, $4, NOW(), $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(team_id.0)
        .bind(plugin_config_id.0)
        .bind(instance_id)
        .bind(level)
        .bind(message)
        .execute(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to append plugin log entry", e))?;
        Ok(())
    }

    pub async fn recent_logs(
        &self,
        plugin_config_id: PluginConfigId,
        limit: i64,
    ) -> Result<Vec<PluginLogEntryRow>> {
        sqlx::query_as::<_, PluginLogEntryRow>(
            "SELECT id, team_id, plugin_config_id, instance_id, timestamp, level, message \
             FROM plugin_log_entries WHERE plugin_config_id = $1 \
             ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(plugin_config_id.0)
        .bind(limit)
        .fetch_all(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to load plugin log entries", e))
    }
}
