//! Adapts the event processor and plugin lifecycle manager to the worker
//! pool's [`TaskRunner`] trait: one `match` per [`TaskKind`] variant, no
//! logic of its own beyond dispatch.

use async_trait::async_trait;
use eventworks_core::error::Result;
use eventworks_database::ActionRepository;
use eventworks_ingest::EventProcessor;
use eventworks_plugins::manager::PluginLifecycleManager;
use eventworks_workers::{TaskKind, TaskOutput, TaskRunner};
use std::sync::Arc;

pub struct IngestionTaskRunner {
    processor: Arc<EventProcessor>,
    plugins: Arc<PluginLifecycleManager>,
    actions: Arc<ActionRepository>,
}

impl IngestionTaskRunner {
    pub fn new(
        processor: Arc<EventProcessor>,
        plugins: Arc<PluginLifecycleManager>,
        actions: Arc<ActionRepository>,
    ) -> Self {
        Self {
            processor,
            plugins,
            actions,
        }
    }
}

#[async_trait]
impl TaskRunner for IngestionTaskRunner {
    async fn run(&self, task: TaskKind) -> Result<TaskOutput> {
        match task {
            TaskKind::IngestEvent { envelope, .. } | TaskKind::ProcessEvent { envelope, .. } => {
                self.processor.process(envelope).await?;
                Ok(TaskOutput { events_produced: 1 })
            }
            TaskKind::ProcessEventBatch { envelopes, .. } => {
                let produced = self.processor.process_batch(envelopes).await?;
                Ok(TaskOutput {
                    events_produced: produced,
                })
            }
            TaskKind::MatchActions { team_id, envelope } => {
                let matched = self
                    .actions
                    .match_actions(team_id, &envelope.event, &envelope.properties)
                    .await?;
                if !matched.is_empty() {
                    tracing::info!(
                        team_id = %team_id,
                        event_uuid = %envelope.uuid,
                        matched_actions = ?matched,
                        "event matched actions"
                    );
                }
                Ok(TaskOutput::default())
            }
            TaskKind::RunEveryMinute {
                team_id,
                plugin_config_id,
            } => {
                self.plugins
                    .run_plugin_task(team_id, plugin_config_id, "run_every_minute")
                    .await?;
                Ok(TaskOutput::default())
            }
            TaskKind::RunEveryHour {
                team_id,
                plugin_config_id,
            } => {
                self.plugins
                    .run_plugin_task(team_id, plugin_config_id, "run_every_hour")
                    .await?;
                Ok(TaskOutput::default())
            }
            TaskKind::RunEveryDay {
                team_id,
                plugin_config_id,
            } => {
                self.plugins
                    .run_plugin_task(team_id, plugin_config_id, "run_every_day")
                    .await?;
                Ok(TaskOutput::default())
            }
            TaskKind::GetPluginSchedule => Ok(TaskOutput::default()),
            TaskKind::ReloadPlugins { team_id } => {
                self.plugins.setup_plugins(team_id).await?;
                Ok(TaskOutput::default())
            }
            TaskKind::ReloadSchedule => Ok(TaskOutput::default()),
            TaskKind::ReloadAction { .. }
            | TaskKind::ReloadAllActions { .. }
            | TaskKind::DropAction { .. } => {
                // Action cache reloads have no in-process cache to refresh
                // yet; actions are read fresh from the repository.
                Ok(TaskOutput::default())
            }
            TaskKind::TeardownPlugins { team_id } => {
                self.plugins.teardown_plugins(team_id);
                Ok(TaskOutput::default())
            }
            TaskKind::FlushQueuedWrites => Ok(TaskOutput::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventworks_broker::envelope::IngestionEnvelope;
    use eventworks_core::ids::TeamId;

    fn test_envelope() -> IngestionEnvelope {
        IngestionEnvelope {
            uuid: uuid::Uuid::now_v7(),
            team_id: 1,
            distinct_id: "abc".to_string(),
            event: "pageview".to_string(),
            properties: serde_json::json!({}),
            timestamp: None,
            sent_at: None,
            offset_ms: None,
            received_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn action_reload_task_kinds_are_accepted_without_panicking() {
        let _ = TaskKind::ReloadAllActions { team_id: TeamId(1) };
        let _ = test_envelope();
    }
}
