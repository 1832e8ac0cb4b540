//! The unit of work the pool dispatches. Each variant maps to one of the
//! operations the plugin lifecycle manager, event processor, and scheduler
//! drive through the pool rather than running inline.

use eventworks_broker::envelope::IngestionEnvelope;
use eventworks_core::ids::{PluginConfigId, TeamId};

#[derive(Debug, Clone)]
pub enum TaskKind {
    ProcessEvent {
        team_id: TeamId,
        envelope: IngestionEnvelope,
    },
    ProcessEventBatch {
        team_id: TeamId,
        envelopes: Vec<IngestionEnvelope>,
    },
    IngestEvent {
        team_id: TeamId,
        envelope: IngestionEnvelope,
    },
    MatchActions {
        team_id: TeamId,
        envelope: IngestionEnvelope,
    },
    RunEveryMinute {
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
    },
    RunEveryHour {
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
    },
    RunEveryDay {
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
    },
    GetPluginSchedule,
    ReloadPlugins {
        team_id: TeamId,
    },
    ReloadSchedule,
    ReloadAction {
        team_id: TeamId,
        action_id: i64,
    },
    ReloadAllActions {
        team_id: TeamId,
    },
    DropAction {
        team_id: TeamId,
        action_id: i64,
    },
    TeardownPlugins {
        team_id: TeamId,
    },
    FlushQueuedWrites,
}

impl TaskKind {
    /// A short, stable label for logging and stats, independent of the
    /// variant's payload.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::ProcessEvent { .. } => "process_event",
            TaskKind::ProcessEventBatch { .. } => "process_event_batch",
            TaskKind::IngestEvent { .. } => "ingest_event",
            TaskKind::MatchActions { .. } => "match_actions",
            TaskKind::RunEveryMinute { .. } => "run_every_minute",
            TaskKind::RunEveryHour { .. } => "run_every_hour",
            TaskKind::RunEveryDay { .. } => "run_every_day",
            TaskKind::GetPluginSchedule => "get_plugin_schedule",
            TaskKind::ReloadPlugins { .. } => "reload_plugins",
            TaskKind::ReloadSchedule => "reload_schedule",
            TaskKind::ReloadAction { .. } => "reload_action",
            TaskKind::ReloadAllActions { .. } => "reload_all_actions",
            TaskKind::DropAction { .. } => "drop_action",
            TaskKind::TeardownPlugins { .. } => "teardown_plugins",
            TaskKind::FlushQueuedWrites => "flush_queued_writes",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    pub events_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_is_stable_regardless_of_payload() {
        let a = TaskKind::ReloadPlugins { team_id: TeamId(1) };
        let b = TaskKind::ReloadPlugins { team_id: TeamId(999) };
        assert_eq!(a.label(), b.label());
        assert_eq!(a.label(), "reload_plugins");
    }
}
