//! Ties the lock-holder election to the tick clock: only a `Leader`
//! consults the plugin schedule and submits dispatch tasks to the worker
//! pool. Running as `Follower` is always a no-op.

use crate::lock_holder::LockHolder;
use crate::tick::{Periodicity, TickClock};
use eventworks_core::config::SchedulerConfig;
use eventworks_core::ids::{PluginConfigId, TeamId};
use eventworks_plugins::manager::PluginLifecycleManager;
use eventworks_workers::{TaskKind, WorkerPool};
use std::sync::Arc;

pub struct SchedulerCoordinator {
    holder: LockHolder,
    clock: TickClock,
    plugins: Arc<PluginLifecycleManager>,
    pool: Arc<WorkerPool>,
}

impl SchedulerCoordinator {
    pub fn new(
        redis: Arc<deadpool_redis::Pool>,
        config: SchedulerConfig,
        plugins: Arc<PluginLifecycleManager>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            holder: LockHolder::new(redis, config),
            clock: TickClock::new(),
            plugins,
            pool,
        }
    }

    /// Runs the election/dispatch loop forever. Intended to be the body of
    /// the main replica's scheduler task.
    pub async fn run(&mut self) {
        loop {
            self.holder.tick().await;

            if self.holder.is_leader() {
                let due = self.clock.due(chrono::Utc::now());
                if !due.is_empty() {
                    self.dispatch_due(&due).await;
                }
            }

            tokio::time::sleep(self.holder.next_delay()).await;
        }
    }

    async fn dispatch_due(&self, due: &[Periodicity]) {
        for (team_id, plugin_config_id, task_name) in self.plugins.plugin_schedule() {
            let Some(periodicity) = Periodicity::from_task_name(&task_name) else {
                continue;
            };
            if !due.contains(&periodicity) {
                continue;
            }

            let task = task_for(periodicity, team_id, plugin_config_id);
            let pool = self.pool.clone();
            tokio::spawn(async move {
                if let Err(e) = pool.run(task).await {
                    tracing::warn!(
                        team_id = team_id.0,
                        plugin_config_id = plugin_config_id.0,
                        error = %e,
                        "scheduled plugin task failed"
                    );
                }
            });
        }
    }
}

fn task_for(periodicity: Periodicity, team_id: TeamId, plugin_config_id: PluginConfigId) -> TaskKind {
    match periodicity {
        Periodicity::Minute => TaskKind::RunEveryMinute { team_id, plugin_config_id },
        Periodicity::Hour => TaskKind::RunEveryHour { team_id, plugin_config_id },
        Periodicity::Day => TaskKind::RunEveryDay { team_id, plugin_config_id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_for_maps_periodicity_to_matching_task_kind() {
        let task = task_for(Periodicity::Hour, TeamId(1), PluginConfigId(2));
        assert_eq!(task.label(), "run_every_hour");
    }
}
