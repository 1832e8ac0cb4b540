//! Plugin Lifecycle Manager: owns `(team_id -> ordered [PluginConfig])`,
//! compiles and caches VMs, and exposes pipeline execution and task
//! invocation to the worker pool.

use crate::lazy_vm::{LazyVm, VmState};
use crate::retry::{exhausted, retry_delay};
use crate::sandbox::PluginSandbox;
use async_trait::async_trait;
use dashmap::DashMap;
use eventworks_core::config::PluginsConfig;
use eventworks_core::error::{Error, Result};
use eventworks_core::ids::{PluginConfigId, TeamId};
use eventworks_database::models::{PluginConfigRow, PluginRow};
use eventworks_database::plugins::{LoadedPluginConfig, PluginRepository};
use eventworks_events::bus::EventBus;
use eventworks_events::event::DomainEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fetches a plugin's compiled archive bytes. Downloading from the
/// plugin-archive HTTP API is an external collaborator (see the crate's
/// non-goals); this crate only depends on the trait.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn fetch(&self, plugin: &PluginRow) -> Result<Vec<u8>>;
}

struct PluginHandle {
    config: PluginConfigRow,
    plugin: PluginRow,
    vm: Arc<LazyVm>,
}

/// Outcome of dispatching one event through a team's pipeline.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// All plugins ran (or were skipped because their VM wasn't ready);
    /// the (possibly mutated) event survives.
    Passed(serde_json::Value),
    /// A plugin's `process_event` returned null — the event is dropped
    /// and no later plugin runs.
    Dropped,
}

pub struct PluginLifecycleManager {
    repo: Arc<PluginRepository>,
    archives: Arc<dyn ArchiveSource>,
    events: Arc<EventBus>,
    config: PluginsConfig,
    task_timeout: Duration,
    pipelines: DashMap<i64, Vec<Arc<PluginHandle>>>,
}

impl PluginLifecycleManager {
    pub fn new(
        repo: Arc<PluginRepository>,
        archives: Arc<dyn ArchiveSource>,
        events: Arc<EventBus>,
        config: PluginsConfig,
        task_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            archives,
            events,
            config,
            task_timeout,
            pipelines: DashMap::new(),
        }
    }

    /// `setupPlugins`: loads plugin/config rows for a team, reusing a
    /// previously compiled VM when neither the config's nor the plugin's
    /// `updated_at` changed, and scheduling (re)compilation otherwise.
    pub async fn setup_plugins(&self, team_id: TeamId) -> Result<()> {
        let loaded = self.repo.load_pipeline(team_id).await?;
        let existing = self
            .pipelines
            .get(&team_id.0)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut handles = Vec::with_capacity(loaded.len());
        for LoadedPluginConfig { config, plugin } in loaded {
            let reused = existing.iter().find(|h| {
                h.config.id == config.id
                    && h.config.updated_at == config.updated_at
                    && h.plugin.updated_at == plugin.updated_at
            });

            let handle = if let Some(reused) = reused {
                reused.clone()
            } else {
                Arc::new(PluginHandle {
                    config: config.clone(),
                    plugin: plugin.clone(),
                    vm: Arc::new(LazyVm::new()),
                })
            };

            handles.push(handle);
        }

        // (order, id) ascending — strict pipeline invocation order.
        handles.sort_by_key(|h| (h.config.order, h.config.id));

        for handle in &handles {
            if handle.vm.is_pending() {
                self.compile(team_id, handle.clone()).await;
            }
        }

        self.pipelines.insert(team_id.0, handles);
        Ok(())
    }

    async fn compile(&self, team_id: TeamId, handle: Arc<PluginHandle>) {
        let plugin_config_id = PluginConfigId(handle.config.id);
        let bytes = match self.archives.fetch(&handle.plugin).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail_permanently(team_id, plugin_config_id, &handle, e.to_string())
                    .await;
                return;
            }
        };

        match PluginSandbox::compile(handle.config.id, &bytes, self.task_timeout, 0) {
            Ok(sandbox) => {
                let descriptor = sandbox.capabilities().to_descriptor();
                if descriptor != handle.plugin.capabilities {
                    if let Err(e) = self.repo.update_capabilities(handle.plugin.id, descriptor).await {
                        tracing::error!(error = %e, "failed to persist plugin capability descriptor");
                    }
                }
                handle.vm.set(VmState::Ready(Arc::new(sandbox)));
            }
            Err(Error::PluginInitTransient { .. }) => {
                self.fail_transiently(team_id, plugin_config_id, &handle, 0)
                    .await;
            }
            Err(e) => {
                self.fail_permanently(team_id, plugin_config_id, &handle, e.to_string())
                    .await;
            }
        }
    }

    async fn fail_transiently(
        &self,
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
        handle: &Arc<PluginHandle>,
        attempt: u32,
    ) {
        if exhausted(attempt, self.config.retry_max_attempts) {
            self.fail_permanently(
                team_id,
                plugin_config_id,
                handle,
                "transient retries exhausted".to_string(),
            )
            .await;
            return;
        }

        let delay = retry_delay(
            attempt,
            self.config.retry_base_secs,
            self.config.retry_multiplier as u64,
        );
        handle.vm.set(VmState::TransientFail {
            attempt: attempt + 1,
            next_attempt_at: Instant::now() + delay,
        });
    }

    async fn fail_permanently(
        &self,
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
        handle: &Arc<PluginHandle>,
        reason: String,
    ) {
        handle.vm.set(VmState::PermanentFail {
            reason: reason.clone(),
        });

        if let Err(e) = self
            .repo
            .record_error(team_id, plugin_config_id, &reason)
            .await
        {
            tracing::error!(error = %e, "failed to persist plugin permanent-failure error");
        }

        if let Err(e) = self.repo.disable(plugin_config_id).await {
            tracing::error!(error = %e, "failed to disable permanently failed plugin config");
        }

        let _ = self
            .events
            .publish(
                DomainEvent::new("plugin.permanent_failure", serde_json::json!({ "reason": reason }))
                    .for_team(team_id.0)
                    .for_plugin_config(plugin_config_id.0),
            )
            .await;
    }

    /// Re-attempts compilation for any config whose transient-fail retry
    /// deadline has elapsed. Intended to be polled by the worker pool or a
    /// background ticker.
    pub async fn retry_due_vms(&self, team_id: TeamId) {
        let handles = self
            .pipelines
            .get(&team_id.0)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let now = Instant::now();
        for handle in handles {
            if handle.vm.due_for_retry(now) {
                let attempt = match handle.vm.state() {
                    VmState::TransientFail { attempt, .. } => attempt,
                    _ => continue,
                };
                handle.vm.set(VmState::Pending);
                self.compile(team_id, handle.clone()).await;
                let _ = attempt;
            }
        }
    }

    /// `runProcessEvent`: runs `event` through a team's ordered pipeline.
    /// A plugin with a null-resolved VM is skipped; a plugin returning
    /// null drops the event for every later plugin.
    pub async fn run_process_event(
        &self,
        team_id: TeamId,
        mut event: serde_json::Value,
    ) -> Result<PipelineOutcome> {
        let handles = self
            .pipelines
            .get(&team_id.0)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        for handle in handles {
            let Some(sandbox) = handle.vm.resolved() else {
                continue;
            };

            match sandbox
                .call(handle.config.id, "process_event", event.clone())
                .await
            {
                Ok(serde_json::Value::Null) => return Ok(PipelineOutcome::Dropped),
                Ok(next) => event = next,
                Err(e) => {
                    tracing::warn!(
                        plugin_config_id = handle.config.id,
                        error = %e,
                        "plugin runtime error, passing event through unchanged"
                    );
                    if let Err(record_err) = self
                        .repo
                        .record_error(team_id, PluginConfigId(handle.config.id), &e.to_string())
                        .await
                    {
                        tracing::error!(error = %record_err, "failed to record plugin runtime error");
                    }
                }
            }
        }

        Ok(PipelineOutcome::Passed(event))
    }

    /// `runProcessEvent` for a whole batch at once. A config whose VM
    /// exposes `process_event_batch` receives every still-active event in
    /// the batch in a single call, preferred over `process_event` per the
    /// pipeline's batch-task rule; a config without it falls back to
    /// invoking `process_event` once per still-active event, exactly as
    /// the single-event pipeline does.
    pub async fn run_process_event_batch(
        &self,
        team_id: TeamId,
        events: Vec<serde_json::Value>,
    ) -> Result<Vec<PipelineOutcome>> {
        let handles = self
            .pipelines
            .get(&team_id.0)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut slots: Vec<Option<serde_json::Value>> = events.into_iter().map(Some).collect();

        for handle in handles {
            let Some(sandbox) = handle.vm.resolved() else {
                continue;
            };

            if sandbox.capabilities().methods.contains("process_event_batch") {
                let active: Vec<usize> = slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.is_some().then_some(i))
                    .collect();
                if active.is_empty() {
                    continue;
                }

                let batch: Vec<serde_json::Value> =
                    active.iter().map(|&i| slots[i].clone().unwrap()).collect();

                match sandbox
                    .call(handle.config.id, "process_event_batch", serde_json::Value::Array(batch))
                    .await
                {
                    Ok(serde_json::Value::Array(results)) if results.len() == active.len() => {
                        for (slot, result) in active.into_iter().zip(results) {
                            slots[slot] = if result.is_null() { None } else { Some(result) };
                        }
                    }
                    Ok(_) => {
                        tracing::warn!(
                            plugin_config_id = handle.config.id,
                            "process_event_batch returned an unexpected shape, passing batch through unchanged"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            plugin_config_id = handle.config.id,
                            error = %e,
                            "plugin batch runtime error, passing batch through unchanged"
                        );
                        if let Err(record_err) = self
                            .repo
                            .record_error(team_id, PluginConfigId(handle.config.id), &e.to_string())
                            .await
                        {
                            tracing::error!(error = %record_err, "failed to record plugin runtime error");
                        }
                    }
                }
            } else {
                for slot in slots.iter_mut() {
                    let Some(event) = slot.clone() else {
                        continue;
                    };
                    match sandbox.call(handle.config.id, "process_event", event).await {
                        Ok(serde_json::Value::Null) => *slot = None,
                        Ok(next) => *slot = Some(next),
                        Err(e) => {
                            tracing::warn!(
                                plugin_config_id = handle.config.id,
                                error = %e,
                                "plugin runtime error, passing event through unchanged"
                            );
                            if let Err(record_err) = self
                                .repo
                                .record_error(team_id, PluginConfigId(handle.config.id), &e.to_string())
                                .await
                            {
                                tracing::error!(error = %record_err, "failed to record plugin runtime error");
                            }
                        }
                    }
                }
            }
        }

        Ok(slots
            .into_iter()
            .map(|slot| match slot {
                Some(event) => PipelineOutcome::Passed(event),
                None => PipelineOutcome::Dropped,
            })
            .collect())
    }

    /// `runPluginTask`: invokes a named scheduled-task export on one
    /// plugin config's VM. A null-resolved VM is a no-op.
    pub async fn run_plugin_task(
        &self,
        team_id: TeamId,
        plugin_config_id: PluginConfigId,
        task_name: &str,
    ) -> Result<()> {
        let handles = self
            .pipelines
            .get(&team_id.0)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let Some(handle) = handles.iter().find(|h| h.config.id == plugin_config_id.0) else {
            return Err(Error::not_found("plugin_config", plugin_config_id.0.to_string()));
        };

        let Some(sandbox) = handle.vm.resolved() else {
            return Ok(());
        };

        sandbox
            .call(plugin_config_id.0, task_name, serde_json::Value::Null)
            .await?;
        Ok(())
    }

    pub fn teardown_plugins(&self, team_id: TeamId) {
        self.pipelines.remove(&team_id.0);
    }

    /// `getPluginSchedule`: every `(team, plugin config, task name)` tuple
    /// currently due to run on a periodic schedule, across all teams the
    /// manager has loaded. Used by the scheduler to build its dispatch set
    /// each tick; a plugin whose VM hasn't resolved yet is skipped.
    pub fn plugin_schedule(&self) -> Vec<(TeamId, PluginConfigId, String)> {
        let mut schedule = Vec::new();
        for entry in self.pipelines.iter() {
            let team_id = TeamId(*entry.key());
            for handle in entry.value() {
                let Some(sandbox) = handle.vm.resolved() else {
                    continue;
                };
                for task_name in &sandbox.capabilities().tasks {
                    schedule.push((team_id, PluginConfigId(handle.config.id), task_name.clone()));
                }
            }
        }
        schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_lookup_on_unknown_team_yields_no_handles() {
        // A team never loaded via setup_plugins has no entry; callers
        // should treat that as "no plugins configured," not an error.
        let pipelines: DashMap<i64, Vec<Arc<PluginHandle>>> = DashMap::new();
        assert!(pipelines.get(&1).is_none());
    }
}
