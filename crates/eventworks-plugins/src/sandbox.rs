//! WebAssembly sandbox for plugin execution, built on `wasmtime`'s
//! component model with WASI. A compiled component's exported interface is
//! inspected once at instantiation time to infer a plugin's capabilities —
//! no separate manifest declares them.

use eventworks_core::error::{Error, Result};
use std::collections::HashSet;
use std::time::Duration;
use wasmtime::component::{Component, Linker};
use wasmtime::{Config, Engine, Store};
use wasmtime_wasi::{WasiCtx, WasiCtxBuilder, WasiView};

/// The three method-name families the lifecycle manager recognizes, per
/// the event/task/job split in the data model.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub methods: HashSet<String>,
    pub tasks: HashSet<String>,
    pub jobs: HashSet<String>,
}

const KNOWN_METHODS: &[&str] = &["process_event", "process_event_batch"];
const KNOWN_TASKS: &[&str] = &["run_every_minute", "run_every_hour", "run_every_day"];

impl Capabilities {
    fn from_export_names(names: impl Iterator<Item = String>) -> Self {
        let mut caps = Capabilities::default();
        for name in names {
            if KNOWN_METHODS.contains(&name.as_str()) {
                caps.methods.insert(name);
            } else if KNOWN_TASKS.contains(&name.as_str()) {
                caps.tasks.insert(name);
            } else {
                caps.jobs.insert(name);
            }
        }
        caps
    }

    /// A stable, sorted JSON descriptor of this capability set, for
    /// persisting against the plugin row and for comparing against a
    /// previously stored descriptor.
    pub fn to_descriptor(&self) -> serde_json::Value {
        let sorted = |set: &HashSet<String>| {
            let mut v: Vec<&String> = set.iter().collect();
            v.sort();
            v
        };
        serde_json::json!({
            "methods": sorted(&self.methods),
            "tasks": sorted(&self.tasks),
            "jobs": sorted(&self.jobs),
        })
    }
}

struct HostState {
    wasi: WasiCtx,
    table: wasmtime_wasi::ResourceTable,
}

impl WasiView for HostState {
    fn table(&mut self) -> &mut wasmtime_wasi::ResourceTable {
        &mut self.table
    }
    fn ctx(&mut self) -> &mut WasiCtx {
        &mut self.wasi
    }
}

/// A compiled, instantiable plugin sandbox. One per plugin config; rebuilt
/// whenever the config's or plugin's `updated_at` changes.
pub struct PluginSandbox {
    engine: Engine,
    component: Component,
    capabilities: Capabilities,
    max_execution_time: Duration,
}

impl PluginSandbox {
    /// Compiles `wasm_bytes` and infers capabilities from its exports.
    /// Returns `Error::PluginInitPermanent` for anything that doesn't
    /// parse as a valid component — this is not retryable.
    pub fn compile(
        plugin_config_id: i64,
        wasm_bytes: &[u8],
        max_execution_time: Duration,
        epoch_ticks_per_call: u64,
    ) -> Result<Self> {
        let mut config = Config::new();
        config.wasm_component_model(true);
        config.epoch_interruption(true);
        config.async_support(true);
        let engine = Engine::new(&config).map_err(|e| Error::PluginInitPermanent {
            plugin_config_id,
            message: format!("failed to construct wasm engine: {e}"),
        })?;

        let component =
            Component::new(&engine, wasm_bytes).map_err(|e| Error::PluginInitPermanent {
                plugin_config_id,
                message: format!("invalid plugin archive: {e}"),
            })?;

        let export_names = component
            .component_type()
            .exports(&engine)
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();
        let capabilities = Capabilities::from_export_names(export_names.into_iter());

        let _ = epoch_ticks_per_call;
        Ok(Self {
            engine,
            component,
            capabilities,
            max_execution_time,
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Instantiates the component with a bounded WASI context and calls
    /// `function`, aborting via epoch interruption if it runs past
    /// `max_execution_time`.
    pub async fn call(
        &self,
        plugin_config_id: i64,
        function: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let wasi = WasiCtxBuilder::new().build();
        let mut store = Store::new(
            &self.engine,
            HostState {
                wasi,
                table: wasmtime_wasi::ResourceTable::new(),
            },
        );
        store.set_epoch_deadline(1);

        let mut linker = Linker::new(&self.engine);
        wasmtime_wasi::add_to_linker_async(&mut linker).map_err(|e| Error::PluginRuntime {
            plugin_config_id,
            message: format!("failed to link wasi: {e}"),
        })?;

        let instance = linker
            .instantiate_async(&mut store, &self.component)
            .await
            .map_err(|e| Error::PluginRuntime {
                plugin_config_id,
                message: format!("failed to instantiate plugin: {e}"),
            })?;

        let func = instance
            .get_func(&mut store, function)
            .ok_or_else(|| Error::PluginRuntime {
                plugin_config_id,
                message: format!("plugin does not export {function}"),
            })?;

        let engine_weak = self.engine.clone();
        let deadline = self.max_execution_time;
        let interrupter = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            engine_weak.increment_epoch();
        });

        let input_json = serde_json::to_vec(&input).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        let mut results = vec![wasmtime::component::Val::String(String::new())];
        let params = [wasmtime::component::Val::String(
            String::from_utf8_lossy(&input_json).into_owned(),
        )];

        let call_result = func.call_async(&mut store, &params, &mut results).await;
        interrupter.abort();

        call_result.map_err(|e| Error::PluginRuntime {
            plugin_config_id,
            message: format!("plugin call trapped: {e}"),
        })?;

        match results.into_iter().next() {
            Some(wasmtime::component::Val::String(s)) => {
                serde_json::from_str(&s).map_err(|e| Error::Serialization {
                    message: e.to_string(),
                })
            }
            _ => Ok(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_classify_known_method_and_task_names() {
        let caps = Capabilities::from_export_names(
            vec![
                "process_event".to_string(),
                "run_every_hour".to_string(),
                "nightly-report".to_string(),
            ]
            .into_iter(),
        );
        assert!(caps.methods.contains("process_event"));
        assert!(caps.tasks.contains("run_every_hour"));
        assert!(caps.jobs.contains("nightly-report"));
    }
}
