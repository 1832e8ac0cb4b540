//! Plugin-archive download is a named external collaborator (see
//! `eventworks-plugins`'s non-goals): the actual HTTP fetch against a
//! plugin-archive API and its source-transform compiler pass live outside
//! this codebase. This is the seam where that client would be wired in; for
//! now every fetch fails transiently, which drives a plugin straight into
//! `VmState::TransientFail` and the normal retry/backoff path rather than
//! crashing the process.

use async_trait::async_trait;
use eventworks_core::error::{Error, Result};
use eventworks_database::models::PluginRow;
use eventworks_plugins::manager::ArchiveSource;

pub struct UnavailableArchiveSource;

#[async_trait]
impl ArchiveSource for UnavailableArchiveSource {
    async fn fetch(&self, plugin: &PluginRow) -> Result<Vec<u8>> {
        // `fetch` only sees the plugin row, not the config that's compiling it;
        // `plugin_config_id` here is really the plugin's own id.
        Err(Error::PluginInitTransient {
            plugin_config_id: plugin.id,
            message: "plugin-archive download client is not configured".to_string(),
        })
    }
}
