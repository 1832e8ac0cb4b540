//! Namespaced cache keys, following the teacher's `CacheKey` builder.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Option<String>,
    key: String,
}

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            namespace: None,
            key: key.into(),
        }
    }

    pub fn with_namespace(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            key: key.into(),
        }
    }

    /// Team-scoped cache key, e.g. for the team event/property caches.
    pub fn team(team_id: impl fmt::Display, key: impl Into<String>) -> Self {
        Self::with_namespace(format!("team:{}", team_id), key)
    }

    /// Plugin-config-scoped cache key, for LazyVM readiness/backoff state.
    pub fn plugin_config(plugin_config_id: impl fmt::Display, key: impl Into<String>) -> Self {
        Self::with_namespace(format!("plugin_config:{}", plugin_config_id), key)
    }

    pub fn as_str(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, self.key),
            None => self.key.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_key_is_namespaced() {
        let key = CacheKey::team(42, "ingested_event_names");
        assert_eq!(key.as_str(), "team:42:ingested_event_names");
    }
}
