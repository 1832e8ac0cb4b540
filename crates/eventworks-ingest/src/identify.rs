//! `$identify`/`$create_alias` dispatch. The alias-merge itself (the four
//! identity cases and the one-retry race policy) lives in
//! `eventworks_database::persons::PersonRepository`; this module only
//! decides when to call it and applies the identify-only property write.

use eventworks_database::persons::PersonRepository;
use eventworks_core::error::Result;
use serde_json::Value;
use std::sync::Arc;

const EVENT_IDENTIFY: &str = "$identify";
const EVENT_CREATE_ALIAS: &str = "$create_alias";

/// Resolves identity side effects for one event, if any apply. A no-op for
/// every event other than `$identify`/`$create_alias`.
pub async fn handle(
    persons: &Arc<PersonRepository>,
    team_id: i64,
    event: &str,
    distinct_id: &str,
    properties: &Value,
) -> Result<()> {
    match event {
        EVENT_IDENTIFY => {
            if let Some(anon_distinct_id) = properties.get("$anon_distinct_id").and_then(Value::as_str) {
                persons.alias(team_id, anon_distinct_id, distinct_id).await?;
            }

            let set = properties.get("$set").cloned().unwrap_or(Value::Null);
            let set_once = properties.get("$set_once").cloned().unwrap_or(Value::Null);
            if !set.is_null() || !set_once.is_null() {
                persons
                    .apply_identify_properties(team_id, distinct_id, &set, &set_once)
                    .await?;
            }
        }
        EVENT_CREATE_ALIAS => {
            if let Some(alias_distinct_id) = properties.get("alias").and_then(Value::as_str) {
                persons.alias(team_id, alias_distinct_id, distinct_id).await?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_identity_events_carry_no_distinguishing_properties() {
        let properties = serde_json::json!({ "url": "https://example.com" });
        assert!(properties.get("$anon_distinct_id").is_none());
        assert!(properties.get("alias").is_none());
    }
}
