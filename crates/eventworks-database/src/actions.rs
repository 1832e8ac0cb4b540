//! Action/ActionStep repository, used by the event processor's
//! `matchActions` task to find which actions a given event satisfies.

use crate::models::{ActionRow, ActionStepRow, ElementGroupRow};
use crate::pool::DatabasePool;
use eventworks_core::error::{Error, Result};
use eventworks_core::ids::TeamId;
use serde_json::Value;

pub struct ActionRepository {
    pool: DatabasePool,
}

/// An action joined with its steps, the unit `matchActions` evaluates an
/// event against.
#[derive(Debug, Clone)]
pub struct ActionWithSteps {
    pub action: ActionRow,
    pub steps: Vec<ActionStepRow>,
}

impl ActionWithSteps {
    /// An action matches an event if any one of its steps matches — the
    /// same "at least one step, each step ANDs its own predicates"
    /// semantics the data model describes.
    pub fn matches(&self, event: &str, properties: &Value) -> bool {
        self.steps.iter().any(|step| step_matches(step, event, properties))
    }
}

/// A step matches if every predicate it sets is satisfied, and it sets at
/// least one predicate — a step with no predicates at all never matches.
fn step_matches(step: &ActionStepRow, event: &str, properties: &Value) -> bool {
    let mut constrained = false;

    if let Some(expected) = &step.event {
        constrained = true;
        if expected != event {
            return false;
        }
    }

    if let Some(expected_url) = &step.url {
        constrained = true;
        let actual_url = properties
            .get("$current_url")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !url_matches(actual_url, expected_url, step.url_matching.as_deref()) {
            return false;
        }
    }

    if let Some(selector) = &step.selector {
        constrained = true;
        // No parsed DOM tree is available here, only the serialized
        // `$elements` property; a substring check is the best this layer
        // can do without a CSS-selector engine.
        let elements = properties
            .get("$elements")
            .map(|v| v.to_string())
            .unwrap_or_default();
        if !elements.contains(selector.as_str()) {
            return false;
        }
    }

    if let Some(Value::Array(filters)) = &step.properties {
        for filter in filters {
            constrained = true;
            if !property_filter_matches(filter, properties) {
                return false;
            }
        }
    }

    constrained
}

fn url_matches(actual_url: &str, expected: &str, mode: Option<&str>) -> bool {
    match mode.unwrap_or("contains") {
        "exact" => actual_url == expected,
        "regex" => regex::Regex::new(expected)
            .map(|re| re.is_match(actual_url))
            .unwrap_or(false),
        _ => actual_url.contains(expected),
    }
}

/// A single property filter: `{ "key": ..., "value": ..., "operator": ... }`.
/// `operator` defaults to `"exact"`; recognized values are `"exact"`,
/// `"icontains"`, `"regex"`, and `"is_set"`.
fn property_filter_matches(filter: &Value, properties: &Value) -> bool {
    let Some(key) = filter.get("key").and_then(Value::as_str) else {
        return false;
    };
    let operator = filter.get("operator").and_then(Value::as_str).unwrap_or("exact");
    let actual = properties.get(key);

    if operator == "is_set" {
        return actual.is_some();
    }

    let Some(actual) = actual else {
        return false;
    };
    let Some(expected) = filter.get("value") else {
        return false;
    };

    match operator {
        "icontains" => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.to_lowercase().contains(&e.to_lowercase()),
            _ => false,
        },
        "regex" => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => regex::Regex::new(e).map(|re| re.is_match(a)).unwrap_or(false),
            _ => false,
        },
        _ => actual == expected,
    }
}

impl ActionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn load_all(&self, team_id: TeamId) -> Result<Vec<ActionWithSteps>> {
        let actions = sqlx::query_as::<_, ActionRow>(
            "SELECT id, team_id, name, deleted, post_to_slack FROM actions \
             WHERE team_id = $1 AND deleted = false",
        )
        .bind(team_id.0)
        .fetch_all(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to load actions", e))?;

        let mut result = Vec::with_capacity(actions.len());
        for action in actions {
            let steps = sqlx::query_as::<_, ActionStepRow>(
                "SELECT id, action_id, event, url, url_matching, selector, properties \
                 FROM action_steps WHERE action_id = $1",
            )
            .bind(action.id)
            .fetch_all(self.pool.raw())
            .await
            .map_err(|e| Error::database_with_source("failed to load action steps", e))?;

            result.push(ActionWithSteps { action, steps });
        }

        Ok(result)
    }

    /// Every non-deleted action for `team_id` whose steps match `event`,
    /// i.e. the ids the `matchActions` task labels the event with.
    pub async fn match_actions(
        &self,
        team_id: TeamId,
        event: &str,
        properties: &Value,
    ) -> Result<Vec<i64>> {
        let actions = self.load_all(team_id).await?;
        Ok(actions
            .iter()
            .filter(|a| a.matches(event, properties))
            .map(|a| a.action.id)
            .collect())
    }

    pub async fn drop_action(&self, action_id: i64) -> Result<()> {
        sqlx::query("UPDATE actions SET deleted = true WHERE id = $1")
            .bind(action_id)
            .execute(self.pool.raw())
            .await
            .map_err(|e| Error::database_with_source("failed to drop action", e))?;
        Ok(())
    }

    /// Finds or creates the `element_group` row for `hash`, enforcing the
    /// per-team uniqueness of `hash` described by the data model.
    pub async fn find_or_create_element_group(
        &self,
        team_id: TeamId,
        hash: &str,
    ) -> Result<ElementGroupRow> {
        if let Some(existing) = sqlx::query_as::<_, ElementGroupRow>(
            "SELECT id, team_id, hash FROM element_groups WHERE team_id = $1 AND hash = $2",
        )
        .bind(team_id.0)
        .bind(hash)
        .fetch_optional(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to look up element group", e))?
        {
            return Ok(existing);
        }

        sqlx::query_as::<_, ElementGroupRow>(
            "INSERT INTO element_groups (team_id, hash) VALUES ($1, $2) \
             ON CONFLICT (team_id, hash) DO UPDATE SET hash = EXCLUDED.hash \
             RETURNING id, team_id, hash",
        )
        .bind(team_id.0)
        .bind(hash)
        .fetch_one(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to create element group", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(event: Option<&str>, url: Option<&str>, url_matching: Option<&str>, properties: Option<Value>) -> ActionStepRow {
        ActionStepRow {
            id: 1,
            action_id: 1,
            event: event.map(str::to_string),
            url: url.map(str::to_string),
            url_matching: url_matching.map(str::to_string),
            selector: None,
            properties,
        }
    }

    fn action(steps: Vec<ActionStepRow>) -> ActionWithSteps {
        ActionWithSteps {
            action: ActionRow {
                id: 1,
                team_id: 1,
                name: "test".to_string(),
                deleted: false,
                post_to_slack: false,
            },
            steps,
        }
    }

    #[test]
    fn step_with_no_predicates_never_matches() {
        let a = action(vec![step(None, None, None, None)]);
        assert!(!a.matches("pageview", &json!({})));
    }

    #[test]
    fn event_name_predicate_requires_exact_match() {
        let a = action(vec![step(Some("signup"), None, None, None)]);
        assert!(a.matches("signup", &json!({})));
        assert!(!a.matches("pageview", &json!({})));
    }

    #[test]
    fn url_predicate_defaults_to_contains() {
        let a = action(vec![step(None, Some("/pricing"), None, None)]);
        assert!(a.matches("pageview", &json!({ "$current_url": "https://example.com/pricing" })));
        assert!(!a.matches("pageview", &json!({ "$current_url": "https://example.com/home" })));
    }

    #[test]
    fn url_predicate_exact_mode_rejects_superstrings() {
        let a = action(vec![step(None, Some("https://example.com/pricing"), Some("exact"), None)]);
        assert!(!a.matches("pageview", &json!({ "$current_url": "https://example.com/pricing/plans" })));
        assert!(a.matches("pageview", &json!({ "$current_url": "https://example.com/pricing" })));
    }

    #[test]
    fn property_filter_requires_exact_value_by_default() {
        let filters = json!([{ "key": "plan", "value": "enterprise" }]);
        let a = action(vec![step(None, None, None, Some(filters))]);
        assert!(a.matches("upgrade", &json!({ "plan": "enterprise" })));
        assert!(!a.matches("upgrade", &json!({ "plan": "free" })));
    }

    #[test]
    fn is_set_operator_ignores_value() {
        let filters = json!([{ "key": "referrer", "operator": "is_set" }]);
        let a = action(vec![step(None, None, None, Some(filters))]);
        assert!(a.matches("pageview", &json!({ "referrer": "google" })));
        assert!(!a.matches("pageview", &json!({})));
    }

    #[test]
    fn action_matches_if_any_step_matches() {
        let a = action(vec![
            step(Some("signup"), None, None, None),
            step(Some("purchase"), None, None, None),
        ]);
        assert!(a.matches("purchase", &json!({})));
        assert!(!a.matches("logout", &json!({})));
    }
}
