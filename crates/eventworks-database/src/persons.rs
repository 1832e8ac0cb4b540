//! Person identity repository: lookup, creation, and the alias-merge
//! operation used by the event processor's `identify`/`alias` handling.
//!
//! Grounded in the teacher's transactional repository style
//! (`rustpress-core/repository.rs`'s emphasis on a single connection per
//! unit of work) generalized to the identity-merge semantics this system
//! requires, which the teacher has no direct analogue for.

use crate::models::{CohortPeopleRow, PersonDistinctIdRow, PersonRow};
use crate::pool::DatabasePool;
use eventworks_core::error::{Error, Result};
use serde_json::Value;
use uuid::Uuid;

pub struct PersonRepository {
    pool: DatabasePool,
}

/// Outcome of resolving `distinct_id_a` and `distinct_id_b` to a single
/// person, used by the `$identify`/`$create_alias` event handlers.
#[derive(Debug, Clone)]
pub enum AliasOutcome {
    /// Neither distinct id had a person; a new one was created and both ids
    /// were attached to it.
    Created(PersonRow),
    /// Exactly one side already had a person; the other distinct id was
    /// attached to it.
    Attached(PersonRow),
    /// Both sides already had (different) persons; they were merged into
    /// the surviving person, `b`'s properties winning on key conflicts and
    /// the older `created_at` kept.
    Merged(PersonRow),
    /// Both distinct ids already resolved to the same person; no-op.
    NoopSamePerson(PersonRow),
}

impl PersonRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Returns the person behind `(team_id, distinct_id)`, creating one
    /// with empty properties on first sight. Called for every ingested
    /// event, not just `$identify`/`$create_alias`, so a person exists
    /// before the event is published.
    pub async fn ensure_person(&self, team_id: i64, distinct_id: &str) -> Result<PersonRow> {
        if let Some(existing) = self.find_by_distinct_id(team_id, distinct_id).await? {
            return Ok(existing);
        }

        self.create_with_distinct_id(team_id, distinct_id, Value::Object(Default::default()), false)
            .await
    }

    pub async fn find_by_distinct_id(
        &self,
        team_id: i64,
        distinct_id: &str,
    ) -> Result<Option<PersonRow>> {
        sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT p.{columns} FROM persons p \
             JOIN person_distinct_ids pdi ON pdi.person_id = p.id \
             WHERE pdi.team_id = $1 AND pdi.distinct_id = $2",
            columns = PersonRow::COLUMNS,
        ))
        .bind(team_id)
        .bind(distinct_id)
        .fetch_optional(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to look up person by distinct id", e))
    }

    /// Creates a person with the given distinct id attached. Tolerates a
    /// unique-violation race on `(team_id, distinct_id)` by treating it as
    /// benign: another concurrent ingestion already created the row, so we
    /// re-fetch and return it instead of erroring.
    pub async fn create_with_distinct_id(
        &self,
        team_id: i64,
        distinct_id: &str,
        properties: Value,
        is_identified: bool,
    ) -> Result<PersonRow> {
        let mut tx = self
            .pool
            .raw()
            .begin()
            .await
            .map_err(|e| Error::database_with_source("failed to start transaction", e))?;

        let person = sqlx::query_as::<_, PersonRow>(&format!(
            "INSERT INTO persons (team_id, uuid, properties, is_identified, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {columns}",
            columns = PersonRow::COLUMNS,
        ))
        .bind(team_id)
        .bind(Uuid::now_v7())
        .bind(&properties)
        .bind(is_identified)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::database_with_source("failed to insert person", e))?;

        let attach = sqlx::query(
            "INSERT INTO person_distinct_ids (team_id, distinct_id, person_id) \
             VALUES ($1, $2, $3) ON CONFLICT (team_id, distinct_id) DO NOTHING",
        )
        .bind(team_id)
        .bind(distinct_id)
        .bind(person.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::database_with_source("failed to attach distinct id", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::database_with_source("failed to commit person creation", e))?;

        if attach.rows_affected() == 0 {
            // Lost the race: someone else attached this distinct id first.
            return self
                .find_by_distinct_id(team_id, distinct_id)
                .await?
                .ok_or_else(|| Error::internal("distinct id vanished after conflicting insert"));
        }

        Ok(person)
    }

    /// Resolves `$create_alias`/`$identify` for `(distinct_id_a,
    /// distinct_id_b)`. Attempts the merge once; on a unique-constraint
    /// violation from a concurrent alias of the same pair, retries exactly
    /// once by re-reading current state, per the "one retry only" race
    /// policy.
    pub async fn alias(
        &self,
        team_id: i64,
        distinct_id_a: &str,
        distinct_id_b: &str,
    ) -> Result<AliasOutcome> {
        match self.try_alias(team_id, distinct_id_a, distinct_id_b).await {
            Ok(outcome) => Ok(outcome),
            Err(Error::Database { source, .. }) if is_unique_violation(&source) => {
                self.try_alias(team_id, distinct_id_a, distinct_id_b).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_alias(
        &self,
        team_id: i64,
        distinct_id_a: &str,
        distinct_id_b: &str,
    ) -> Result<AliasOutcome> {
        let person_a = self.find_by_distinct_id(team_id, distinct_id_a).await?;
        let person_b = self.find_by_distinct_id(team_id, distinct_id_b).await?;

        match (person_a, person_b) {
            (None, None) => {
                let person = self
                    .create_with_distinct_id(team_id, distinct_id_a, Value::Object(Default::default()), true)
                    .await?;
                self.attach_distinct_id(team_id, distinct_id_b, person.id)
                    .await?;
                Ok(AliasOutcome::Created(person))
            }
            (Some(a), None) => {
                self.attach_distinct_id(team_id, distinct_id_b, a.id)
                    .await?;
                Ok(AliasOutcome::Attached(a))
            }
            (None, Some(b)) => {
                self.attach_distinct_id(team_id, distinct_id_a, b.id)
                    .await?;
                Ok(AliasOutcome::Attached(b))
            }
            (Some(a), Some(b)) if a.id == b.id => Ok(AliasOutcome::NoopSamePerson(a)),
            (Some(a), Some(b)) => {
                let merged = self.merge(team_id, a, b).await?;
                Ok(AliasOutcome::Merged(merged))
            }
        }
    }

    async fn attach_distinct_id(&self, team_id: i64, distinct_id: &str, person_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO person_distinct_ids (team_id, distinct_id, person_id) VALUES ($1, $2, $3)",
        )
        .bind(team_id)
        .bind(distinct_id)
        .bind(person_id)
        .execute(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to attach distinct id", e))?;
        Ok(())
    }

    /// Merges person `a` into person `b`: `b`'s properties win on key
    /// conflicts, the earlier of the two `created_at` values is kept, all
    /// of `a`'s distinct ids and cohort memberships are repointed to `b`,
    /// and `a` is deleted. `a` is the previous/older side of the alias
    /// pair, `b` the current/surviving one — never the reverse.
    async fn merge(&self, team_id: i64, a: PersonRow, b: PersonRow) -> Result<PersonRow> {
        let mut tx = self
            .pool
            .raw()
            .begin()
            .await
            .map_err(|e| Error::database_with_source("failed to start merge transaction", e))?;

        let merged_properties = merge_properties(&a.properties, &b.properties);
        let created_at = a.created_at.min(b.created_at);
        let is_identified = a.is_identified || b.is_identified;

        let survivor = sqlx::query_as::<_, PersonRow>(&format!(
            "UPDATE persons SET properties = $1, created_at = $2, is_identified = $3 \
             WHERE id = $4 RETURNING {columns}",
            columns = PersonRow::COLUMNS,
        ))
        .bind(&merged_properties)
        .bind(created_at)
        .bind(is_identified)
        .bind(b.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::database_with_source("failed to update surviving person", e))?;

        sqlx::query("UPDATE person_distinct_ids SET person_id = $1 WHERE team_id = $2 AND person_id = $3")
            .bind(b.id)
            .bind(team_id)
            .bind(a.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database_with_source("failed to repoint distinct ids", e))?;

        sqlx::query("UPDATE cohort_people SET person_id = $1 WHERE team_id = $2 AND person_id = $3")
            .bind(b.id)
            .bind(team_id)
            .bind(a.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database_with_source("failed to repoint cohort memberships", e))?;

        sqlx::query("DELETE FROM persons WHERE id = $1")
            .bind(a.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database_with_source("failed to delete merged person", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::database_with_source("failed to commit merge", e))?;

        Ok(survivor)
    }

    /// Applies `$set`/`$set_once` to the person behind `distinct_id` and
    /// marks it identified. Merge order is `set_once ∪ existing ∪ set`,
    /// rightmost wins: `set` always overrides, `set_once` only fills keys
    /// absent from the existing record.
    pub async fn apply_identify_properties(
        &self,
        team_id: i64,
        distinct_id: &str,
        set: &Value,
        set_once: &Value,
    ) -> Result<()> {
        let person = self
            .find_by_distinct_id(team_id, distinct_id)
            .await?
            .ok_or_else(|| Error::not_found("person", distinct_id.to_string()))?;

        let with_set_once = merge_properties(set_once, &person.properties);
        let merged = merge_properties(&with_set_once, set);

        sqlx::query("UPDATE persons SET properties = $1, is_identified = true WHERE id = $2")
            .bind(&merged)
            .bind(person.id)
            .execute(self.pool.raw())
            .await
            .map_err(|e| Error::database_with_source("failed to apply identify properties", e))?;
        Ok(())
    }

    /// Every cohort a person currently belongs to, for callers that need
    /// to confirm a merge repointed cohort membership correctly.
    pub async fn list_cohort_memberships(
        &self,
        team_id: i64,
        person_id: i64,
    ) -> Result<Vec<CohortPeopleRow>> {
        sqlx::query_as::<_, CohortPeopleRow>(
            "SELECT cohort_id, team_id, person_id FROM cohort_people \
             WHERE team_id = $1 AND person_id = $2",
        )
        .bind(team_id)
        .bind(person_id)
        .fetch_all(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to list cohort memberships", e))
    }

    pub async fn list_distinct_ids(
        &self,
        team_id: i64,
        person_id: i64,
    ) -> Result<Vec<PersonDistinctIdRow>> {
        sqlx::query_as::<_, PersonDistinctIdRow>(
            "SELECT id, team_id, distinct_id, person_id FROM person_distinct_ids \
             WHERE team_id = $1 AND person_id = $2",
        )
        .bind(team_id)
        .bind(person_id)
        .fetch_all(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to list distinct ids", e))
    }
}

fn is_unique_violation(source: &Option<Box<dyn std::error::Error + Send + Sync>>) -> bool {
    source
        .as_ref()
        .and_then(|e| e.downcast_ref::<sqlx::Error>())
        .and_then(|e| e.as_database_error())
        .map(|db_err| db_err.code().as_deref() == Some("23505"))
        .unwrap_or(false)
}

/// `b`'s keys win on conflict; non-object values are left as `a`'s.
fn merge_properties(a: &Value, b: &Value) -> Value {
    let mut merged = a.clone();
    if let (Value::Object(dest), Value::Object(src)) = (&mut merged, b) {
        for (key, value) in src.clone() {
            dest.insert(key, value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_properties_prefers_b_on_conflict() {
        let a = json!({ "plan": "free", "country": "US" });
        let b = json!({ "plan": "pro", "referrer": "google" });
        let merged = merge_properties(&a, &b);
        assert_eq!(merged["plan"], json!("pro"));
        assert_eq!(merged["country"], json!("US"));
        assert_eq!(merged["referrer"], json!("google"));
    }

    #[test]
    fn identify_property_merge_order_is_set_once_then_existing_then_set() {
        let set_once = json!({ "initial_referrer": "google", "plan": "free" });
        let existing = json!({ "plan": "pro" });
        let set = json!({ "plan": "enterprise", "last_seen": "today" });
        let with_set_once = merge_properties(&set_once, &existing);
        let merged = merge_properties(&with_set_once, &set);
        assert_eq!(merged["initial_referrer"], json!("google"));
        assert_eq!(merged["plan"], json!("enterprise"));
        assert_eq!(merged["last_seen"], json!("today"));
    }

    #[test]
    fn is_unique_violation_detects_pg_23505() {
        let err = sqlx::Error::Protocol("fake".into());
        let boxed: Option<Box<dyn std::error::Error + Send + Sync>> = Some(Box::new(err));
        assert!(!is_unique_violation(&boxed));
        assert!(!is_unique_violation(&None));
    }
}
