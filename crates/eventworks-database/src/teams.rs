//! Team repository: loads the additive event/property caches and persists
//! them back when the in-memory `Team` observes something new.

use crate::models::TeamRow;
use crate::pool::DatabasePool;
use eventworks_core::error::{Error, Result};
use eventworks_core::ids::TeamId;
use eventworks_core::team::Team;
use std::collections::HashSet;

pub struct TeamRepository {
    pool: DatabasePool,
}

impl TeamRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, team_id: TeamId) -> Result<Option<Team>> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, ingested_event_names, event_properties, \
             event_properties_numerical, created_at, updated_at \
             FROM teams WHERE id = $1",
        )
        .bind(team_id.0)
        .fetch_optional(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to load team", e))?;

        Ok(row.map(|row| Team {
            id: TeamId(row.id),
            name: row.name,
            ingested_event_names: row.ingested_event_names.into_iter().collect::<HashSet<_>>(),
            event_properties: row.event_properties.into_iter().collect::<HashSet<_>>(),
            event_properties_numerical: row
                .event_properties_numerical
                .into_iter()
                .collect::<HashSet<_>>(),
        }))
    }

    pub async fn save_caches(&self, team: &Team) -> Result<()> {
        sqlx::query(
            "UPDATE teams SET ingested_event_names = $1, event_properties = $2, \
             event_properties_numerical = $3, updated_at = NOW() WHERE id = $4",
        )
        .bind(team.ingested_event_names.iter().cloned().collect::<Vec<_>>())
        .bind(team.event_properties.iter().cloned().collect::<Vec<_>>())
        .bind(
            team.event_properties_numerical
                .iter()
                .cloned()
                .collect::<Vec<_>>(),
        )
        .bind(team.id.0)
        .execute(self.pool.raw())
        .await
        .map_err(|e| Error::database_with_source("failed to save team caches", e))?;
        Ok(())
    }
}
