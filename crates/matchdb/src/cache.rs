//! Explicit caches for near-static reference data.
//!
//! Both caches are plain owned objects passed by dependency injection;
//! nothing here is process-global. Staleness contract: contents are a
//! snapshot as of the last `refresh` call and are never invalidated by
//! underlying data changes. That is acceptable only because the backing
//! data (team metadata, the participant id universe) changes rarely;
//! callers that ingest new rows are expected to update the cache through
//! `insert` or a re-`refresh`.

use crate::client::GenericClient;
use crate::error::StoreResult;
use crate::row::FromRow;
use crate::types::Team;
use std::collections::{HashMap, HashSet};

/// Keyed-by-abbreviation cache of team reference rows.
#[derive(Debug, Default)]
pub struct TeamCache {
    teams: HashMap<String, Team>,
}

impl TeamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with the current `team` table.
    pub async fn refresh(&mut self, conn: &impl GenericClient) -> StoreResult<()> {
        let rows = conn
            .query("SELECT team_id, city, name FROM team ORDER BY team_id", &[])
            .await?;
        self.teams.clear();
        for row in &rows {
            let team = Team::from_row(row)?;
            self.teams.insert(team.team_id.clone(), team);
        }
        Ok(())
    }

    pub fn get(&self, team_id: &str) -> Option<&Team> {
        self.teams.get(team_id)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// The set of participant ids already present in the store, used by the
/// ingestion collaborator to skip redundant profile upserts.
#[derive(Debug, Default)]
pub struct KnownParticipants {
    ids: HashSet<String>,
}

impl KnownParticipants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set with the ids currently in the `participant` table.
    pub async fn refresh(&mut self, conn: &impl GenericClient) -> StoreResult<()> {
        let rows = conn
            .query("SELECT participant_id FROM participant", &[])
            .await?;
        self.ids.clear();
        for row in &rows {
            self.ids.insert(row.try_get(0).map_err(crate::error::StoreError::from_db_error)?);
        }
        Ok(())
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.ids.contains(participant_id)
    }

    /// Record an id the caller just upserted, keeping the snapshot current
    /// without a full refresh.
    pub fn insert(&mut self, participant_id: impl Into<String>) {
        self.ids.insert(participant_id.into());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_participants_tracks_inserts() {
        let mut known = KnownParticipants::new();
        assert!(!known.contains("00-0023459"));
        known.insert("00-0023459");
        assert!(known.contains("00-0023459"));
        assert_eq!(known.len(), 1);
    }
}
