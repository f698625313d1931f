//! Entity metadata registry.
//!
//! A static description, per entity kind, of how the logical entity maps
//! onto physical tables: the ordered primary-key columns, the tables that
//! together hold one logical row (the first is the `FROM` target, later
//! ones are joined in automatically), which tables ingestion may write, and
//! the derived (computed, never stored) field names.
//!
//! The registry is data; everything that interprets it lives in
//! [`crate::field`] and [`crate::join`]. `validate_registry` is the startup
//! configuration check; nothing here is validated again at query time.

use crate::error::{StoreError, StoreResult};
use crate::stats::{ACTION_STATS, PARTICIPANT_STATS};
use std::collections::HashSet;
use std::sync::OnceLock;

/// The five logical entity kinds of the containment hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Event,
    Segment,
    Action,
    ParticipantAction,
    Participant,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Event,
        EntityKind::Segment,
        EntityKind::Action,
        EntityKind::ParticipantAction,
        EntityKind::Participant,
    ];

    /// The containment chain, most general first. Participant sits outside
    /// the chain and is only reachable through ParticipantAction.
    pub const CONTAINMENT: [EntityKind; 4] = [
        EntityKind::Event,
        EntityKind::Segment,
        EntityKind::Action,
        EntityKind::ParticipantAction,
    ];

    pub fn meta(self) -> &'static EntityMeta {
        &registry()[self as usize]
    }

    /// The entity's primary physical table, used as the FROM target and as
    /// the column-alias prefix in result rows.
    pub fn primary_table(self) -> &'static str {
        self.meta().tables[0].name
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.primary_table())
    }
}

/// One physical table backing (part of) an entity.
#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    /// Columns owned by this table, excluding the shared primary key.
    pub fields: Vec<&'static str>,
    /// Whether the ingestion save path may write this table. Non-writable
    /// tables are views or rollups maintained by the database itself.
    pub writable: bool,
    /// Rollup tables may have no row for a given primary key; their columns
    /// resolve through `COALESCE(col, 0)` so the statistic default-zero
    /// invariant holds inside SQL as well.
    pub coalesce_zero: bool,
}

/// The full physical mapping for one entity kind.
#[derive(Debug)]
pub struct EntityMeta {
    pub kind: EntityKind,
    /// Ordered primary-key columns, shared by every table of the entity.
    pub primary_key: &'static [&'static str],
    /// Backing tables; the first is the primary table.
    pub tables: Vec<TableDef>,
    /// Derived field names, expanded by the field resolver.
    pub derived: Vec<&'static str>,
}

impl EntityMeta {
    /// All stored column names: primary key first, then each table's
    /// columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.primary_key
            .iter()
            .copied()
            .chain(self.tables.iter().flat_map(|t| t.fields.iter().copied()))
    }

    /// All field names, stored and derived.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns().chain(self.derived.iter().copied())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields().any(|f| f == name)
    }

    pub fn is_derived(&self, name: &str) -> bool {
        self.derived.iter().any(|f| *f == name)
    }

    /// The table owning a stored column. Primary-key columns belong to the
    /// primary table.
    pub fn column_table(&self, name: &str) -> Option<&TableDef> {
        if self.primary_key.contains(&name) {
            return self.tables.first();
        }
        self.tables.iter().find(|t| t.fields.contains(&name))
    }

    pub fn writable_tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.iter().filter(|t| t.writable)
    }
}

static REGISTRY: OnceLock<[EntityMeta; 5]> = OnceLock::new();

/// The process-wide entity registry. Built once; call
/// [`validate_registry`] at startup before compiling queries.
pub fn registry() -> &'static [EntityMeta; 5] {
    REGISTRY.get_or_init(build_registry)
}

fn build_registry() -> [EntityMeta; 5] {
    let event = EntityMeta {
        kind: EntityKind::Event,
        primary_key: &["event_id"],
        tables: vec![TableDef {
            name: "event",
            fields: vec![
                "season_year",
                "season_phase",
                "week",
                "start_time",
                "day_of_week",
                "finished",
                "home_team",
                "home_score",
                "home_turnovers",
                "away_team",
                "away_score",
                "away_turnovers",
                "time_inserted",
                "time_updated",
            ],
            writable: true,
            coalesce_zero: false,
        }],
        derived: vec!["winner", "loser", "event_date"],
    };

    let segment = EntityMeta {
        kind: EntityKind::Segment,
        primary_key: &["event_id", "segment_id"],
        tables: vec![TableDef {
            name: "segment",
            fields: vec![
                "possession_team",
                "start_clock",
                "end_clock",
                "start_field",
                "end_field",
                "action_count",
                "yards_penalized",
                "result",
                "time_inserted",
                "time_updated",
            ],
            writable: true,
            coalesce_zero: false,
        }],
        derived: vec![],
    };

    let mut action_fields: Vec<&'static str> = vec![
        "period",
        "clock",
        "down",
        "yards_to_go",
        "yardline",
        "description",
    ];
    action_fields.extend_from_slice(ACTION_STATS);
    action_fields.push("time_inserted");
    action_fields.push("time_updated");

    let action = EntityMeta {
        kind: EntityKind::Action,
        primary_key: &["event_id", "segment_id", "action_id"],
        tables: vec![
            TableDef {
                name: "action",
                fields: action_fields,
                writable: true,
                coalesce_zero: false,
            },
            // Per-action rollup of participant statistics, maintained by the
            // database as a view over participant_action.
            TableDef {
                name: "action_stat",
                fields: PARTICIPANT_STATS.to_vec(),
                writable: false,
                coalesce_zero: true,
            },
        ],
        derived: vec!["offense_yds", "offense_tds", "defense_tds", "points"],
    };

    let mut pa_fields: Vec<&'static str> = vec!["team"];
    pa_fields.extend_from_slice(PARTICIPANT_STATS);
    pa_fields.push("time_inserted");
    pa_fields.push("time_updated");

    let participant_action = EntityMeta {
        kind: EntityKind::ParticipantAction,
        primary_key: &["event_id", "segment_id", "action_id", "participant_id"],
        tables: vec![TableDef {
            name: "participant_action",
            fields: pa_fields,
            writable: true,
            coalesce_zero: false,
        }],
        derived: vec!["offense_yds", "offense_tds", "defense_tds", "points"],
    };

    let participant = EntityMeta {
        kind: EntityKind::Participant,
        primary_key: &["participant_id"],
        tables: vec![TableDef {
            name: "participant",
            fields: vec![
                "full_name",
                "first_name",
                "last_name",
                "team",
                "position",
                "uniform_number",
                "status",
                "height",
                "weight",
                "college",
                "years_pro",
            ],
            writable: true,
            coalesce_zero: false,
        }],
        derived: vec![],
    };

    [event, segment, action, participant_action, participant]
}

/// Startup configuration check.
///
/// Verifies, for every entity: field lists across its tables are disjoint
/// (outside the shared primary key), derived names collide with nothing
/// stored, and every derived field expands only into stored columns of the
/// same entity (which guarantees resolution terminates).
pub fn validate_registry() -> StoreResult<()> {
    for meta in registry() {
        check_meta(meta)?;
    }
    Ok(())
}

fn check_meta(meta: &EntityMeta) -> StoreResult<()> {
    let mut seen: HashSet<&str> = meta.primary_key.iter().copied().collect();
    if seen.len() != meta.primary_key.len() {
        return Err(StoreError::config(format!(
            "{}: duplicate primary key column",
            meta.kind
        )));
    }
    for table in &meta.tables {
        for field in &table.fields {
            if !seen.insert(field) {
                return Err(StoreError::config(format!(
                    "{}: field '{}' appears in more than one table",
                    meta.kind, field
                )));
            }
        }
    }
    for derived in &meta.derived {
        if seen.contains(derived) {
            return Err(StoreError::config(format!(
                "{}: derived field '{}' collides with a stored column",
                meta.kind, derived
            )));
        }
        for component in crate::field::derived_components(meta.kind, derived) {
            if !seen.contains(component) {
                return Err(StoreError::config(format!(
                    "{}: derived field '{}' references '{}', which is not a stored column",
                    meta.kind, derived, component
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_valid() {
        validate_registry().unwrap();
    }

    #[test]
    fn primary_keys_extend_down_the_chain() {
        let chain = EntityKind::CONTAINMENT;
        for pair in chain.windows(2) {
            let upper = pair[0].meta().primary_key;
            let lower = pair[1].meta().primary_key;
            assert_eq!(&lower[..upper.len()], upper);
            assert_eq!(lower.len(), upper.len() + 1);
        }
    }

    #[test]
    fn pk_columns_resolve_to_primary_table() {
        let meta = EntityKind::Action.meta();
        assert_eq!(meta.column_table("event_id").unwrap().name, "action");
        assert_eq!(meta.column_table("passing_yds").unwrap().name, "action_stat");
        assert_eq!(meta.column_table("down").unwrap().name, "action");
        assert!(meta.column_table("winner").is_none());
    }

    #[test]
    fn derived_fields_are_fields_but_not_columns() {
        let meta = EntityKind::Event.meta();
        assert!(meta.has_field("winner"));
        assert!(meta.is_derived("winner"));
        assert!(!meta.columns().any(|c| c == "winner"));
    }

    #[test]
    fn field_collision_is_a_config_error() {
        let bad = EntityMeta {
            kind: EntityKind::Event,
            primary_key: &["event_id"],
            tables: vec![
                TableDef {
                    name: "a",
                    fields: vec!["week"],
                    writable: true,
                    coalesce_zero: false,
                },
                TableDef {
                    name: "b",
                    fields: vec!["week"],
                    writable: false,
                    coalesce_zero: false,
                },
            ],
            derived: vec![],
        };
        assert!(matches!(check_meta(&bad), Err(StoreError::Config(_))));
    }

    #[test]
    fn derived_collision_is_a_config_error() {
        let bad = EntityMeta {
            kind: EntityKind::Event,
            primary_key: &["event_id"],
            tables: vec![TableDef {
                name: "a",
                fields: vec!["winner"],
                writable: true,
                coalesce_zero: false,
            }],
            derived: vec!["winner"],
        };
        assert!(matches!(check_meta(&bad), Err(StoreError::Config(_))));
    }

    #[test]
    fn only_rollup_table_is_non_writable() {
        for meta in registry() {
            for table in &meta.tables {
                assert_eq!(table.writable, table.name != "action_stat");
            }
        }
    }
}
