//! Field resolution: logical field name to qualified SQL expression.
//!
//! Stored columns resolve to `<table-or-alias>.<column>` using the owning
//! table from the registry. Derived fields dispatch to a per-entity
//! expansion rule expressed purely in terms of other stored fields, so
//! recursive resolution always terminates (enforced by
//! [`crate::schema::validate_registry`]).

use crate::error::{StoreError, StoreResult};
use crate::schema::EntityKind;
use crate::stats::{DERIVED_SUMS, POINT_VALUES};
use std::collections::HashMap;

/// Maps a physical table name to the alias it is joined under. Absent
/// entries fall back to the bare table name. Used when the same entity is
/// joined into one statement more than once.
pub type AliasMap<'a> = HashMap<&'static str, &'a str>;

/// The alias a table resolves under.
pub fn table_alias<'a>(table: &'static str, aliases: Option<&AliasMap<'a>>) -> &'a str {
    aliases
        .and_then(|map| map.get(table).copied())
        .unwrap_or(table)
}

/// The stored columns a derived field expands into. Empty for stored
/// fields. `validate_registry` checks every component is a stored column
/// of the same entity.
pub fn derived_components(kind: EntityKind, name: &str) -> Vec<&'static str> {
    match (kind, name) {
        (EntityKind::Event, "winner" | "loser") => {
            vec!["home_score", "away_score", "home_team", "away_team"]
        }
        (EntityKind::Event, "event_date") => vec!["event_id"],
        (EntityKind::Action | EntityKind::ParticipantAction, "points") => {
            POINT_VALUES.iter().map(|(stat, _)| *stat).collect()
        }
        (EntityKind::Action | EntityKind::ParticipantAction, _) => DERIVED_SUMS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, components)| components.to_vec())
            .unwrap_or_default(),
        _ => vec![],
    }
}

/// Resolve `name` for `kind` into a SQL expression.
///
/// Columns owned by a rollup table are wrapped in `COALESCE(.., 0)`: the
/// rollup may have no row for a given key, and an absent statistic is
/// defined to be zero, not null.
pub fn resolve(kind: EntityKind, name: &str, aliases: Option<&AliasMap>) -> StoreResult<String> {
    let meta = kind.meta();
    if meta.is_derived(name) {
        return expand_derived(kind, name, aliases);
    }
    let table = meta
        .column_table(name)
        .ok_or_else(|| StoreError::UnknownField {
            kind,
            field: name.to_string(),
        })?;
    let qualified = format!("{}.{}", table_alias(table.name, aliases), name);
    if table.coalesce_zero {
        Ok(format!("COALESCE({qualified}, 0)"))
    } else {
        Ok(qualified)
    }
}

fn expand_derived(kind: EntityKind, name: &str, aliases: Option<&AliasMap>) -> StoreResult<String> {
    match (kind, name) {
        (EntityKind::Event, "winner") => winner_loser(">", aliases),
        (EntityKind::Event, "loser") => winner_loser("<", aliases),
        (EntityKind::Event, "event_date") => {
            let id = resolve(kind, "event_id", aliases)?;
            Ok(format!("SUBSTRING({id} FROM 1 FOR 8)"))
        }
        (EntityKind::Action | EntityKind::ParticipantAction, "points") => {
            let mut whens = Vec::with_capacity(POINT_VALUES.len());
            // POINT_VALUES is ordered by descending value, so the first
            // matching WHEN is the greatest nonzero contribution.
            for (stat, value) in POINT_VALUES {
                let field = resolve(kind, stat, aliases)?;
                whens.push(format!("WHEN {field} > 0 THEN {value}"));
            }
            Ok(format!("CASE {} ELSE 0 END", whens.join(" ")))
        }
        (EntityKind::Action | EntityKind::ParticipantAction, _) => {
            let components = DERIVED_SUMS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, c)| *c)
                .ok_or_else(|| StoreError::UnknownField {
                    kind,
                    field: name.to_string(),
                })?;
            let parts = components
                .iter()
                .map(|c| resolve(kind, c, aliases))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(" + ")))
        }
        _ => Err(StoreError::UnknownField {
            kind,
            field: name.to_string(),
        }),
    }
}

/// The full SELECT list for an entity: every field (stored and derived)
/// resolved and aliased `<primary_table>_<field>`. Aliasing keeps table
/// aliases opaque to materialization, so one `from_row` implementation
/// reads an entity out of any join shape.
pub fn select_list(kind: EntityKind, aliases: Option<&AliasMap>) -> StoreResult<String> {
    let prefix = kind.primary_table();
    let mut parts = Vec::new();
    for name in kind.meta().fields() {
        let expr = resolve(kind, name, aliases)?;
        parts.push(format!("{expr} AS {prefix}_{name}"));
    }
    Ok(parts.join(", "))
}

fn winner_loser(op: &str, aliases: Option<&AliasMap>) -> StoreResult<String> {
    let kind = EntityKind::Event;
    let home_score = resolve(kind, "home_score", aliases)?;
    let away_score = resolve(kind, "away_score", aliases)?;
    let home_team = resolve(kind, "home_team", aliases)?;
    let away_team = resolve(kind, "away_team", aliases)?;
    // Ties resolve to the empty string; a tie is a valid final state.
    Ok(format!(
        "CASE WHEN {home_score} {op} {away_score} THEN {home_team} \
         WHEN {away_score} {op} {home_score} THEN {away_team} ELSE '' END"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_column_is_qualified_by_owning_table() {
        assert_eq!(
            resolve(EntityKind::Event, "week", None).unwrap(),
            "event.week"
        );
        assert_eq!(
            resolve(EntityKind::Action, "down", None).unwrap(),
            "action.down"
        );
    }

    #[test]
    fn rollup_columns_are_coalesced() {
        assert_eq!(
            resolve(EntityKind::Action, "passing_yds", None).unwrap(),
            "COALESCE(action_stat.passing_yds, 0)"
        );
        // The same category on the participant table is a plain column.
        assert_eq!(
            resolve(EntityKind::ParticipantAction, "passing_yds", None).unwrap(),
            "participant_action.passing_yds"
        );
    }

    #[test]
    fn alias_map_overrides_table_name() {
        let mut aliases = AliasMap::new();
        aliases.insert("event", "e2");
        assert_eq!(
            resolve(EntityKind::Event, "week", Some(&aliases)).unwrap(),
            "e2.week"
        );
        // Tables without an entry keep their bare name.
        assert_eq!(
            resolve(EntityKind::Segment, "result", Some(&aliases)).unwrap(),
            "segment.result"
        );
    }

    #[test]
    fn winner_expands_to_score_case() {
        let sql = resolve(EntityKind::Event, "winner", None).unwrap();
        assert_eq!(
            sql,
            "CASE WHEN event.home_score > event.away_score THEN event.home_team \
             WHEN event.away_score > event.home_score THEN event.away_team ELSE '' END"
        );
        let loser = resolve(EntityKind::Event, "loser", None).unwrap();
        assert!(loser.contains("event.home_score < event.away_score"));
    }

    #[test]
    fn event_date_is_a_substring() {
        assert_eq!(
            resolve(EntityKind::Event, "event_date", None).unwrap(),
            "SUBSTRING(event.event_id FROM 1 FOR 8)"
        );
    }

    #[test]
    fn offense_yds_is_a_component_sum() {
        assert_eq!(
            resolve(EntityKind::ParticipantAction, "offense_yds", None).unwrap(),
            "(participant_action.passing_yds + participant_action.rushing_yds + \
             participant_action.receiving_yds + participant_action.fumbles_rec_yds)"
        );
        // On Action the components come from the rollup, coalesced.
        let sql = resolve(EntityKind::Action, "offense_yds", None).unwrap();
        assert!(sql.starts_with("(COALESCE(action_stat.passing_yds, 0)"));
    }

    #[test]
    fn points_case_is_ordered_by_descending_value() {
        let sql = resolve(EntityKind::ParticipantAction, "points", None).unwrap();
        assert!(sql.starts_with("CASE WHEN "));
        assert!(sql.ends_with("ELSE 0 END"));
        let six = sql.find("THEN 6").unwrap();
        let three = sql.find("THEN 3").unwrap();
        let one = sql.find("THEN 1").unwrap();
        assert!(six < three && three < one);
    }

    #[test]
    fn select_list_aliases_every_field() {
        let list = select_list(EntityKind::Event, None).unwrap();
        assert!(list.starts_with("event.event_id AS event_event_id"));
        assert!(list.contains("event.week AS event_week"));
        // Derived fields are selected too, under the same alias scheme.
        assert!(list.contains("ELSE '' END AS event_winner"));
        assert!(list.contains("SUBSTRING(event.event_id FROM 1 FOR 8) AS event_event_date"));
    }

    #[test]
    fn unknown_field_errors() {
        let err = resolve(EntityKind::Segment, "passing_yds", None).unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
        assert!(err.is_usage_error());
    }
}
