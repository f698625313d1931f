//! Join-graph resolution over the entity containment hierarchy.
//!
//! Primary keys are strictly prefix-extending down the chain (an Action key
//! extends a Segment key, which extends an Event key). The resolver
//! exploits this: the signed overlap between two entities' key sets decides
//! the join direction, and each pending entity is joined to its nearest
//! relation in the already-reachable group, so `event`, `segment` and
//! `action` chain together instead of skipping levels.

use crate::error::{StoreError, StoreResult};
use crate::field::{AliasMap, table_alias};
use crate::schema::EntityKind;
use std::collections::BTreeSet;

/// Signed relation distance between two entities' primary-key field sets.
///
/// `None` when the sets do not intersect (the entities are unrelated and a
/// direct join is an error). Otherwise the count of non-shared key fields,
/// negative when `a`'s key strictly contains `b`'s, positive when `b`'s
/// contains `a`'s, zero when the keys are identical.
pub fn relation_distance(a: EntityKind, b: EntityKind) -> Option<i32> {
    let pa = a.meta().primary_key;
    let pb = b.meta().primary_key;
    let shared = pa.iter().filter(|k| pb.contains(k)).count();
    if shared == 0 {
        return None;
    }
    let outsiders = (pa.len() - shared) + (pb.len() - shared);
    if pa.len() > pb.len() {
        Some(-(outsiders as i32))
    } else {
        Some(outsiders as i32)
    }
}

/// One `LEFT JOIN to_table AS alias ON (from keys) = (to keys)` clause over
/// the shared primary-key columns, in `from`'s key order.
fn join_tables(
    from: EntityKind,
    to: EntityKind,
    from_table: &'static str,
    to_table: &'static str,
    from_aliases: Option<&AliasMap>,
    to_aliases: Option<&AliasMap>,
) -> StoreResult<String> {
    let from_pkey = from.meta().primary_key;
    let to_pkey = to.meta().primary_key;
    // Avoiding set intersection so key order is preserved.
    let common: Vec<&str> = from_pkey
        .iter()
        .filter(|k| to_pkey.contains(k))
        .copied()
        .collect();
    if common.is_empty() {
        return Err(StoreError::UnrelatedJoin { from, to });
    }

    let from_alias = table_alias(from_table, from_aliases);
    let to_alias = table_alias(to_table, to_aliases);
    let fkey: Vec<String> = common.iter().map(|f| format!("{from_alias}.{f}")).collect();
    let tkey: Vec<String> = common.iter().map(|f| format!("{to_alias}.{f}")).collect();
    Ok(format!(
        "LEFT JOIN {to_table} AS {to_alias} ON ({}) = ({})",
        fkey.join(", "),
        tkey.join(", ")
    ))
}

/// Join `to`'s primary table to `from`, then chain `to`'s extra physical
/// tables off its primary table, one LEFT JOIN each.
pub fn join_to_all(
    from: EntityKind,
    to: EntityKind,
    from_aliases: Option<&AliasMap>,
    to_aliases: Option<&AliasMap>,
) -> StoreResult<Vec<String>> {
    let to_primary = to.primary_table();
    let mut joins = vec![join_tables(
        from,
        to,
        from.primary_table(),
        to_primary,
        from_aliases,
        to_aliases,
    )?];
    for table in &to.meta().tables[1..] {
        joins.push(join_tables(to, to, to_primary, table.name, to_aliases, to_aliases)?);
    }
    Ok(joins)
}

/// The `FROM primary AS alias [LEFT JOIN extra ...]` clause for one entity,
/// joining in its extra physical tables so a full logical row is
/// addressable.
pub fn from_clause(kind: EntityKind, aliases: Option<&AliasMap>) -> StoreResult<String> {
    let primary = kind.primary_table();
    let mut sql = format!("FROM {primary} AS {}", table_alias(primary, aliases));
    for table in &kind.meta().tables[1..] {
        sql.push(' ');
        sql.push_str(&join_tables(kind, kind, primary, table.name, aliases, aliases)?);
    }
    Ok(sql)
}

/// Emit as many LEFT JOIN clauses as needed so that every entity in
/// `targets` is addressable from `source`.
///
/// Each round considers every (reachable, pending) pair with a defined
/// distance and joins the nearest more-specific pair and the nearest
/// more-general pair that exist, so each table connects to the least
/// distant relation already in the group. A pending entity with no defined
/// distance to anything reachable is an error; in this hierarchy that is
/// exactly a Participant requested without ParticipantAction.
pub fn joins_for(source: EntityKind, targets: &BTreeSet<EntityKind>) -> StoreResult<Vec<String>> {
    if targets.contains(&source) {
        return Err(StoreError::SelfJoin(source));
    }

    let mut reachable: BTreeSet<EntityKind> = BTreeSet::from([source]);
    let mut pending: BTreeSet<EntityKind> = targets.clone();
    let mut joins = Vec::new();

    while !pending.is_empty() {
        let pairs: Vec<(EntityKind, EntityKind, i32)> = reachable
            .iter()
            .flat_map(|f| pending.iter().map(move |t| (*f, *t)))
            .filter_map(|(f, t)| relation_distance(f, t).map(|d| (f, t, d)))
            .collect();

        let general = pairs
            .iter()
            .filter(|(_, _, d)| *d < 0)
            .max_by_key(|(_, _, d)| *d)
            .copied();
        let specific = pairs
            .iter()
            .filter(|(_, _, d)| *d > 0)
            .min_by_key(|(_, _, d)| *d)
            .copied();

        if general.is_none() && specific.is_none() {
            let to = *pending.iter().next().expect("pending is non-empty");
            return Err(StoreError::UnrelatedJoin { from: source, to });
        }

        for pick in [general, specific].into_iter().flatten() {
            let (f, t, _) = pick;
            // Both directions may have picked the same target this round.
            if !pending.remove(&t) {
                continue;
            }
            joins.extend(join_to_all(f, t, None, None)?);
            reachable.insert(t);
        }
    }
    Ok(joins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityKind::*;

    fn targets(kinds: &[EntityKind]) -> BTreeSet<EntityKind> {
        kinds.iter().copied().collect()
    }

    fn left_join_count(joins: &[String]) -> usize {
        joins.iter().map(|j| j.matches("LEFT JOIN").count()).sum()
    }

    #[test]
    fn distance_sign_follows_key_containment() {
        assert_eq!(relation_distance(Event, Segment), Some(1));
        assert_eq!(relation_distance(Segment, Event), Some(-1));
        assert_eq!(relation_distance(Event, ParticipantAction), Some(3));
        assert_eq!(relation_distance(ParticipantAction, Participant), Some(-3));
        assert_eq!(relation_distance(Event, Event), Some(0));
    }

    #[test]
    fn unrelated_keys_have_no_distance() {
        assert_eq!(relation_distance(Event, Participant), None);
        assert_eq!(relation_distance(Participant, Action), None);
    }

    #[test]
    fn one_join_per_physical_table() {
        // Every related pair joins with exactly as many LEFT JOINs as the
        // target has physical tables.
        for (from, to) in [(Event, Segment), (Segment, Action), (Event, Action)] {
            let joins = joins_for(from, &targets(&[to])).unwrap();
            assert_eq!(left_join_count(&joins), to.meta().tables.len(), "{from}->{to}");
        }
    }

    #[test]
    fn chain_joins_nearest_relation() {
        let joins = joins_for(Event, &targets(&[Segment, Action])).unwrap();
        let flat = joins.join(" ");
        // segment joins off event, action joins off segment.
        assert!(flat.contains("LEFT JOIN segment AS segment ON (event.event_id) = (segment.event_id)"));
        assert!(flat.contains(
            "LEFT JOIN action AS action ON (segment.event_id, segment.segment_id) = (action.event_id, action.segment_id)"
        ));
        // The multi-table entity chains its rollup off its own primary table.
        assert!(flat.contains(
            "LEFT JOIN action_stat AS action_stat ON (action.event_id, action.segment_id, action.action_id) = (action_stat.event_id, action_stat.segment_id, action_stat.action_id)"
        ));
    }

    #[test]
    fn participant_alone_is_unreachable_from_containment() {
        for from in [Event, Segment, Action] {
            let err = joins_for(from, &targets(&[Participant])).unwrap_err();
            assert!(matches!(err, StoreError::UnrelatedJoin { .. }), "{from}");
        }
    }

    #[test]
    fn participant_reachable_through_participant_action() {
        for from in [Event, Segment, Action] {
            let joins = joins_for(from, &targets(&[Participant, ParticipantAction])).unwrap();
            let bridge = joins
                .iter()
                .position(|j| j.contains("JOIN participant_action"))
                .unwrap();
            let leaf = joins
                .iter()
                .position(|j| j.contains("JOIN participant AS"))
                .unwrap();
            assert!(bridge < leaf, "{from}: bridge must come first");
            assert!(joins[leaf].contains(
                "ON (participant_action.participant_id) = (participant.participant_id)"
            ));
        }
    }

    #[test]
    fn self_join_is_rejected() {
        let err = joins_for(Action, &targets(&[Action, Event])).unwrap_err();
        assert!(matches!(err, StoreError::SelfJoin(Action)));
    }

    #[test]
    fn from_clause_includes_extra_tables() {
        assert_eq!(from_clause(Event, None).unwrap(), "FROM event AS event");
        let action_from = from_clause(Action, None).unwrap();
        assert!(action_from.starts_with("FROM action AS action LEFT JOIN action_stat"));
    }

    #[test]
    fn upward_joins_use_the_shared_prefix() {
        let joins = joins_for(ParticipantAction, &targets(&[Event])).unwrap();
        assert_eq!(
            joins,
            vec![
                "LEFT JOIN event AS event ON (participant_action.event_id) = (event.event_id)"
                    .to_string()
            ]
        );
    }
}
