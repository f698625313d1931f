//! Batch preloading for lazy associations.
//!
//! Each `fill_*` function resolves one association for a whole collection
//! in exactly one statement, grouping by distinct primary keys, instead of
//! one fetch per row through the lazy accessors.

use crate::client::GenericClient;
use crate::error::{StoreError, StoreResult};
use crate::field;
use crate::join;
use crate::params::ParamList;
use crate::row::FromRow;
use crate::schema::EntityKind;
use crate::types::{Action, Event, Participant, ParticipantAction, Segment};
use std::collections::{BTreeSet, HashMap};

/// `(qualifier.event_id, ..) IN ((..), ..)` over composite action keys,
/// binding every key component.
fn action_key_predicate(
    qualifier: &str,
    keys: &[(String, i32, i32)],
    params: &mut ParamList,
) -> String {
    let tuples: Vec<String> = keys
        .iter()
        .map(|(event_id, segment_id, action_id)| {
            let e = params.push(event_id.clone());
            let s = params.push(*segment_id);
            let a = params.push(*action_id);
            format!("(${e}, ${s}, ${a})")
        })
        .collect();
    format!(
        "({qualifier}.event_id, {qualifier}.segment_id, {qualifier}.action_id) IN ({})",
        tuples.join(", ")
    )
}

/// Fetch the stat lines for a set of action keys, grouped by key. `order`
/// is a pre-rendered ` ORDER BY ..` fragment (possibly empty) controlling
/// the ordering within the fetched set.
pub(crate) async fn participant_actions_by_action_keys(
    conn: &impl GenericClient,
    keys: &[(String, i32, i32)],
    order: &str,
) -> StoreResult<HashMap<(String, i32, i32), Vec<ParticipantAction>>> {
    let mut out: HashMap<(String, i32, i32), Vec<ParticipantAction>> = HashMap::new();
    if keys.is_empty() {
        return Ok(out);
    }

    let kind = EntityKind::ParticipantAction;
    let mut params = ParamList::new();
    let predicate = action_key_predicate(kind.primary_table(), keys, &mut params);
    let sql = format!(
        "SELECT {} {} WHERE {predicate}{order}",
        field::select_list(kind, None)?,
        join::from_clause(kind, None)?,
    );
    tracing::debug!(sql = %sql, "filling participant actions");

    for row in conn.query(&sql, &params.as_refs()).await? {
        let pa = ParticipantAction::from_row(&row)?;
        let key = match (&pa.event_id, pa.segment_id, pa.action_id) {
            (Some(event_id), Some(segment_id), Some(action_id)) => {
                (event_id.clone(), segment_id, action_id)
            }
            _ => {
                return Err(StoreError::decode(
                    "participant_action_event_id",
                    "stat line row is missing its containment key",
                ));
            }
        };
        out.entry(key).or_default().push(pa);
    }
    Ok(out)
}

/// Fill every action's participant stat lines in one statement.
pub async fn fill_participant_actions(
    conn: &impl GenericClient,
    actions: &mut [Action],
) -> StoreResult<()> {
    if actions.is_empty() {
        return Ok(());
    }
    let keys: Vec<(String, i32, i32)> = actions
        .iter()
        .map(|a| (a.event_id.clone(), a.segment_id, a.action_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let order = " ORDER BY participant_action.event_id ASC, participant_action.segment_id ASC, \
                 participant_action.action_id ASC, participant_action.participant_id ASC";
    let mut by_key = participant_actions_by_action_keys(conn, &keys, order).await?;
    for action in actions {
        let key = (action.event_id.clone(), action.segment_id, action.action_id);
        action.set_participant_actions(by_key.remove(&key).unwrap_or_default());
    }
    Ok(())
}

/// Fill every action's owning segment in one statement.
pub async fn fill_segments_for_actions(
    conn: &impl GenericClient,
    actions: &mut [Action],
) -> StoreResult<()> {
    if actions.is_empty() {
        return Ok(());
    }
    let keys: BTreeSet<(String, i32)> = actions
        .iter()
        .map(|a| (a.event_id.clone(), a.segment_id))
        .collect();

    let kind = EntityKind::Segment;
    let mut params = ParamList::new();
    let tuples: Vec<String> = keys
        .iter()
        .map(|(event_id, segment_id)| {
            let e = params.push(event_id.clone());
            let s = params.push(*segment_id);
            format!("(${e}, ${s})")
        })
        .collect();
    let sql = format!(
        "SELECT {} {} WHERE (segment.event_id, segment.segment_id) IN ({})",
        field::select_list(kind, None)?,
        join::from_clause(kind, None)?,
        tuples.join(", ")
    );
    tracing::debug!(sql = %sql, "filling segments");

    let mut by_key: HashMap<(String, i32), Segment> = HashMap::new();
    for row in conn.query(&sql, &params.as_refs()).await? {
        let segment = Segment::from_row(&row)?;
        by_key.insert((segment.event_id.clone(), segment.segment_id), segment);
    }
    for action in actions {
        if let Some(segment) = by_key.get(&(action.event_id.clone(), action.segment_id)) {
            action.set_segment(segment.clone());
        }
    }
    Ok(())
}

/// Fill every segment's owning event in one statement.
pub async fn fill_events_for_segments(
    conn: &impl GenericClient,
    segments: &mut [Segment],
) -> StoreResult<()> {
    if segments.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = segments
        .iter()
        .map(|s| s.event_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let kind = EntityKind::Event;
    let sql = format!(
        "SELECT {} {} WHERE event.event_id = ANY($1)",
        field::select_list(kind, None)?,
        join::from_clause(kind, None)?,
    );
    tracing::debug!(sql = %sql, "filling events");

    let mut by_id: HashMap<String, Event> = HashMap::new();
    for row in conn.query(&sql, &[&ids]).await? {
        let event = Event::from_row(&row)?;
        by_id.insert(event.event_id.clone(), event);
    }
    for segment in segments {
        if let Some(event) = by_id.get(&segment.event_id) {
            segment.set_event(event.clone());
        }
    }
    Ok(())
}

/// Fill every stat line's participant profile in one statement.
pub async fn fill_participants(
    conn: &impl GenericClient,
    stat_lines: &mut [ParticipantAction],
) -> StoreResult<()> {
    if stat_lines.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = stat_lines
        .iter()
        .map(|pa| pa.participant_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let kind = EntityKind::Participant;
    let sql = format!(
        "SELECT {} {} WHERE participant.participant_id = ANY($1)",
        field::select_list(kind, None)?,
        join::from_clause(kind, None)?,
    );
    tracing::debug!(sql = %sql, "filling participants");

    let mut by_id: HashMap<String, Participant> = HashMap::new();
    for row in conn.query(&sql, &[&ids]).await? {
        let participant = Participant::from_row(&row)?;
        by_id.insert(participant.participant_id.clone(), participant);
    }
    for line in stat_lines {
        if let Some(participant) = by_id.get(&line.participant_id) {
            line.set_participant(participant.clone());
        }
    }
    Ok(())
}
