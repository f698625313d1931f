//! The fluent query builder and compiler.
//!
//! A [`Query`] accumulates per-entity criteria, aggregate-only criteria,
//! sort expressions and a limit, then compiles one SELECT per requested
//! result shape: the joins come from [`crate::join`], every column and
//! condition renders through [`crate::field`] and [`crate::condition`], and
//! ORDER BY/LIMIT comes from [`crate::sorter`].
//!
//! ```ignore
//! use matchdb::{Query, query_or};
//!
//! let events = Query::new()
//!     .event([("season_year", 2024.into()), ("week__le", 6.into())])
//!     .participant_action([("passing_yds__ge", 300.into())])
//!     .sort("start_time")
//!     .as_events(&client)
//!     .await?;
//! ```
//!
//! Construction errors (unknown fields, list misuse) are recorded on the
//! builder and surfaced by the result methods before any statement reaches
//! the database, so chaining stays ergonomic while failures stay loud.

use crate::client::GenericClient;
use crate::condition::{Clause, Comparison, Term, Value, parse_field_op};
use crate::error::{StoreError, StoreResult};
use crate::field;
use crate::join::{self, relation_distance};
use crate::params::ParamList;
use crate::row::FromRow;
use crate::schema::EntityKind;
use crate::sorter::{SortSpec, Sorter};
use crate::stats::{DERIVED_SUMS, PARTICIPANT_STATS};
use crate::types::{Action, Event, Participant, ParticipantAction, Segment};
use std::collections::BTreeSet;

/// Construct a conjunctive query: criteria accumulate as AND terms.
pub fn query() -> Query {
    Query::new()
}

/// Construct a disjunctive query: criteria accumulate as OR terms.
pub fn query_or() -> Query {
    Query::new_or()
}

/// Usage errors recorded during construction. Kept as plain data so
/// queries stay cloneable; re-shaped into [`StoreError`] when a result
/// method surfaces them.
#[derive(Clone, Debug)]
enum BuildError {
    UnknownField { kind: EntityKind, field: String },
    ListOperator { field: String, op: &'static str },
    Other(String),
}

impl BuildError {
    fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::UnknownField { kind, field } => BuildError::UnknownField { kind, field },
            StoreError::ListOperator { field, op } => BuildError::ListOperator { field, op },
            other => BuildError::Other(other.to_string()),
        }
    }

    fn to_store(&self) -> StoreError {
        match self {
            BuildError::UnknownField { kind, field } => StoreError::UnknownField {
                kind: *kind,
                field: field.clone(),
            },
            BuildError::ListOperator { field, op } => StoreError::ListOperator {
                field: field.clone(),
                op,
            },
            BuildError::Other(message) => StoreError::Other(message.clone()),
        }
    }
}

/// A set of search criteria over the entity hierarchy.
///
/// Queries are cheap to build and are compiled once per result method call.
/// A `Query` is not meant to be shared across tasks; build one per call
/// site.
#[derive(Clone, Debug, Default)]
pub struct Query {
    clause: Clause,
    agg_clause: Clause,
    or_mode: bool,
    sort_exprs: SortSpec,
    limit: i64,
    build_error: Option<BuildError>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`Query::new`], but criteria accumulate disjunctively.
    pub fn new_or() -> Self {
        Self {
            or_mode: true,
            ..Self::default()
        }
    }

    // ==================== criteria ====================

    /// Event criteria. Besides event fields, the pseudo-field `team`
    /// matches events the given team played in, home or away.
    pub fn event<'a>(mut self, criteria: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let mut rest = Vec::new();
        for (raw, value) in criteria {
            if raw == "team" {
                let either = Query::new_or().event([
                    ("home_team", value.clone()),
                    ("away_team", value),
                ]);
                self = self.andalso(either);
            } else {
                rest.push((raw, value));
            }
        }
        self.add_criteria(EntityKind::Event, rest)
    }

    pub fn segment<'a>(self, criteria: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        self.add_criteria(EntityKind::Segment, criteria)
    }

    pub fn action<'a>(self, criteria: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        self.add_criteria(EntityKind::Action, criteria)
    }

    pub fn participant_action<'a>(
        self,
        criteria: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Self {
        self.add_criteria(EntityKind::ParticipantAction, criteria)
    }

    pub fn participant<'a>(self, criteria: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        self.add_criteria(EntityKind::Participant, criteria)
    }

    /// Aggregate-only criteria: applied to per-participant statistic totals
    /// in the HAVING clause. Usable only with [`Query::as_aggregate`];
    /// regular criteria restrict *what to aggregate*, aggregate criteria
    /// restrict *aggregated results*.
    pub fn aggregate<'a>(mut self, criteria: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let kind = EntityKind::ParticipantAction;
        for (raw, value) in criteria {
            let (name, _) = parse_field_op(raw);
            // Only statistic categories and their derived sums can be
            // summed; the rest of the field set has no aggregate meaning.
            if !PARTICIPANT_STATS.contains(&name) && !kind.meta().is_derived(name) {
                self.record_error(StoreError::UnknownField {
                    kind,
                    field: name.to_string(),
                });
                continue;
            }
            match Comparison::new(kind, raw, value) {
                Ok(cmp) => self.agg_clause.push(Term::Cmp(cmp), self.or_mode),
                Err(err) => self.record_error(err),
            }
        }
        self
    }

    /// Splice a fully-formed sub-query in as one AND term.
    pub fn andalso(mut self, sub: Query) -> Self {
        self.absorb(sub, false)
    }

    /// Splice a fully-formed sub-query in as one OR term.
    pub fn orelse(mut self, sub: Query) -> Self {
        self.absorb(sub, true)
    }

    // ==================== sorting ====================

    /// Sort expressions; a bare field name sorts descending. Fields that do
    /// not belong to the entity being fetched are ignored at render time.
    pub fn sort(mut self, spec: impl Into<SortSpec>) -> Self {
        self.sort_exprs = spec.into();
        self
    }

    /// Limit the number of results. `0` (the default) means no limit; a
    /// limit only takes effect alongside an applicable sort expression.
    pub fn limit(mut self, count: i64) -> Self {
        self.limit = count;
        self
    }

    // ==================== result methods ====================

    pub async fn as_events(&self, conn: &impl GenericClient) -> StoreResult<Vec<Event>> {
        self.fetch(conn, EntityKind::Event).await
    }

    pub async fn as_segments(&self, conn: &impl GenericClient) -> StoreResult<Vec<Segment>> {
        self.fetch(conn, EntityKind::Segment).await
    }

    /// Fetch actions with their participant stat lines filled.
    ///
    /// Two statements run: the first fetches the actions with the action
    /// primary key appended to the ordering as a deterministic tie-break,
    /// the second fetches dependent `participant_action` rows scoped by
    /// those exact keys. Pairing by key keeps the "which statistics belong
    /// to which action" association correct regardless of backend
    /// row-ordering quirks; run both inside one transaction for a
    /// consistent snapshot.
    pub async fn as_actions(&self, conn: &impl GenericClient) -> StoreResult<Vec<Action>> {
        let (sql, params) = self.build_select(EntityKind::Action, true)?;
        tracing::debug!(sql = %sql, "compiled action query");
        let rows = conn.query(&sql, &params.as_refs()).await?;
        let mut actions: Vec<Action> = rows
            .iter()
            .map(Action::from_row)
            .collect::<StoreResult<_>>()?;
        if actions.is_empty() {
            return Ok(actions);
        }

        let keys: Vec<(String, i32, i32)> = actions
            .iter()
            .map(|a| (a.event_id.clone(), a.segment_id, a.action_id))
            .collect();
        // The limit already applied to the action statement; the dependent
        // fetch must return every stat line of the selected actions.
        let fill_sorter = Sorter::new(self.sort_exprs.0.clone(), 0, Vec::new());
        let order = fill_sorter.sql(EntityKind::ParticipantAction, None, true)?;
        let mut by_key =
            crate::eager::participant_actions_by_action_keys(conn, &keys, &order).await?;
        for action in &mut actions {
            let key = (action.event_id.clone(), action.segment_id, action.action_id);
            action.set_participant_actions(by_key.remove(&key).unwrap_or_default());
        }
        Ok(actions)
    }

    pub async fn as_participant_actions(
        &self,
        conn: &impl GenericClient,
    ) -> StoreResult<Vec<ParticipantAction>> {
        self.fetch(conn, EntityKind::ParticipantAction).await
    }

    pub async fn as_participants(&self, conn: &impl GenericClient) -> StoreResult<Vec<Participant>> {
        self.fetch(conn, EntityKind::Participant).await
    }

    /// Execute the aggregate variant: participant statistic totals grouped
    /// by participant, with aggregate criteria applied as HAVING over the
    /// summed expressions. Results are stat lines with the containment keys
    /// unset.
    pub async fn as_aggregate(
        &self,
        conn: &impl GenericClient,
    ) -> StoreResult<Vec<ParticipantAction>> {
        let (sql, params) = self.build_aggregate()?;
        tracing::debug!(sql = %sql, "compiled aggregate query");
        let rows = conn.query(&sql, &params.as_refs()).await?;
        rows.iter().map(ParticipantAction::from_row).collect()
    }

    // ==================== compilation ====================

    fn add_criteria<'a>(
        mut self,
        kind: EntityKind,
        criteria: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Self {
        for (raw, value) in criteria {
            match Comparison::new(kind, raw, value) {
                Ok(cmp) => self.clause.push(Term::Cmp(cmp), self.or_mode),
                Err(err) => self.record_error(err),
            }
        }
        self
    }

    fn absorb(mut self, sub: Query, disjunctive: bool) -> Self {
        if self.build_error.is_none() {
            self.build_error = sub.build_error.clone();
        }
        if !sub.clause.is_empty() {
            self.clause.push(Term::Sub(sub.clause), disjunctive);
        }
        if !sub.agg_clause.is_empty() {
            self.agg_clause.push(Term::Sub(sub.agg_clause), disjunctive);
        }
        self
    }

    fn record_error(&mut self, err: StoreError) {
        if self.build_error.is_none() {
            self.build_error = Some(BuildError::from_store(err));
        }
    }

    fn take_build_error(&self) -> Option<StoreError> {
        self.build_error.as_ref().map(BuildError::to_store)
    }

    /// The entity kinds eligible to restrain a sort+limit for each result
    /// shape. Fetching actions lets participant statistics restrain too,
    /// since the fill pattern orders dependent rows by the same criteria.
    fn restraining_for(kind: EntityKind) -> Vec<EntityKind> {
        match kind {
            EntityKind::Action => vec![EntityKind::Action, EntityKind::ParticipantAction],
            other => vec![other],
        }
    }

    fn sorter(&self, kind: EntityKind) -> Sorter {
        Sorter::new(self.sort_exprs.0.clone(), self.limit, Self::restraining_for(kind))
    }

    /// Every entity the compiled statement must address: criteria entities,
    /// the result entity, and entities joined purely because they restrain
    /// an active sort+limit. Participant alongside any containment entity
    /// pulls ParticipantAction in as the bridge.
    fn referenced_entities(&self, kind: EntityKind, sorter: &Sorter) -> BTreeSet<EntityKind> {
        let mut entities = self.clause.entities();
        entities.insert(kind);
        for candidate in Self::restraining_for(kind) {
            if sorter.is_restraining(candidate) {
                entities.insert(candidate);
            }
        }
        bridge_participant(&mut entities);
        entities
    }

    fn check_no_aggregate(&self) -> StoreResult<()> {
        if self.agg_clause.is_empty() {
            Ok(())
        } else {
            Err(StoreError::AggregateOnly)
        }
    }

    fn build_select(&self, kind: EntityKind, tiebreak: bool) -> StoreResult<(String, ParamList)> {
        if let Some(err) = self.take_build_error() {
            return Err(err);
        }
        self.check_no_aggregate()?;

        let sorter = self.sorter(kind);
        let entities = self.referenced_entities(kind, &sorter);
        let targets: BTreeSet<EntityKind> =
            entities.iter().copied().filter(|e| *e != kind).collect();
        let joins = join::joins_for(kind, &targets)?;

        // Joins toward more specific entities multiply rows; DISTINCT keeps
        // the result set one row per entity.
        let distinct = targets
            .iter()
            .any(|t| relation_distance(kind, *t).is_none_or(|d| d > 0));

        let mut params = ParamList::new();
        let mut sql = format!(
            "SELECT {}{} {}",
            if distinct { "DISTINCT " } else { "" },
            field::select_list(kind, None)?,
            join::from_clause(kind, None)?,
        );
        for clause in &joins {
            sql.push(' ');
            sql.push_str(clause);
        }
        if self.clause.constrains(&entities) {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clause.render(&entities, &mut params, None, false)?);
        }
        sql.push_str(&sorter.sql(kind, None, tiebreak)?);
        Ok((sql, params))
    }

    fn build_aggregate(&self) -> StoreResult<(String, ParamList)> {
        if let Some(err) = self.take_build_error() {
            return Err(err);
        }
        let pa = EntityKind::ParticipantAction;
        let sorter = self.sorter(pa);

        let mut entities = self.clause.entities();
        entities.extend(self.agg_clause.entities());
        entities.insert(pa);
        bridge_participant(&mut entities);
        let targets: BTreeSet<EntityKind> = entities.iter().copied().filter(|e| *e != pa).collect();
        let joins = join::joins_for(pa, &targets)?;

        let prefix = pa.primary_table();
        let mut select = vec![format!("{prefix}.participant_id AS {prefix}_participant_id")];
        for stat in PARTICIPANT_STATS {
            select.push(format!("SUM({prefix}.{stat})::INT AS {prefix}_{stat}"));
        }
        for (name, _) in DERIVED_SUMS {
            let expr = field::resolve(pa, name, None)?;
            select.push(format!("SUM({expr})::INT AS {prefix}_{name}"));
        }
        let points = field::resolve(pa, "points", None)?;
        select.push(format!("SUM({points})::INT AS {prefix}_points"));

        let mut params = ParamList::new();
        let mut sql = format!(
            "SELECT {} {}",
            select.join(", "),
            join::from_clause(pa, None)?
        );
        for clause in &joins {
            sql.push(' ');
            sql.push_str(clause);
        }
        if self.clause.constrains(&entities) {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clause.render(&entities, &mut params, None, false)?);
        }
        sql.push_str(&format!(" GROUP BY {prefix}.participant_id"));

        let having_entities: BTreeSet<EntityKind> = [pa].into_iter().collect();
        if self.agg_clause.constrains(&having_entities) {
            sql.push_str(" HAVING ");
            sql.push_str(&self.agg_clause.render(&having_entities, &mut params, None, true)?);
        }
        sql.push_str(&sorter.aggregate_sql(pa));
        Ok((sql, params))
    }

    async fn fetch<T: FromRow>(
        &self,
        conn: &impl GenericClient,
        kind: EntityKind,
    ) -> StoreResult<Vec<T>> {
        let (sql, params) = self.build_select(kind, false)?;
        tracing::debug!(sql = %sql, entity = %kind, "compiled query");
        let rows = conn.query(&sql, &params.as_refs()).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// The SELECT this query would execute for `kind` (for debugging and
    /// tests). Mirrors the first statement of the corresponding result
    /// method, including the key tie-break used when fetching actions.
    pub fn select_sql(&self, kind: EntityKind) -> StoreResult<String> {
        Ok(self.build_select(kind, kind == EntityKind::Action)?.0)
    }

    /// The aggregate SELECT this query would execute (for debugging and
    /// tests).
    pub fn aggregate_sql(&self) -> StoreResult<String> {
        Ok(self.build_aggregate()?.0)
    }
}

/// Participant is only reachable through ParticipantAction; whenever both a
/// containment entity and Participant take part in one statement, the
/// bridge joins in automatically.
fn bridge_participant(entities: &mut BTreeSet<EntityKind>) {
    let has_containment = entities.iter().any(|k| {
        matches!(
            k,
            EntityKind::Event | EntityKind::Segment | EntityKind::Action
        )
    });
    if entities.contains(&EntityKind::Participant) && has_containment {
        entities.insert(EntityKind::ParticipantAction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::FieldRef;
    use crate::sorter::SortOrder;
    use EntityKind::*;

    #[test]
    fn plain_event_query_selects_from_event_only() {
        let sql = query()
            .event([("week", 1.into())])
            .select_sql(Event)
            .unwrap();
        assert!(sql.starts_with("SELECT event.event_id AS event_event_id"));
        assert!(sql.contains("FROM event AS event WHERE (event.week = $1)"));
        assert!(!sql.contains("DISTINCT"));
        assert!(!sql.contains("LEFT JOIN"));
    }

    #[test]
    fn cross_entity_criteria_join_and_deduplicate() {
        let sql = query()
            .participant_action([("passing_yds__ge", 30.into())])
            .select_sql(Event)
            .unwrap();
        assert!(sql.starts_with("SELECT DISTINCT "));
        assert!(sql.contains(
            "LEFT JOIN participant_action AS participant_action \
             ON (event.event_id) = (participant_action.event_id)"
        ));
        assert!(sql.contains("WHERE (participant_action.passing_yds >= $1)"));
    }

    #[test]
    fn participant_criteria_bridge_through_participant_action() {
        let sql = query()
            .participant([("position", "QB".into())])
            .select_sql(Event)
            .unwrap();
        let bridge = sql.find("LEFT JOIN participant_action").unwrap();
        let leaf = sql.find("LEFT JOIN participant AS participant").unwrap();
        assert!(bridge < leaf);
        assert!(sql.contains("WHERE (participant.position = $1)"));
    }

    #[test]
    fn upward_joins_do_not_force_distinct() {
        let sql = query()
            .event([("season_year", 2024.into())])
            .select_sql(Action)
            .unwrap();
        assert!(!sql.contains("DISTINCT"));
        assert!(sql.contains("LEFT JOIN event AS event"));
    }

    #[test]
    fn or_mode_accumulates_disjunctively() {
        let sql = query_or()
            .event([("home_score__ge", 50.into()), ("away_score__ge", 50.into())])
            .select_sql(Event)
            .unwrap();
        assert!(sql.contains("WHERE (event.home_score >= $1 OR event.away_score >= $2)"));
    }

    #[test]
    fn andalso_splices_a_sub_query() {
        let big_score = query_or()
            .event([("home_score__ge", 50.into()), ("away_score__ge", 50.into())]);
        let sql = query()
            .event([("season_year", 2012.into())])
            .andalso(big_score)
            .select_sql(Event)
            .unwrap();
        assert!(sql.contains(
            "WHERE (event.season_year = $1 AND (event.home_score >= $2 OR event.away_score >= $3))"
        ));
    }

    #[test]
    fn team_pseudo_field_expands_to_either_side() {
        let sql = query()
            .event([("team", "NE".into()), ("week", 5.into())])
            .select_sql(Event)
            .unwrap();
        assert!(sql.contains("(event.home_team = $"));
        assert!(sql.contains("OR event.away_team = $"));
        assert!(sql.contains("event.week = $"));
    }

    #[test]
    fn sort_and_limit_render_for_the_result_entity() {
        let sql = query()
            .event([("season_year", 2024.into())])
            .sort(vec![("week", SortOrder::Asc)])
            .limit(5)
            .select_sql(Event)
            .unwrap();
        assert!(sql.ends_with(" ORDER BY event.week ASC LIMIT 5"));
    }

    #[test]
    fn foreign_sort_fields_drop_and_suppress_the_limit() {
        let sql = query()
            .sort("home_score")
            .limit(5)
            .select_sql(Participant)
            .unwrap();
        assert!(!sql.contains("ORDER BY"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn action_fetch_appends_key_tiebreak() {
        let sql = query()
            .sort("yards_gained")
            .limit(3)
            .select_sql(Action)
            .unwrap();
        assert!(sql.ends_with(
            " ORDER BY action.yards_gained DESC, action.event_id ASC, \
             action.segment_id ASC, action.action_id ASC LIMIT 3"
        ));
    }

    #[test]
    fn restraining_sort_joins_the_stat_table() {
        // Sorting actions on a participant statistic with a limit joins
        // participant_action purely for the restriction.
        let sql = query()
            .sort("defense_sk")
            .limit(10)
            .select_sql(Action)
            .unwrap();
        assert!(sql.contains("LEFT JOIN participant_action"));
        assert!(sql.starts_with("SELECT DISTINCT "));
    }

    #[test]
    fn unknown_field_surfaces_before_execution() {
        let err = query()
            .event([("weekz", 1.into())])
            .select_sql(Event)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { kind: Event, .. }));
    }

    #[test]
    fn aggregate_criteria_block_plain_result_methods() {
        let err = query()
            .aggregate([("passing_yds__ge", 4000.into())])
            .select_sql(Event)
            .unwrap_err();
        assert!(matches!(err, StoreError::AggregateOnly));
    }

    #[test]
    fn aggregate_sql_groups_and_filters_totals() {
        let sql = query()
            .event([("season_year", 2012.into())])
            .aggregate([("passing_yds__ge", 4000.into())])
            .aggregate_sql()
            .unwrap();
        assert!(sql.contains(
            "SUM(participant_action.passing_yds)::INT AS participant_action_passing_yds"
        ));
        assert!(sql.contains("FROM participant_action AS participant_action"));
        assert!(sql.contains("LEFT JOIN event AS event"));
        assert!(sql.contains("WHERE (event.season_year = $1)"));
        assert!(sql.contains("GROUP BY participant_action.participant_id"));
        assert!(sql.contains("HAVING (SUM(participant_action.passing_yds) >= $2)"));
    }

    #[test]
    fn aggregate_sums_derived_fields_too() {
        let sql = query().aggregate_sql().unwrap();
        assert!(sql.contains("AS participant_action_offense_yds"));
        assert!(sql.contains("AS participant_action_points"));
        assert!(!sql.contains("HAVING"));
    }

    #[test]
    fn aggregate_sorting_uses_output_aliases() {
        let sql = query()
            .aggregate([("passing_yds__ge", 4000.into())])
            .sort("passing_yds")
            .limit(10)
            .aggregate_sql()
            .unwrap();
        assert!(sql.ends_with(" ORDER BY participant_action_passing_yds DESC LIMIT 10"));
    }

    #[test]
    fn aggregate_rejects_non_statistic_fields() {
        let err = query()
            .aggregate([("team", "NE".into())])
            .aggregate_sql()
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnknownField {
                kind: ParticipantAction,
                ..
            }
        ));
    }

    #[test]
    fn field_ref_supports_cross_column_criteria() {
        let home = FieldRef::new(Event, "home_team").unwrap();
        let sql = query()
            .event([("winner", home.into())])
            .select_sql(Event)
            .unwrap();
        assert!(sql.contains("ELSE '' END = event.home_team"));
    }

    #[test]
    fn derived_criteria_expand_in_where() {
        let sql = query()
            .participant_action([("offense_yds__ge", 100.into())])
            .select_sql(ParticipantAction)
            .unwrap();
        assert!(sql.contains(
            "WHERE ((participant_action.passing_yds + participant_action.rushing_yds + \
             participant_action.receiving_yds + participant_action.fumbles_rec_yds) >= $1)"
        ));
    }

    #[test]
    fn fixture_scenario_compiles_to_the_expected_shape() {
        // One event, two segments, one action each, one stat line with 40
        // yards: `participant_action(passing_yds__ge=30).as_events()` must
        // select events through the stat-line join, so the same statement
        // with a $1 of 50 would drop the event while 30 keeps it.
        let sql = query()
            .participant_action([("passing_yds__ge", 30.into())])
            .select_sql(Event)
            .unwrap();
        assert!(sql.starts_with("SELECT DISTINCT event.event_id AS event_event_id"));
        assert!(sql.contains("WHERE (participant_action.passing_yds >= $1)"));
    }
}
