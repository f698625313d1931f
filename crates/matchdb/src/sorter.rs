//! Sort and limit planning.
//!
//! A sorter is rendered against more than one entity kind while compiling a
//! single query (the main statement and the dependent-row statement see
//! different entities), so rendering silently drops sort fields that do not
//! belong to the target entity instead of erroring. A limit is only
//! meaningful paired with a deterministic order, so a limit without any
//! applicable sort field renders no LIMIT at all.

use crate::error::StoreResult;
use crate::field::{self, AliasMap};
use crate::schema::EntityKind;

/// Sort direction. Omitted directions default to descending: the common
/// case is "top N by some statistic".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Normalized sort criteria accepted by `Query::sort`.
#[derive(Clone, Debug, Default)]
pub struct SortSpec(pub Vec<(String, SortOrder)>);

impl From<&str> for SortSpec {
    fn from(field: &str) -> Self {
        SortSpec(vec![(field.to_string(), SortOrder::Desc)])
    }
}

impl From<(&str, SortOrder)> for SortSpec {
    fn from((field, order): (&str, SortOrder)) -> Self {
        SortSpec(vec![(field.to_string(), order)])
    }
}

impl From<Vec<(&str, SortOrder)>> for SortSpec {
    fn from(exprs: Vec<(&str, SortOrder)>) -> Self {
        SortSpec(
            exprs
                .into_iter()
                .map(|(f, o)| (f.to_string(), o))
                .collect(),
        )
    }
}

impl From<Vec<&str>> for SortSpec {
    fn from(fields: Vec<&str>) -> Self {
        SortSpec(
            fields
                .into_iter()
                .map(|f| (f.to_string(), SortOrder::Desc))
                .collect(),
        )
    }
}

/// Sort, order and limit criteria for one compiled statement.
#[derive(Clone, Debug)]
pub struct Sorter {
    exprs: Vec<(String, SortOrder)>,
    limit: i64,
    restraining: Vec<EntityKind>,
}

impl Sorter {
    /// `restraining` lists the entity kinds eligible to restrain the
    /// current result shape; it is set per result method by the query
    /// builder.
    pub fn new(exprs: Vec<(String, SortOrder)>, limit: i64, restraining: Vec<EntityKind>) -> Self {
        Self {
            exprs,
            limit,
            restraining,
        }
    }

    fn applicable(&self, kind: EntityKind) -> Vec<&(String, SortOrder)> {
        let meta = kind.meta();
        self.exprs.iter().filter(|(f, _)| meta.has_field(f)).collect()
    }

    /// Render ` ORDER BY .. LIMIT n` for `kind`, or an empty string when no
    /// sort field belongs to it. `tiebreak` appends the entity's primary
    /// key (ascending) after the user expressions, used by materialization
    /// paths that re-query dependent rows by key and must not depend on
    /// backend row-ordering quirks.
    pub fn sql(
        &self,
        kind: EntityKind,
        aliases: Option<&AliasMap>,
        tiebreak: bool,
    ) -> StoreResult<String> {
        let applicable = self.applicable(kind);
        if applicable.is_empty() && !tiebreak {
            return Ok(String::new());
        }

        let mut rendered = Vec::new();
        for (name, order) in &applicable {
            let expr = field::resolve(kind, name, aliases)?;
            rendered.push(format!("{expr} {}", order.as_sql()));
        }
        if tiebreak {
            for key in kind.meta().primary_key {
                let expr = field::resolve(kind, key, aliases)?;
                rendered.push(format!("{expr} ASC"));
            }
        }

        let mut sql = format!(" ORDER BY {}", rendered.join(", "));
        if self.limit > 0 && !applicable.is_empty() {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }
        Ok(sql)
    }

    /// Render ` ORDER BY .. LIMIT n` for aggregate results. Aggregate
    /// statements alias every summed column as
    /// `<primary_table>_<field>`, so ordering references output aliases
    /// rather than re-deriving SUM expressions.
    pub fn aggregate_sql(&self, kind: EntityKind) -> String {
        let applicable = self.applicable(kind);
        if applicable.is_empty() {
            return String::new();
        }
        let prefix = kind.primary_table();
        let rendered: Vec<String> = applicable
            .iter()
            .map(|(name, order)| format!("{prefix}_{name} {}", order.as_sql()))
            .collect();
        let mut sql = format!(" ORDER BY {}", rendered.join(", "));
        if self.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }
        sql
    }

    /// True when a nonzero limit is set, `kind` is eligible to restrain
    /// this result shape, and at least one sort field belongs to `kind`.
    /// The query builder joins such entities so the limit constrains the
    /// statement even when no criteria reference them.
    pub fn is_restraining(&self, kind: EntityKind) -> bool {
        self.limit > 0 && self.restraining.contains(&kind) && !self.applicable(kind).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityKind::*;

    fn sorter(exprs: Vec<(&str, SortOrder)>, limit: i64, restraining: Vec<EntityKind>) -> Sorter {
        Sorter::new(SortSpec::from(exprs).0, limit, restraining)
    }

    #[test]
    fn renders_order_and_limit() {
        let s = sorter(vec![("week", SortOrder::Asc)], 10, vec![Event]);
        assert_eq!(
            s.sql(Event, None, false).unwrap(),
            " ORDER BY event.week ASC LIMIT 10"
        );
    }

    #[test]
    fn default_direction_is_descending() {
        let s = Sorter::new(SortSpec::from("passing_yds").0, 0, vec![]);
        assert_eq!(
            s.sql(ParticipantAction, None, false).unwrap(),
            " ORDER BY participant_action.passing_yds DESC"
        );
    }

    #[test]
    fn foreign_fields_are_dropped_silently() {
        let s = sorter(
            vec![("home_score", SortOrder::Desc), ("down", SortOrder::Asc)],
            0,
            vec![],
        );
        assert_eq!(
            s.sql(Action, None, false).unwrap(),
            " ORDER BY action.down ASC"
        );
        assert_eq!(
            s.sql(Event, None, false).unwrap(),
            " ORDER BY event.home_score DESC"
        );
    }

    #[test]
    fn limit_without_applicable_sort_renders_nothing() {
        let s = sorter(vec![("home_score", SortOrder::Desc)], 5, vec![Action]);
        assert_eq!(s.sql(Action, None, false).unwrap(), "");
    }

    #[test]
    fn derived_sort_fields_resolve() {
        let s = Sorter::new(SortSpec::from("points").0, 3, vec![ParticipantAction]);
        let sql = s.sql(ParticipantAction, None, false).unwrap();
        assert!(sql.starts_with(" ORDER BY CASE WHEN "));
        assert!(sql.ends_with("LIMIT 3"));
    }

    #[test]
    fn tiebreak_appends_primary_key() {
        let s = sorter(vec![("yards_gained", SortOrder::Desc)], 2, vec![Action]);
        assert_eq!(
            s.sql(Action, None, true).unwrap(),
            " ORDER BY action.yards_gained DESC, action.event_id ASC, \
             action.segment_id ASC, action.action_id ASC LIMIT 2"
        );
    }

    #[test]
    fn tiebreak_alone_orders_by_key_without_limit() {
        let s = sorter(vec![], 4, vec![Action]);
        assert_eq!(
            s.sql(Action, None, true).unwrap(),
            " ORDER BY action.event_id ASC, action.segment_id ASC, action.action_id ASC"
        );
    }

    #[test]
    fn aggregate_rendering_uses_output_aliases() {
        let s = Sorter::new(SortSpec::from("passing_yds").0, 10, vec![ParticipantAction]);
        assert_eq!(
            s.aggregate_sql(ParticipantAction),
            " ORDER BY participant_action_passing_yds DESC LIMIT 10"
        );
    }

    #[test]
    fn is_restraining_requires_limit_eligibility_and_field() {
        let s = sorter(vec![("passing_yds", SortOrder::Desc)], 10, vec![Action, ParticipantAction]);
        assert!(s.is_restraining(ParticipantAction));
        // passing_yds also belongs to Action through the rollup.
        assert!(s.is_restraining(Action));
        // Event is not eligible for this result shape.
        assert!(!s.is_restraining(Event));

        let no_limit = sorter(vec![("passing_yds", SortOrder::Desc)], 0, vec![ParticipantAction]);
        assert!(!no_limit.is_restraining(ParticipantAction));

        let foreign = sorter(vec![("week", SortOrder::Desc)], 10, vec![ParticipantAction]);
        assert!(!foreign.is_restraining(ParticipantAction));
    }
}
