//! The condition tree: atomic comparisons plus AND/OR composition.
//!
//! A [`Comparison`] is one `(entity, field, operator, value)` criterion; the
//! operator is inferred from a `__eq`/`__ne`/`__lt`/`__le`/`__gt`/`__ge`
//! suffix on the field name. A [`Clause`] holds conjunct and disjunct terms
//! (comparisons or nested clauses) and renders to a parameterized boolean
//! expression restricted to a set of participating entities.
//!
//! All user values are bound as `$n` parameters. The only way to compare a
//! field against raw SQL is [`Value::Field`], which carries a [`FieldRef`]
//! validated against the registry at construction and rendered through the
//! field resolver, so it never holds a caller-supplied string.

use crate::error::{StoreError, StoreResult};
use crate::field::{self, AliasMap};
use crate::params::{Param, ParamList};
use crate::schema::EntityKind;
use crate::types::{Clock, FieldPos};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Comparison operators inferred from field-name suffixes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }
}

/// Split a raw criteria key into its field name and inferred operator.
/// No suffix means `=`.
pub fn parse_field_op(raw: &str) -> (&str, Op) {
    static SUFFIXES: [(&str, Op); 6] = [
        ("__eq", Op::Eq),
        ("__ne", Op::Ne),
        ("__lt", Op::Lt),
        ("__le", Op::Le),
        ("__gt", Op::Gt),
        ("__ge", Op::Ge),
    ];
    for (suffix, op) in SUFFIXES {
        if let Some(field) = raw.strip_suffix(suffix) {
            return (field, op);
        }
    }
    (raw, Op::Eq)
}

/// A registry-validated reference to another entity's field, usable as the
/// right-hand side of a comparison. This is the narrowly-scoped escape
/// hatch for cross-column criteria like "winner equals the home team".
#[derive(Clone, Debug)]
pub struct FieldRef {
    kind: EntityKind,
    field: String,
}

impl FieldRef {
    /// Build a reference, failing on unknown fields so arbitrary SQL can
    /// never ride in through this path.
    pub fn new(kind: EntityKind, field: &str) -> StoreResult<Self> {
        if !kind.meta().has_field(field) {
            return Err(StoreError::UnknownField {
                kind,
                field: field.to_string(),
            });
        }
        Ok(Self {
            kind,
            field: field.to_string(),
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn resolve(&self, aliases: Option<&AliasMap>) -> StoreResult<String> {
        field::resolve(self.kind, &self.field, aliases)
    }
}

/// A criteria value. Scalars bind as one parameter; lists force an
/// `IN (..)` rendering; [`Value::Field`] renders as a resolved column
/// expression instead of a parameter.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Clock(Clock),
    FieldPos(FieldPos),
    IntList(Vec<i64>),
    TextList(Vec<String>),
    Field(FieldRef),
}

impl Value {
    pub fn is_list(&self) -> bool {
        matches!(self, Value::IntList(_) | Value::TextList(_))
    }

    /// Serialize a scalar value into a bind parameter. Composite scalar
    /// types go through their explicit serializers here; this is the single
    /// place values become SQL parameters.
    fn param(&self) -> Param {
        match self {
            Value::Bool(v) => Param::new(*v),
            Value::Int(v) => Param::new(*v),
            Value::Float(v) => Param::new(*v),
            Value::Text(v) => Param::new(v.clone()),
            Value::Timestamp(v) => Param::new(*v),
            Value::Clock(v) => Param::new(v.game_seconds()),
            Value::FieldPos(v) => Param::new(v.offset()),
            Value::IntList(_) | Value::TextList(_) | Value::Field(_) => {
                unreachable!("lists and field refs are rendered, not bound as one parameter")
            }
        }
    }

    fn list_params(&self) -> Option<Vec<Param>> {
        match self {
            Value::IntList(vs) => Some(vs.iter().map(|v| Param::new(*v)).collect()),
            Value::TextList(vs) => Some(vs.iter().map(|v| Param::new(v.clone())).collect()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}
impl From<Clock> for Value {
    fn from(v: Clock) -> Self {
        Value::Clock(v)
    }
}
impl From<FieldPos> for Value {
    fn from(v: FieldPos) -> Self {
        Value::FieldPos(v)
    }
}
impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::IntList(v)
    }
}
impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::IntList(v.into_iter().map(i64::from).collect())
    }
}
impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::TextList(v.into_iter().map(str::to_string).collect())
    }
}
impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextList(v)
    }
}
impl From<FieldRef> for Value {
    fn from(v: FieldRef) -> Self {
        Value::Field(v)
    }
}

/// A single comparison scoped to one entity kind.
#[derive(Clone, Debug)]
pub struct Comparison {
    kind: EntityKind,
    field: String,
    op: Op,
    value: Value,
}

impl Comparison {
    /// Build a comparison from a raw criteria key (field plus optional
    /// operator suffix) and a value. Unknown fields and list values with a
    /// non-`=` operator fail here, at construction.
    pub fn new(kind: EntityKind, raw: &str, value: Value) -> StoreResult<Self> {
        let (name, op) = parse_field_op(raw);
        if !kind.meta().has_field(name) {
            return Err(StoreError::UnknownField {
                kind,
                field: name.to_string(),
            });
        }
        if value.is_list() && op != Op::Eq {
            return Err(StoreError::ListOperator {
                field: name.to_string(),
                op: op.as_sql(),
            });
        }
        Ok(Self {
            kind,
            field: name.to_string(),
            op,
            value,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn render(
        &self,
        entities: &BTreeSet<EntityKind>,
        params: &mut ParamList,
        aliases: Option<&AliasMap>,
        aggregate: bool,
    ) -> StoreResult<Option<String>> {
        if !entities.contains(&self.kind) {
            return Ok(None);
        }
        let mut lhs = field::resolve(self.kind, &self.field, aliases)?;
        if aggregate {
            lhs = format!("SUM({lhs})");
        }
        if let Some(values) = self.value.list_params() {
            let placeholders: Vec<String> = values
                .into_iter()
                .map(|p| format!("${}", params.push_param(p)))
                .collect();
            return Ok(Some(format!("{lhs} IN ({})", placeholders.join(", "))));
        }
        if let Value::Field(fr) = &self.value {
            let rhs = fr.resolve(aliases)?;
            return Ok(Some(format!("{lhs} {} {rhs}", self.op.as_sql())));
        }
        let idx = params.push_param(self.value.param());
        Ok(Some(format!("{lhs} {} ${idx}", self.op.as_sql())))
    }
}

/// One term of a clause: an atomic comparison or a nested sub-clause.
#[derive(Clone, Debug)]
pub enum Term {
    Cmp(Comparison),
    Sub(Clause),
}

impl Term {
    fn render(
        &self,
        entities: &BTreeSet<EntityKind>,
        params: &mut ParamList,
        aliases: Option<&AliasMap>,
        aggregate: bool,
    ) -> StoreResult<Option<String>> {
        match self {
            Term::Cmp(cmp) => cmp.render(entities, params, aliases, aggregate),
            Term::Sub(sub) => {
                if !sub.constrains(entities) {
                    return Ok(None);
                }
                Ok(Some(sub.render(entities, params, aliases, aggregate)?))
            }
        }
    }

    fn collect_entities(&self, out: &mut BTreeSet<EntityKind>) {
        match self {
            Term::Cmp(cmp) => {
                out.insert(cmp.kind);
            }
            Term::Sub(sub) => sub.collect_entities(out),
        }
    }

    fn constrains(&self, entities: &BTreeSet<EntityKind>) -> bool {
        match self {
            Term::Cmp(cmp) => entities.contains(&cmp.kind),
            Term::Sub(sub) => sub.constrains(entities),
        }
    }
}

/// Conjuncts and disjuncts over comparisons and nested clauses.
///
/// Renders as `(conj1 AND conj2 ...) OR disj1 OR disj2 ...`: the
/// parenthesized AND-group is omitted when empty and the whole expression
/// collapses to the SQL literal `true` when nothing applies (the identity
/// element for AND, so an unconstrained WHERE stays valid).
#[derive(Clone, Debug, Default)]
pub struct Clause {
    conjuncts: Vec<Term>,
    disjuncts: Vec<Term>,
}

impl Clause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, term: Term, disjunctive: bool) {
        if disjunctive {
            self.disjuncts.push(term);
        } else {
            self.conjuncts.push(term);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty() && self.disjuncts.is_empty()
    }

    /// Every entity kind referenced anywhere in the tree.
    pub fn entities(&self) -> BTreeSet<EntityKind> {
        let mut out = BTreeSet::new();
        self.collect_entities(&mut out);
        out
    }

    fn collect_entities(&self, out: &mut BTreeSet<EntityKind>) {
        for term in self.conjuncts.iter().chain(&self.disjuncts) {
            term.collect_entities(out);
        }
    }

    /// True when at least one comparison in the tree applies to one of the
    /// given entities, i.e. rendering would produce more than `true`.
    pub fn constrains(&self, entities: &BTreeSet<EntityKind>) -> bool {
        self.conjuncts
            .iter()
            .chain(&self.disjuncts)
            .any(|t| t.constrains(entities))
    }

    /// Render the boolean expression restricted to `entities`, pushing all
    /// bound values onto `params`.
    pub fn render(
        &self,
        entities: &BTreeSet<EntityKind>,
        params: &mut ParamList,
        aliases: Option<&AliasMap>,
        aggregate: bool,
    ) -> StoreResult<String> {
        let mut conj = Vec::new();
        for term in &self.conjuncts {
            if let Some(sql) = term.render(entities, params, aliases, aggregate)? {
                conj.push(sql);
            }
        }

        let mut parts = Vec::new();
        if !conj.is_empty() {
            parts.push(format!("({})", conj.join(" AND ")));
        }
        for term in &self.disjuncts {
            if let Some(sql) = term.render(entities, params, aliases, aggregate)? {
                parts.push(sql);
            }
        }

        Ok(match parts.len() {
            0 => "true".to_string(),
            1 => parts.pop().expect("len == 1"),
            _ => format!("({})", parts.join(" OR ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityKind::*;

    fn all_entities() -> BTreeSet<EntityKind> {
        EntityKind::ALL.iter().copied().collect()
    }

    fn cmp(kind: EntityKind, raw: &str, value: Value) -> Term {
        Term::Cmp(Comparison::new(kind, raw, value).unwrap())
    }

    #[test]
    fn suffix_selects_operator() {
        assert_eq!(parse_field_op("passing_yds__ge"), ("passing_yds", Op::Ge));
        assert_eq!(parse_field_op("week__ne"), ("week", Op::Ne));
        assert_eq!(parse_field_op("week"), ("week", Op::Eq));
    }

    #[test]
    fn bare_field_renders_equality() {
        let mut params = ParamList::new();
        let clause = {
            let mut c = Clause::new();
            c.push(cmp(Event, "week", 5.into()), false);
            c
        };
        let sql = clause.render(&all_entities(), &mut params, None, false).unwrap();
        assert_eq!(sql, "(event.week = $1)");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn ge_suffix_renders_ge() {
        let mut params = ParamList::new();
        let mut clause = Clause::new();
        clause.push(cmp(ParticipantAction, "passing_yds__ge", 30.into()), false);
        let sql = clause.render(&all_entities(), &mut params, None, false).unwrap();
        assert_eq!(sql, "(participant_action.passing_yds >= $1)");
    }

    #[test]
    fn empty_tree_renders_truth_literal() {
        let mut params = ParamList::new();
        let sql = Clause::new()
            .render(&all_entities(), &mut params, None, false)
            .unwrap();
        assert_eq!(sql, "true");
        assert!(params.is_empty());
    }

    #[test]
    fn single_conjunct_has_no_stray_or() {
        let mut params = ParamList::new();
        let mut clause = Clause::new();
        clause.push(cmp(Event, "season_year", 2024.into()), false);
        let sql = clause.render(&all_entities(), &mut params, None, false).unwrap();
        assert_eq!(sql, "(event.season_year = $1)");
        assert!(!sql.contains("OR"));
    }

    #[test]
    fn disjuncts_have_lowest_precedence() {
        let mut clause = Clause::new();
        clause.push(cmp(Event, "week", 1.into()), false);
        clause.push(cmp(Event, "season_year", 2023.into()), false);
        clause.push(cmp(Event, "finished", true.into()), true);
        let mut params = ParamList::new();
        let sql = clause.render(&all_entities(), &mut params, None, false).unwrap();
        assert_eq!(
            sql,
            "((event.week = $1 AND event.season_year = $2) OR event.finished = $3)"
        );
    }

    #[test]
    fn nested_clause_keeps_its_grouping() {
        let mut inner = Clause::new();
        inner.push(cmp(Event, "home_score__ge", 50.into()), true);
        inner.push(cmp(Event, "away_score__ge", 50.into()), true);

        let mut outer = Clause::new();
        outer.push(cmp(Event, "season_year", 2012.into()), false);
        outer.push(Term::Sub(inner), false);

        let mut params = ParamList::new();
        let sql = outer.render(&all_entities(), &mut params, None, false).unwrap();
        assert_eq!(
            sql,
            "(event.season_year = $1 AND (event.home_score >= $2 OR event.away_score >= $3))"
        );
    }

    #[test]
    fn list_value_forces_in_rendering() {
        let mut clause = Clause::new();
        clause.push(cmp(Event, "season_year", vec![2021i64, 2022, 2023].into()), false);
        let mut params = ParamList::new();
        let sql = clause.render(&all_entities(), &mut params, None, false).unwrap();
        assert_eq!(sql, "(event.season_year IN ($1, $2, $3))");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn list_value_rejects_other_operators() {
        let err = Comparison::new(Event, "season_year__ge", vec![2021i64].into()).unwrap_err();
        assert!(matches!(err, StoreError::ListOperator { .. }));
    }

    #[test]
    fn unknown_field_fails_at_construction() {
        let err = Comparison::new(Event, "passing_yds", 1.into()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }

    #[test]
    fn entity_restriction_skips_foreign_comparisons() {
        let mut clause = Clause::new();
        clause.push(cmp(Event, "week", 3.into()), false);
        clause.push(cmp(Action, "down", 3.into()), false);
        let only_action: BTreeSet<_> = [Action].into_iter().collect();
        let mut params = ParamList::new();
        let sql = clause.render(&only_action, &mut params, None, false).unwrap();
        assert_eq!(sql, "(action.down = $1)");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn field_ref_renders_without_binding() {
        let fr = FieldRef::new(Event, "home_team").unwrap();
        let mut clause = Clause::new();
        clause.push(cmp(Event, "winner", fr.into()), false);
        let mut params = ParamList::new();
        let sql = clause.render(&all_entities(), &mut params, None, false).unwrap();
        assert!(sql.contains("END = event.home_team"));
        assert!(params.is_empty());
    }

    #[test]
    fn field_ref_rejects_unknown_fields() {
        assert!(FieldRef::new(Event, "no_such; DROP TABLE event").is_err());
    }

    #[test]
    fn aggregate_rendering_wraps_sum() {
        let mut clause = Clause::new();
        clause.push(cmp(ParticipantAction, "passing_yds__ge", 4000.into()), false);
        let entities: BTreeSet<_> = [ParticipantAction].into_iter().collect();
        let mut params = ParamList::new();
        let sql = clause.render(&entities, &mut params, None, true).unwrap();
        assert_eq!(sql, "(SUM(participant_action.passing_yds) >= $1)");
    }

    #[test]
    fn clock_serializes_through_game_seconds() {
        let mut clause = Clause::new();
        clause.push(cmp(Action, "clock__le", Clock::new(2, 120).into()), false);
        let mut params = ParamList::new();
        let sql = clause.render(&all_entities(), &mut params, None, false).unwrap();
        assert_eq!(sql, "(action.clock <= $1)");
        assert_eq!(params.len(), 1);
    }
}
