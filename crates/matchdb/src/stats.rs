//! Statistic categories and the sparse statistic map.
//!
//! Statistics come in two disjoint scopes: per-action categories stored on
//! the `action` table and per-participant categories stored on
//! `participant_action` (and rolled up per action by the `action_stat`
//! view). A statistic absent for a row is numeric zero, never null, and
//! lookup is total over the known category set.

use crate::error::{StoreError, StoreResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-action statistic categories, stored on the `action` table.
pub static ACTION_STATS: &[&str] = &[
    "first_down",
    "fourth_down_att",
    "fourth_down_conv",
    "passing_first_down",
    "passing_incmp",
    "penalty",
    "penalty_first_down",
    "penalty_yds",
    "rushing_first_down",
    "third_down_att",
    "third_down_conv",
    "timeout",
    "xp_aborted",
    "yards_gained",
];

/// Per-participant statistic categories, stored on `participant_action` and
/// summed per action in the `action_stat` view.
pub static PARTICIPANT_STATS: &[&str] = &[
    "defense_ast",
    "defense_frec",
    "defense_frec_tds",
    "defense_frec_yds",
    "defense_int",
    "defense_int_tds",
    "defense_int_yds",
    "defense_misc_tds",
    "defense_pass_def",
    "defense_safe",
    "defense_sk",
    "defense_sk_yds",
    "defense_tkl",
    "fumbles_lost",
    "fumbles_rec",
    "fumbles_rec_tds",
    "fumbles_rec_yds",
    "fumbles_tot",
    "kicking_fg_yds",
    "kicking_fga",
    "kicking_fgm",
    "kicking_xpa",
    "kicking_xpmade",
    "kickret_ret",
    "kickret_tds",
    "kickret_yds",
    "passing_att",
    "passing_cmp",
    "passing_int",
    "passing_sk",
    "passing_sk_yds",
    "passing_tds",
    "passing_twoptm",
    "passing_yds",
    "punting_tot",
    "punting_yds",
    "puntret_ret",
    "puntret_tds",
    "puntret_yds",
    "receiving_rec",
    "receiving_tar",
    "receiving_tds",
    "receiving_twoptm",
    "receiving_yac_yds",
    "receiving_yds",
    "rushing_att",
    "rushing_loss",
    "rushing_loss_yds",
    "rushing_tds",
    "rushing_twoptm",
    "rushing_yds",
];

/// Derived sum-of-columns fields shared by Action and ParticipantAction.
/// Every component must be a stored per-participant category; this is
/// checked by `schema::validate_registry`.
pub static DERIVED_SUMS: &[(&str, &[&str])] = &[
    (
        "offense_yds",
        &["passing_yds", "rushing_yds", "receiving_yds", "fumbles_rec_yds"],
    ),
    (
        "offense_tds",
        &["passing_tds", "rushing_tds", "receiving_tds", "fumbles_rec_tds"],
    ),
    (
        "defense_tds",
        &["defense_int_tds", "defense_frec_tds", "defense_misc_tds"],
    ),
];

/// Scoring table for the derived `points` field, ordered by descending
/// point value so the generated CASE takes the greatest nonzero
/// contribution. The Rust accessor mirrors this with an explicit max.
pub static POINT_VALUES: &[(&str, i32)] = &[
    ("defense_frec_tds", 6),
    ("defense_int_tds", 6),
    ("defense_misc_tds", 6),
    ("fumbles_rec_tds", 6),
    ("kickret_tds", 6),
    ("passing_tds", 6),
    ("puntret_tds", 6),
    ("receiving_tds", 6),
    ("rushing_tds", 6),
    ("kicking_fgm", 3),
    ("defense_safe", 2),
    ("passing_twoptm", 2),
    ("receiving_twoptm", 2),
    ("rushing_twoptm", 2),
    ("kicking_xpmade", 1),
];

/// Look up a category name in the known set, returning the interned
/// `&'static str` key.
fn intern(name: &str) -> Option<&'static str> {
    ACTION_STATS
        .iter()
        .chain(PARTICIPANT_STATS.iter())
        .find(|s| **s == name)
        .copied()
}

/// A sparse map of statistic values with total default-zero lookup.
///
/// Only nonzero values are stored; `get` resolves any known category name to
/// `0` when unset. Unknown names are rejected when *writing*, never when
/// reading, so reads are total.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Statistics {
    values: BTreeMap<&'static str, i32>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `name`, defaulting to zero when unset.
    pub fn get(&self, name: &str) -> i32 {
        self.values.get(name).copied().unwrap_or(0)
    }

    /// Set a category value. Zero values are dropped so the map stays
    /// sparse. Fails on names outside the known category set.
    pub fn set(&mut self, name: &str, value: i32) -> StoreResult<()> {
        let key = intern(name).ok_or_else(|| StoreError::UnknownStatistic(name.to_string()))?;
        if value == 0 {
            self.values.remove(key);
        } else {
            self.values.insert(key, value);
        }
        Ok(())
    }

    /// Add another map's values into this one (used when aggregating in
    /// application code).
    pub fn merge(&mut self, other: &Statistics) {
        for (key, value) in &other.values {
            let sum = self.values.get(key).copied().unwrap_or(0) + value;
            if sum == 0 {
                self.values.remove(key);
            } else {
                self.values.insert(key, sum);
            }
        }
    }

    /// Sum of the stored components of a derived sum field, zero for
    /// anything that is not a derived sum.
    pub fn derived_sum(&self, name: &str) -> i32 {
        DERIVED_SUMS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, components)| components.iter().map(|c| self.get(c)).sum())
            .unwrap_or(0)
    }

    /// The greatest nonzero contribution from the scoring table.
    pub fn points(&self) -> i32 {
        POINT_VALUES
            .iter()
            .filter(|(stat, _)| self.get(stat) > 0)
            .map(|(_, value)| *value)
            .max()
            .unwrap_or(0)
    }

    /// Iterate over the stored (nonzero) values.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i32)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_zero_lookup_is_total() {
        let stats = Statistics::new();
        assert_eq!(stats.get("passing_yds"), 0);
        assert_eq!(stats.get("no_such_category"), 0);
    }

    #[test]
    fn set_rejects_unknown_names() {
        let mut stats = Statistics::new();
        assert!(stats.set("passing_yds", 42).is_ok());
        assert!(matches!(
            stats.set("passing_ydz", 42),
            Err(StoreError::UnknownStatistic(_))
        ));
    }

    #[test]
    fn zero_values_stay_sparse() {
        let mut stats = Statistics::new();
        stats.set("rushing_yds", 7).unwrap();
        stats.set("rushing_yds", 0).unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn derived_sums_match_components() {
        let mut stats = Statistics::new();
        stats.set("passing_yds", 30).unwrap();
        stats.set("rushing_yds", 12).unwrap();
        stats.set("fumbles_rec_yds", -3).unwrap();
        assert_eq!(stats.derived_sum("offense_yds"), 39);
        assert_eq!(stats.derived_sum("defense_tds"), 0);
    }

    #[test]
    fn points_take_greatest_contribution() {
        let mut stats = Statistics::new();
        stats.set("kicking_xpmade", 1).unwrap();
        assert_eq!(stats.points(), 1);
        stats.set("kicking_fgm", 2).unwrap();
        assert_eq!(stats.points(), 3);
        stats.set("rushing_tds", 1).unwrap();
        assert_eq!(stats.points(), 6);
    }

    #[test]
    fn merge_sums_values() {
        let mut a = Statistics::new();
        a.set("receiving_yds", 10).unwrap();
        let mut b = Statistics::new();
        b.set("receiving_yds", 5).unwrap();
        b.set("receiving_rec", 1).unwrap();
        a.merge(&b);
        assert_eq!(a.get("receiving_yds"), 15);
        assert_eq!(a.get("receiving_rec"), 1);
    }

    #[test]
    fn scopes_are_disjoint() {
        for s in ACTION_STATS {
            assert!(!PARTICIPANT_STATS.contains(s), "{s} in both scopes");
        }
    }
}
