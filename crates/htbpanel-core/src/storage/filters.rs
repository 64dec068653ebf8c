//! Composite machine filters.
//!
//! A [`MachineFilters`] selection folds into a list of [`Predicate`]s, each
//! rendered into a parameterized SQL fragment. Column names come from a
//! closed enum; every user-supplied value is a bind parameter.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::models::Difficulty;

/// How several selected availability options combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityPolicy {
    /// Every selected flag must be set (Free AND Active).
    All,
    /// Any selected flag suffices (Free OR Active).
    Any,
}

/// Policy applied by [`MachineFilters::predicates`]. Selecting both Free and
/// Active therefore only matches machines that are both.
pub const AVAILABILITY_POLICY: AvailabilityPolicy = AvailabilityPolicy::All;

/// Completion filter over the two ownership flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompletionStatus {
    /// User and root both owned.
    Complete,
    /// At least one flag missing.
    Incomplete,
    #[default]
    Both,
}

impl FromStr for CompletionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "incomplete" => Ok(Self::Incomplete),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

/// Availability flags a machine can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Availability {
    Free,
    Active,
}

impl Availability {
    const fn column(self) -> Column {
        match self {
            Self::Free => Column::Free,
            Self::Active => Column::Active,
        }
    }
}

impl FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "active" => Ok(Self::Active),
            _ => Err(format!("unknown availability: {s}")),
        }
    }
}

/// Filterable machine columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Difficulty,
    Os,
    Free,
    Active,
}

impl Column {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Difficulty => "machines.difficulty",
            Self::Os => "machines.os",
            Self::Free => "machines.free",
            Self::Active => "machines.active",
        }
    }
}

/// One condition of the machine listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `user_own AND root_own`.
    FullyOwned,
    /// `NOT user_own OR NOT root_own`.
    NotFullyOwned,
    /// Column value is one of `values`.
    OneOf { column: Column, values: Vec<String> },
    /// Every listed boolean column is set.
    AllSet(Vec<Column>),
    /// At least one listed boolean column is set.
    AnySet(Vec<Column>),
    /// Machine carries at least one tag named in the set.
    TaggedWithAny(Vec<String>),
    /// Case-insensitive substring of the machine name.
    NameContains(String),
}

impl Predicate {
    /// Append this predicate as a parenthesized fragment.
    pub(crate) fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Self::FullyOwned => {
                qb.push("(machines.user_own = 1 AND machines.root_own = 1)");
            }
            Self::NotFullyOwned => {
                qb.push("(machines.user_own = 0 OR machines.root_own = 0)");
            }
            Self::OneOf { column, values } => {
                qb.push(column.as_sql()).push(" IN (");
                push_bind_list(qb, values);
            }
            Self::AllSet(columns) => push_flags(qb, columns, " AND "),
            Self::AnySet(columns) => push_flags(qb, columns, " OR "),
            Self::TaggedWithAny(names) => {
                qb.push(
                    "EXISTS (SELECT 1 FROM machine_tag mt JOIN tags t ON t.id = mt.tag_id \
                     WHERE mt.machine_id = machines.id AND t.name IN (",
                );
                push_bind_list(qb, names);
                qb.push(")");
            }
            Self::NameContains(needle) => {
                qb.push("instr(lower(machines.name), lower(")
                    .push_bind(needle.clone())
                    .push(")) > 0");
            }
        }
    }
}

fn push_bind_list(qb: &mut QueryBuilder<'_, Sqlite>, values: &[String]) {
    let mut sep = qb.separated(", ");
    for value in values {
        sep.push_bind(value.clone());
    }
    sep.push_unseparated(")");
}

fn push_flags(qb: &mut QueryBuilder<'_, Sqlite>, columns: &[Column], joiner: &str) {
    qb.push("(");
    for (idx, column) in columns.iter().enumerate() {
        if idx > 0 {
            qb.push(joiner);
        }
        qb.push(column.as_sql()).push(" = 1");
    }
    qb.push(")");
}

/// Append `WHERE p1 AND p2 ...`; nothing when the list is empty.
pub(crate) fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, predicates: &[Predicate]) {
    for (idx, predicate) in predicates.iter().enumerate() {
        qb.push(if idx == 0 { " WHERE " } else { " AND " });
        predicate.push_sql(qb);
    }
}

/// Selections from the filter dialog. Empty sets mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineFilters {
    pub status: CompletionStatus,
    pub availability: BTreeSet<Availability>,
    pub difficulty: BTreeSet<Difficulty>,
    pub os: BTreeSet<String>,
    pub category: BTreeSet<String>,
    pub area: BTreeSet<String>,
    pub vulnerability: BTreeSet<String>,
}

impl MachineFilters {
    /// True when no option is selected.
    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }

    /// Predicates under [`AVAILABILITY_POLICY`].
    pub fn predicates(&self) -> Vec<Predicate> {
        self.predicates_with(AVAILABILITY_POLICY)
    }

    /// Predicates under an explicit availability policy.
    pub fn predicates_with(&self, policy: AvailabilityPolicy) -> Vec<Predicate> {
        let mut predicates = Vec::new();

        match self.status {
            CompletionStatus::Complete => predicates.push(Predicate::FullyOwned),
            CompletionStatus::Incomplete => predicates.push(Predicate::NotFullyOwned),
            CompletionStatus::Both => {}
        }

        if !self.difficulty.is_empty() {
            predicates.push(Predicate::OneOf {
                column: Column::Difficulty,
                values: self.difficulty.iter().map(|d| d.as_str().to_string()).collect(),
            });
        }

        if !self.os.is_empty() {
            predicates.push(Predicate::OneOf {
                column: Column::Os,
                values: self.os.iter().cloned().collect(),
            });
        }

        if !self.availability.is_empty() {
            let columns = self.availability.iter().map(|a| a.column()).collect();
            predicates.push(match policy {
                AvailabilityPolicy::All => Predicate::AllSet(columns),
                AvailabilityPolicy::Any => Predicate::AnySet(columns),
            });
        }

        let tags: BTreeSet<&String> = self
            .category
            .iter()
            .chain(&self.area)
            .chain(&self.vulnerability)
            .collect();
        if !tags.is_empty() {
            predicates.push(Predicate::TaggedWithAny(
                tags.into_iter().cloned().collect(),
            ));
        }

        predicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(predicates: &[Predicate]) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM machines");
        push_where(&mut qb, predicates);
        qb.sql().to_string()
    }

    #[test]
    fn empty_filters_produce_no_predicates() {
        let filters = MachineFilters::default();
        assert!(filters.is_empty());
        assert_eq!(render(&filters.predicates()), "SELECT 1 FROM machines");
    }

    #[test]
    fn status_maps_to_ownership_predicates() {
        let complete = MachineFilters {
            status: CompletionStatus::Complete,
            ..Default::default()
        };
        assert_eq!(complete.predicates(), vec![Predicate::FullyOwned]);

        let incomplete = MachineFilters {
            status: CompletionStatus::Incomplete,
            ..Default::default()
        };
        assert_eq!(incomplete.predicates(), vec![Predicate::NotFullyOwned]);
    }

    #[test]
    fn availability_defaults_to_conjunction() {
        assert_eq!(AVAILABILITY_POLICY, AvailabilityPolicy::All);
        let filters = MachineFilters {
            availability: [Availability::Free, Availability::Active].into(),
            ..Default::default()
        };
        assert_eq!(
            filters.predicates(),
            vec![Predicate::AllSet(vec![Column::Free, Column::Active])]
        );
        assert!(render(&filters.predicates())
            .ends_with("WHERE (machines.free = 1 AND machines.active = 1)"));
    }

    #[test]
    fn availability_any_policy_uses_disjunction() {
        let filters = MachineFilters {
            availability: [Availability::Free, Availability::Active].into(),
            ..Default::default()
        };
        let sql = render(&filters.predicates_with(AvailabilityPolicy::Any));
        assert!(sql.ends_with("WHERE (machines.free = 1 OR machines.active = 1)"));
    }

    #[test]
    fn tag_fields_are_unioned_into_one_predicate() {
        let filters = MachineFilters {
            category: ["Enterprise".to_string()].into(),
            area: ["Web".to_string()].into(),
            vulnerability: ["SQL Injection".to_string(), "Web".to_string()].into(),
            ..Default::default()
        };
        assert_eq!(
            filters.predicates(),
            vec![Predicate::TaggedWithAny(vec![
                "Enterprise".into(),
                "SQL Injection".into(),
                "Web".into(),
            ])]
        );
    }

    #[test]
    fn groups_are_joined_with_and_and_values_are_bound() {
        let filters = MachineFilters {
            status: CompletionStatus::Incomplete,
            difficulty: [Difficulty::Easy, Difficulty::Hard].into(),
            os: ["Linux'; DROP TABLE machines; --".to_string()].into(),
            ..Default::default()
        };
        let sql = render(&filters.predicates());
        assert_eq!(
            sql,
            "SELECT 1 FROM machines WHERE (machines.user_own = 0 OR machines.root_own = 0) \
             AND machines.difficulty IN (?, ?) AND machines.os IN (?)"
        );
        assert!(!sql.contains("DROP"));
    }

    #[test]
    fn name_contains_is_parameterized() {
        let sql = render(&[Predicate::NameContains("la%".into())]);
        assert!(sql.ends_with("WHERE instr(lower(machines.name), lower(?)) > 0"));
    }

    #[test]
    fn parses_dialog_labels() {
        assert_eq!("Complete".parse::<CompletionStatus>().unwrap(), CompletionStatus::Complete);
        assert_eq!("free".parse::<Availability>().unwrap(), Availability::Free);
        assert!("Retired".parse::<Availability>().is_err());
    }

    #[test]
    fn filters_deserialize_from_partial_json() {
        let filters: MachineFilters =
            serde_json::from_str(r#"{"status": "Complete", "difficulty": ["Easy"]}"#).unwrap();
        assert_eq!(filters.status, CompletionStatus::Complete);
        assert_eq!(filters.predicates().len(), 2);
    }
}
