//! # Row Queries
//!
//! Structured queries against the SBX row API. A [`QueryBuilder`] holds one
//! active mode (condition groups, primary keys or row objects) and is turned
//! into a [`WireRequest`] by [`compile`].

pub mod builder;
pub mod compile;

pub use builder::{Mode, QueryBuilder, QueryConfig, MAX_PAGE_SIZE};
pub use compile::{compile, WhereClause, WireCondition, WireGroup, WireRequest};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::QueryValue;

/// A row object sent for insert/update. Ordered so that compiling twice
/// yields byte-identical bodies.
pub type Row = BTreeMap<String, QueryValue>;

/// What a query does on the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Find,
    Insert,
    Update,
    Delete,
}

impl Action {
    /// API path of the row endpoint serving this action.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Find => "/api/data/v1/row/find",
            Self::Insert => "/api/data/v1/row/add",
            Self::Update => "/api/data/v1/row/update",
            Self::Delete => "/api/data/v1/row/delete",
        }
    }

    /// Find and delete select rows by conditions or keys.
    pub fn selects_rows(&self) -> bool {
        matches!(self, Self::Find | Self::Delete)
    }

    /// Insert and update carry row objects.
    pub fn carries_rows(&self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Find => write!(f, "find"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// How a condition (or group) joins the one before it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "IS")]
    Is,
    #[serde(rename = "IS NOT")]
    IsNot,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Like => "LIKE",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub combinator: Combinator,
    pub field: String,
    pub op: Operator,
    pub value: QueryValue,
}

impl Condition {
    pub fn new(
        combinator: Combinator,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<QueryValue>,
    ) -> Self {
        Self {
            combinator,
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field LIKE 'value%'`
    pub fn starts_with(combinator: Combinator, field: impl Into<String>, value: &str) -> Self {
        Self::new(combinator, field, Operator::Like, format!("{}%", value))
    }

    /// `field LIKE '%value'`
    pub fn ends_with(combinator: Combinator, field: impl Into<String>, value: &str) -> Self {
        Self::new(combinator, field, Operator::Like, format!("%{}", value))
    }

    /// `field LIKE '%w1%w2%'`: every whitespace-separated word must appear,
    /// in order.
    pub fn contains(combinator: Combinator, field: impl Into<String>, value: &str) -> Self {
        let pattern = value.split_whitespace().collect::<Vec<_>>().join("%");
        Self::new(combinator, field, Operator::Like, format!("%{}%", pattern))
    }

    pub fn is_null(combinator: Combinator, field: impl Into<String>) -> Self {
        Self::new(combinator, field, Operator::Is, QueryValue::Null)
    }

    pub fn is_not_null(combinator: Combinator, field: impl Into<String>) -> Self {
        Self::new(combinator, field, Operator::IsNot, QueryValue::Null)
    }

    pub fn is_in(combinator: Combinator, field: impl Into<String>, values: Vec<QueryValue>) -> Self {
        Self::new(combinator, field, Operator::In, QueryValue::Array(values))
    }

    pub fn not_in(combinator: Combinator, field: impl Into<String>, values: Vec<QueryValue>) -> Self {
        Self::new(combinator, field, Operator::NotIn, QueryValue::Array(values))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionGroup {
    pub combinator: Combinator,
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    pub fn new(combinator: Combinator) -> Self {
        Self {
            combinator,
            conditions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_joins_words() {
        let c = Condition::contains(Combinator::And, "name", "red car");
        assert_eq!(c.op, Operator::Like);
        assert_eq!(c.value, QueryValue::from("%red%car%"));
    }

    #[test]
    fn test_contains_collapses_whitespace_runs() {
        let c = Condition::contains(Combinator::Or, "name", "  red   car ");
        assert_eq!(c.value, QueryValue::from("%red%car%"));
        assert_eq!(c.combinator, Combinator::Or);
    }

    #[test]
    fn test_contains_empty() {
        let c = Condition::contains(Combinator::And, "name", "");
        assert_eq!(c.op, Operator::Like);
        assert_eq!(c.value, QueryValue::from("%%"));
    }

    #[test]
    fn test_starts_and_ends_with() {
        let s = Condition::starts_with(Combinator::And, "code", "AB");
        assert_eq!(s.value, QueryValue::from("AB%"));
        let e = Condition::ends_with(Combinator::And, "code", "AB");
        assert_eq!(e.value, QueryValue::from("%AB"));
    }

    #[test]
    fn test_null_checks() {
        let c = Condition::is_null(Combinator::And, "deleted_at");
        assert_eq!((c.op, c.value), (Operator::Is, QueryValue::Null));
        let c = Condition::is_not_null(Combinator::And, "deleted_at");
        assert_eq!((c.op, c.value), (Operator::IsNot, QueryValue::Null));
    }

    #[test]
    fn test_in_wraps_array() {
        let c = Condition::not_in(Combinator::And, "state", vec![1.into(), 2.into()]);
        assert_eq!(c.op, Operator::NotIn);
        assert_eq!(
            c.value,
            QueryValue::Array(vec![QueryValue::Int(1), QueryValue::Int(2)])
        );
    }

    #[test]
    fn test_operator_wire_spelling() {
        assert_eq!(serde_json::to_value(Operator::IsNot).unwrap(), "IS NOT");
        assert_eq!(serde_json::to_value(Operator::Neq).unwrap(), "!=");
        assert_eq!(Operator::NotIn.to_string(), "NOT IN");
        assert_eq!(serde_json::to_value(Combinator::Or).unwrap(), "OR");
    }

    #[test]
    fn test_action_paths() {
        assert_eq!(Action::Insert.path(), "/api/data/v1/row/add");
        assert!(Action::Delete.selects_rows());
        assert!(!Action::Delete.carries_rows());
        assert!(Action::Update.carries_rows());
    }
}
