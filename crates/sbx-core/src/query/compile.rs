//! # Query Compiler
//!
//! Turns a [`QueryBuilder`] snapshot into the canonical request body of the
//! row API. Pure and deterministic: the same builder always compiles to the
//! same JSON, and compiling never touches the builder.

use serde::Serialize;

use super::{Combinator, Condition, ConditionGroup, Mode, Operator, QueryBuilder, Row};
use crate::error::Result;
use crate::value::QueryValue;

/// Body of a row request.
///
/// `fetch` is not part of the canonical body: it travels next to it as an
/// eager-fetch directive and the transport decides how to send it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireRequest {
    pub domain: i64,
    pub row_model: String,
    pub page: u32,
    pub size: u32,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip)]
    pub fetch: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WhereClause {
    Groups(Vec<WireGroup>),
    Keys { keys: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireGroup {
    #[serde(rename = "ANDOR")]
    pub combinator: Combinator,
    #[serde(rename = "GROUP")]
    pub conditions: Vec<WireCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireCondition {
    #[serde(rename = "ANDOR")]
    pub combinator: Combinator,
    #[serde(rename = "FIELD")]
    pub field: String,
    #[serde(rename = "OP")]
    pub op: Operator,
    #[serde(rename = "VAL")]
    pub value: QueryValue,
}

impl WireRequest {
    /// The body as a JSON value, `fetch` excluded.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Compile the builder into a wire request.
pub fn compile(query: &QueryBuilder) -> WireRequest {
    let config = query.config();

    let (where_clause, rows) = match query.mode() {
        Mode::Empty => (None, None),
        Mode::Filter(groups) => (
            Some(WhereClause::Groups(groups.iter().map(compile_group).collect())),
            None,
        ),
        Mode::Keys(keys) => (Some(WhereClause::Keys { keys: keys.clone() }), None),
        Mode::Rows(rows) => (None, Some(rows.clone())),
    };

    WireRequest {
        domain: config.domain,
        row_model: config.model.clone(),
        page: config.page,
        size: config.page_size,
        where_clause,
        rows,
        fetch: config.fetch.iter().cloned().collect(),
    }
}

fn compile_group(group: &ConditionGroup) -> WireGroup {
    WireGroup {
        combinator: group.combinator,
        conditions: group.conditions.iter().map(compile_condition).collect(),
    }
}

fn compile_condition(condition: &Condition) -> WireCondition {
    WireCondition {
        combinator: condition.combinator,
        field: condition.field.clone(),
        op: condition.op,
        value: condition.value.clone(),
    }
}
