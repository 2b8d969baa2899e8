//! # Query Builder
//!
//! Mutable builder for one logical row query. The active mode is a sum type,
//! so a query can never hold conditions and keys (or rows) at the same time.

use std::collections::BTreeSet;

use super::{Action, Combinator, Condition, ConditionGroup, Operator, Row};
use crate::error::{Error, Result};
use crate::value::QueryValue;

/// Ceiling the backend enforces on page size.
pub const MAX_PAGE_SIZE: u32 = 250;

/// Paging, target model and eager-fetch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub action: Action,
    pub domain: i64,
    pub model: String,
    /// 1-based.
    pub page: u32,
    /// Always in `1..=MAX_PAGE_SIZE`.
    pub page_size: u32,
    /// Referenced models the server should return in `fetched_results`.
    pub fetch: BTreeSet<String>,
}

/// The selection or payload a query carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Mode {
    #[default]
    Empty,
    Filter(Vec<ConditionGroup>),
    Keys(Vec<String>),
    Rows(Vec<Row>),
}

impl Mode {
    fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Filter(_) => "conditions",
            Self::Keys(_) => "keys",
            Self::Rows(_) => "rows",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    config: QueryConfig,
    mode: Mode,
}

impl QueryBuilder {
    pub fn new(action: Action, domain: i64, model: impl Into<String>) -> Self {
        Self {
            config: QueryConfig {
                action,
                domain,
                model: model.into(),
                page: 1,
                page_size: MAX_PAGE_SIZE,
                fetch: BTreeSet::new(),
            },
            mode: Mode::Empty,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn action(&self) -> Action {
        self.config.action
    }

    // =========================================================================
    // Paging & fetch
    // =========================================================================

    /// Pages start at 1; 0 is treated as 1.
    pub fn set_page(&mut self, page: u32) -> &mut Self {
        self.config.page = page.max(1);
        self
    }

    /// Clamped into `1..=250`.
    pub fn set_page_size(&mut self, size: u32) -> &mut Self {
        self.config.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Replace the set of models to eager-fetch.
    pub fn set_fetch<I, S>(&mut self, models: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fetch = models.into_iter().map(Into::into).collect();
        self
    }

    // =========================================================================
    // Mode mutators
    // =========================================================================

    /// Start a new condition group joined to the previous one by `combinator`.
    pub fn new_group(&mut self, combinator: Combinator) -> Result<&mut Self> {
        self.groups_mut()?.push(ConditionGroup::new(combinator));
        Ok(self)
    }

    /// Append a condition to the last group, opening an AND group first if
    /// there is none.
    pub fn add_condition(
        &mut self,
        combinator: Combinator,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<QueryValue>,
    ) -> Result<&mut Self> {
        self.push_condition(Condition::new(combinator, field, op, value))
    }

    pub fn push_condition(&mut self, condition: Condition) -> Result<&mut Self> {
        let groups = self.groups_mut()?;
        if groups.is_empty() {
            groups.push(ConditionGroup::new(Combinator::And));
        }
        if let Some(group) = groups.last_mut() {
            group.conditions.push(condition);
        }
        Ok(self)
    }

    pub fn add_key(&mut self, key: impl Into<String>) -> Result<&mut Self> {
        self.keys_mut()?.push(key.into());
        Ok(self)
    }

    pub fn add_object(&mut self, row: Row) -> Result<&mut Self> {
        self.rows_mut()?.push(row);
        Ok(self)
    }

    // =========================================================================
    // Condition sugar
    // =========================================================================

    pub fn and_where(
        &mut self,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<QueryValue>,
    ) -> Result<&mut Self> {
        self.add_condition(Combinator::And, field, op, value)
    }

    pub fn or_where(
        &mut self,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<QueryValue>,
    ) -> Result<&mut Self> {
        self.add_condition(Combinator::Or, field, op, value)
    }

    pub fn starts_with(
        &mut self,
        combinator: Combinator,
        field: impl Into<String>,
        value: &str,
    ) -> Result<&mut Self> {
        self.push_condition(Condition::starts_with(combinator, field, value))
    }

    pub fn ends_with(
        &mut self,
        combinator: Combinator,
        field: impl Into<String>,
        value: &str,
    ) -> Result<&mut Self> {
        self.push_condition(Condition::ends_with(combinator, field, value))
    }

    pub fn contains(
        &mut self,
        combinator: Combinator,
        field: impl Into<String>,
        value: &str,
    ) -> Result<&mut Self> {
        self.push_condition(Condition::contains(combinator, field, value))
    }

    pub fn is_null(&mut self, combinator: Combinator, field: impl Into<String>) -> Result<&mut Self> {
        self.push_condition(Condition::is_null(combinator, field))
    }

    pub fn is_not_null(
        &mut self,
        combinator: Combinator,
        field: impl Into<String>,
    ) -> Result<&mut Self> {
        self.push_condition(Condition::is_not_null(combinator, field))
    }

    pub fn is_in(
        &mut self,
        combinator: Combinator,
        field: impl Into<String>,
        values: Vec<QueryValue>,
    ) -> Result<&mut Self> {
        self.push_condition(Condition::is_in(combinator, field, values))
    }

    pub fn not_in(
        &mut self,
        combinator: Combinator,
        field: impl Into<String>,
        values: Vec<QueryValue>,
    ) -> Result<&mut Self> {
        self.push_condition(Condition::not_in(combinator, field, values))
    }

    // =========================================================================
    // Mode transitions
    // =========================================================================

    // Each accessor checks the action first and only then switches mode, so a
    // rejected call leaves the builder exactly as it was.

    fn groups_mut(&mut self) -> Result<&mut Vec<ConditionGroup>> {
        self.require(self.config.action.selects_rows(), "conditions")?;
        if !matches!(self.mode, Mode::Filter(_)) {
            self.discard_mode("conditions");
            self.mode = Mode::Filter(Vec::new());
        }
        let action = self.config.action;
        let Mode::Filter(groups) = &mut self.mode else {
            return Err(Error::InvalidQueryMode { action, mode: "conditions" });
        };
        Ok(groups)
    }

    fn keys_mut(&mut self) -> Result<&mut Vec<String>> {
        self.require(self.config.action.selects_rows(), "keys")?;
        if !matches!(self.mode, Mode::Keys(_)) {
            self.discard_mode("keys");
            self.mode = Mode::Keys(Vec::new());
        }
        let action = self.config.action;
        let Mode::Keys(keys) = &mut self.mode else {
            return Err(Error::InvalidQueryMode { action, mode: "keys" });
        };
        Ok(keys)
    }

    fn rows_mut(&mut self) -> Result<&mut Vec<Row>> {
        self.require(self.config.action.carries_rows(), "rows")?;
        if !matches!(self.mode, Mode::Rows(_)) {
            self.discard_mode("rows");
            self.mode = Mode::Rows(Vec::new());
        }
        let action = self.config.action;
        let Mode::Rows(rows) = &mut self.mode else {
            return Err(Error::InvalidQueryMode { action, mode: "rows" });
        };
        Ok(rows)
    }

    fn require(&self, allowed: bool, mode: &'static str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidQueryMode {
                action: self.config.action,
                mode,
            })
        }
    }

    fn discard_mode(&self, next: &'static str) {
        if !matches!(self.mode, Mode::Empty) {
            tracing::debug!(
                "query on '{}' switching from {} to {}",
                self.config.model,
                self.mode.name(),
                next
            );
        }
    }
}
