//! # sbx-core: query model of the sbx client
//!
//! Everything here is pure and synchronous:
//!
//! - [`QueryValue`]: literals usable in conditions and rows.
//! - [`QueryBuilder`]: one row query in exactly one mode (conditions, keys
//!   or row objects), plus paging and eager-fetch settings.
//! - [`compile`]: deterministic builder → wire body compiler.
//! - [`resolve`]: rewrites foreign-key fields of result rows into the
//!   referenced objects shipped in `fetched_results`.
//!
//! Transport, paging and concurrency live in `sbx-client`.

pub mod error;
pub mod query;
pub mod resolve;
pub mod schema;
pub mod value;

pub use error::{Error, Result};
pub use query::{
    compile, Action, Combinator, Condition, ConditionGroup, Mode, Operator, QueryBuilder,
    QueryConfig, Row, WhereClause, WireRequest, MAX_PAGE_SIZE,
};
pub use resolve::{resolve, resolve_row};
pub use schema::{FieldSchema, ReferencePool, REFERENCE_TYPE};
pub use value::QueryValue;
