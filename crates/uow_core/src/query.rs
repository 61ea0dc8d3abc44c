//! Query specification: filter, ordering, pagination and include paths.
//!
//! # Responsibility
//! - Describe one read as a value (`QuerySpec`) built per call.
//! - Compile the description into parameterized SQL for one entity table.
//!
//! # Invariants
//! - Pipeline order is fixed: includes, filter, ordering, skip, take.
//!   Filter/order/skip/take run in SQL; includes run on each materialized row.
//! - Columns named by `Filter`/`OrderBy` must be declared by the entity;
//!   `Filter::raw` is the only unchecked path.
//! - Values are always bound as parameters, never spliced into SQL text.

use crate::model::entity::Entity;
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::fmt::{self, Debug, Formatter};

/// Composable row predicate with bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    clause: String,
    params: Vec<Value>,
    columns: Vec<String>,
}

impl Filter {
    fn comparison(column: &str, operator: &str, value: Value) -> Self {
        Self {
            clause: format!("{} {operator} ?", quote_ident(column)),
            params: vec![value],
            columns: vec![column.to_string()],
        }
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::comparison(column, "=", value.into())
    }

    pub fn ne(column: &str, value: impl Into<Value>) -> Self {
        Self::comparison(column, "<>", value.into())
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Self::comparison(column, "<", value.into())
    }

    pub fn le(column: &str, value: impl Into<Value>) -> Self {
        Self::comparison(column, "<=", value.into())
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Self::comparison(column, ">", value.into())
    }

    pub fn ge(column: &str, value: impl Into<Value>) -> Self {
        Self::comparison(column, ">=", value.into())
    }

    /// Case-sensitive substring match. An empty needle matches every non-null value.
    pub fn contains(column: &str, needle: impl Into<String>) -> Self {
        Self {
            clause: format!("instr({}, ?) > 0", quote_ident(column)),
            params: vec![Value::Text(needle.into())],
            columns: vec![column.to_string()],
        }
    }

    /// Case-sensitive prefix match.
    pub fn starts_with(column: &str, prefix: impl Into<String>) -> Self {
        Self {
            clause: format!("instr({}, ?) = 1", quote_ident(column)),
            params: vec![Value::Text(prefix.into())],
            columns: vec![column.to_string()],
        }
    }

    pub fn is_null(column: &str) -> Self {
        Self {
            clause: format!("{} IS NULL", quote_ident(column)),
            params: Vec::new(),
            columns: vec![column.to_string()],
        }
    }

    pub fn is_not_null(column: &str) -> Self {
        Self {
            clause: format!("{} IS NOT NULL", quote_ident(column)),
            params: Vec::new(),
            columns: vec![column.to_string()],
        }
    }

    /// Membership test. An empty value list matches nothing.
    pub fn in_values<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let params: Vec<Value> = values.into_iter().map(Into::into).collect();
        let clause = if params.is_empty() {
            "0 = 1".to_string()
        } else {
            let placeholders = vec!["?"; params.len()].join(", ");
            format!("{} IN ({placeholders})", quote_ident(column))
        };
        Self {
            clause,
            params,
            columns: vec![column.to_string()],
        }
    }

    /// Unchecked SQL predicate. Placeholders must be anonymous (`?`) and
    /// match `params` in order.
    pub fn raw(clause: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            params,
            columns: Vec::new(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        self.combine("AND", other)
    }

    pub fn or(self, other: Filter) -> Self {
        self.combine("OR", other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self {
            clause: format!("NOT ({})", self.clause),
            params: self.params,
            columns: self.columns,
        }
    }

    fn combine(mut self, operator: &str, other: Filter) -> Self {
        self.clause = format!("({}) {operator} ({})", self.clause, other.clause);
        self.params.extend(other.params);
        self.columns.extend(other.columns);
        self
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Sort direction for one ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordered list of sort keys; earlier keys take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    keys: Vec<(String, Direction)>,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            keys: vec![(column.to_string(), Direction::Asc)],
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            keys: vec![(column.to_string(), Direction::Desc)],
        }
    }

    pub fn then_asc(mut self, column: &str) -> Self {
        self.keys.push((column.to_string(), Direction::Asc));
        self
    }

    pub fn then_desc(mut self, column: &str) -> Self {
        self.keys.push((column.to_string(), Direction::Desc));
        self
    }

    pub fn keys(&self) -> &[(String, Direction)] {
        &self.keys
    }
}

/// Loader for one related-data path, run on every materialized entity.
pub struct Include<E> {
    path: &'static str,
    load: fn(&Connection, &mut E) -> rusqlite::Result<()>,
}

impl<E> Include<E> {
    pub const fn new(
        path: &'static str,
        load: fn(&Connection, &mut E) -> rusqlite::Result<()>,
    ) -> Self {
        Self { path, load }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub(crate) fn apply(&self, conn: &Connection, entity: &mut E) -> rusqlite::Result<()> {
        (self.load)(conn, entity)
    }
}

impl<E> Clone for Include<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Include<E> {}

impl<E> Debug for Include<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Include").field("path", &self.path).finish()
    }
}

/// Everything one read needs. Built per call and never persisted.
pub struct QuerySpec<E> {
    pub filter: Option<Filter>,
    pub order_by: Option<OrderBy>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub includes: Vec<Include<E>>,
}

impl<E> Default for QuerySpec<E> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: None,
            skip: None,
            take: None,
            includes: Vec::new(),
        }
    }
}

impl<E> Clone for QuerySpec<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            skip: self.skip,
            take: self.take,
            includes: self.includes.clone(),
        }
    }
}

impl<E> Debug for QuerySpec<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("includes", &self.includes)
            .finish()
    }
}

impl<E: Entity> QuerySpec<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter, AND-combined with any filter already present.
    pub fn and_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub(crate) fn is_paginated(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    pub(crate) fn compile_select(&self) -> RepoResult<(String, Vec<Value>)> {
        let columns = E::COLUMNS
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        self.compile_body(&columns)
    }

    /// Counts matching rows; pagination, when present, bounds the count.
    pub(crate) fn compile_count(&self) -> RepoResult<(String, Vec<Value>)> {
        if self.is_paginated() {
            let (inner, bind_values) = self.compile_body("1")?;
            return Ok((format!("SELECT COUNT(*) FROM ({inner})"), bind_values));
        }
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(E::TABLE));
        let mut bind_values = Vec::new();
        push_where::<E>(&mut sql, &mut bind_values, self.filter.as_ref())?;
        Ok((sql, bind_values))
    }

    pub(crate) fn compile_exists(&self) -> RepoResult<(String, Vec<Value>)> {
        let (inner, bind_values) = self.compile_body("1")?;
        Ok((format!("SELECT EXISTS({inner})"), bind_values))
    }

    fn compile_body(&self, projection: &str) -> RepoResult<(String, Vec<Value>)> {
        let mut sql = format!("SELECT {projection} FROM {}", quote_ident(E::TABLE));
        let mut bind_values = Vec::new();

        push_where::<E>(&mut sql, &mut bind_values, self.filter.as_ref())?;

        if let Some(order_by) = self.order_by.as_ref() {
            let mut terms = Vec::with_capacity(order_by.keys.len());
            for (column, direction) in &order_by.keys {
                ensure_column::<E>(column)?;
                terms.push(format!("{} {}", quote_ident(column), direction.as_sql()));
            }
            if !terms.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&terms.join(", "));
            }
        }

        match (self.take, self.skip) {
            (Some(take), skip) => {
                sql.push_str(" LIMIT ?");
                bind_values.push(Value::Integer(to_sql_count(take)));
                if let Some(skip) = skip.filter(|skip| *skip > 0) {
                    sql.push_str(" OFFSET ?");
                    bind_values.push(Value::Integer(to_sql_count(skip)));
                }
            }
            (None, Some(skip)) if skip > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                bind_values.push(Value::Integer(to_sql_count(skip)));
            }
            (None, _) => {}
        }

        Ok((sql, bind_values))
    }
}

fn push_where<E: Entity>(
    sql: &mut String,
    bind_values: &mut Vec<Value>,
    filter: Option<&Filter>,
) -> RepoResult<()> {
    let Some(filter) = filter else {
        return Ok(());
    };
    for column in &filter.columns {
        ensure_column::<E>(column)?;
    }
    sql.push_str(" WHERE ");
    sql.push_str(&filter.clause);
    bind_values.extend(filter.params.iter().cloned());
    Ok(())
}

fn ensure_column<E: Entity>(column: &str) -> RepoResult<()> {
    if E::COLUMNS.contains(&column) {
        return Ok(());
    }
    Err(RepoError::UnknownColumn {
        table: E::TABLE,
        column: column.to_string(),
    })
}

pub(crate) fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
