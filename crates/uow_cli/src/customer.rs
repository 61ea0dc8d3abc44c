//! Sample `customers` entity driven by the CLI.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::Serialize;
use std::ops::Deref;
use uow_core::{
    Entity, FieldViolation, Filter, OrderBy, Outcome, RepoResult, Repository, Service, UnitOfWork,
    UowResult,
};

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    contact_name TEXT
);
";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub id: String,
    pub company_name: String,
    pub contact_name: Option<String>,
}

impl Entity for Customer {
    type Key = String;
    const TABLE: &'static str = "customers";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "company_name", "contact_name"];

    fn key(&self) -> String {
        self.id.clone()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            company_name: row.get("company_name")?,
            contact_name: row.get("contact_name")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.company_name.clone()),
            self.contact_name.clone().map_or(Value::Null, Value::Text),
        ]
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        let id_len = self.id.chars().count();
        if id_len == 0 || id_len > 5 {
            violations.push(FieldViolation::new("id", "must be 1-5 characters"));
        }
        if self.company_name.trim().is_empty() {
            violations.push(FieldViolation::new("company_name", "must not be empty"));
        }
        violations
    }
}

pub trait CustomerRepositoryExt {
    fn customers_by_company(
        &self,
        needle: &str,
        skip: Option<usize>,
        take: Option<usize>,
    ) -> RepoResult<Vec<Customer>>;
}

impl CustomerRepositoryExt for Repository<Customer> {
    fn customers_by_company(
        &self,
        needle: &str,
        skip: Option<usize>,
        take: Option<usize>,
    ) -> RepoResult<Vec<Customer>> {
        self.get(
            Some(Filter::contains("company_name", needle)),
            Some(OrderBy::asc("id")),
            skip,
            take,
            &[],
        )
    }
}

pub struct CustomerService {
    inner: Service<Customer>,
}

impl CustomerService {
    pub fn new(unit_of_work: &UnitOfWork) -> UowResult<Self> {
        Ok(Self {
            inner: Service::new(unit_of_work)?,
        })
    }

    pub fn customers_by_company(
        &self,
        needle: &str,
        skip: Option<usize>,
        take: Option<usize>,
    ) -> Outcome<Vec<Customer>> {
        self.wrap("customers_by_company", |repo| {
            repo.customers_by_company(needle, skip, take)
        })
    }
}

impl Deref for CustomerService {
    type Target = Service<Customer>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub fn ensure_schema(unit_of_work: &UnitOfWork) -> anyhow::Result<()> {
    unit_of_work.with_context(|context| -> anyhow::Result<()> {
        context.connection()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    })?
}
