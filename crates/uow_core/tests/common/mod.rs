#![allow(dead_code)]

use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use std::ops::Deref;
use uow_core::{
    ContextOptions, Entity, FieldViolation, Filter, Include, OrderBy, Outcome, RepoResult,
    Repository, Service, UnitOfWork, UowResult,
};

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    contact_name TEXT
);
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY,
    customer_id TEXT NOT NULL REFERENCES customers(id),
    amount INTEGER NOT NULL
);
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub orders: Vec<Order>,
}

impl Customer {
    pub fn new(id: &str, company_name: &str) -> Self {
        Self {
            id: id.to_string(),
            company_name: company_name.to_string(),
            contact_name: None,
            orders: Vec::new(),
        }
    }

    pub fn with_contact(mut self, contact_name: &str) -> Self {
        self.contact_name = Some(contact_name.to_string());
        self
    }
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
            orders: Vec::new(),
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    pub customer_id: String,
    pub amount: i64,
}

impl Entity for Order {
    type Key = i64;
    const TABLE: &'static str = "orders";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "customer_id", "amount"];

    fn key(&self) -> i64 {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            customer_id: row.get("customer_id")?,
            amount: row.get("amount")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.customer_id.clone()),
            Value::Integer(self.amount),
        ]
    }
}

fn load_orders(conn: &Connection, customer: &mut Customer) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, customer_id, amount FROM orders WHERE customer_id = ?1 ORDER BY id ASC;",
    )?;
    let orders = stmt
        .query_map(params![customer.id], |row| Order::from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    customer.orders = orders;
    Ok(())
}

pub const ORDERS: Include<Customer> = Include::new("orders", load_orders);

/// Customer-specific reads layered on the generic repository.
pub trait CustomerRepositoryExt {
    fn customers_by_company(&self, contact: &str) -> RepoResult<Vec<Customer>>;
}

impl CustomerRepositoryExt for Repository<Customer> {
    fn customers_by_company(&self, contact: &str) -> RepoResult<Vec<Customer>> {
        self.get(
            Some(Filter::contains("contact_name", contact)),
            Some(OrderBy::asc("id")),
            None,
            None,
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

    pub fn customers_by_company(&self, contact: &str) -> Outcome<Vec<Customer>> {
        self.wrap("customers_by_company", |repo| {
            repo.customers_by_company(contact)
        })
    }
}

impl Deref for CustomerService {
    type Target = Service<Customer>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub fn create_schema(uow: &UnitOfWork) {
    uow.with_context(|context| {
        context
            .connection()
            .unwrap()
            .execute_batch(SCHEMA_SQL)
            .unwrap()
    })
    .unwrap();
}

pub fn memory_uow() -> UnitOfWork {
    let uow = UnitOfWork::open_in_memory(&ContextOptions::default()).unwrap();
    create_schema(&uow);
    uow
}

pub fn file_uow(path: &std::path::Path) -> UnitOfWork {
    let uow = UnitOfWork::open(path, &ContextOptions::default()).unwrap();
    create_schema(&uow);
    uow
}

pub fn seed_customers(uow: &UnitOfWork, ids: &[&str]) {
    let repo = uow.repository::<Customer>().unwrap();
    for id in ids {
        repo.insert(Customer::new(id, &format!("Company {id}")))
            .unwrap();
    }
    uow.save_changes().unwrap();
}

pub fn id_eq(id: &str) -> Filter {
    Filter::eq("id", id.to_string())
}

pub fn ids(customers: &[Customer]) -> Vec<&str> {
    customers.iter().map(|customer| customer.id.as_str()).collect()
}
