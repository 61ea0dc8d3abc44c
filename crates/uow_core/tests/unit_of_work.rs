mod common;

use common::{file_uow, id_eq, memory_uow, seed_customers, Customer, CustomerService, Order};
use std::rc::Rc;
use uow_core::{
    ContextOptions, DbError, EntityState, IsolationLevel, RepoError, UnitOfWork, UowError,
};

#[test]
fn repository_is_cached_per_entity_type() {
    let uow = memory_uow();
    let first = uow.repository::<Customer>().unwrap();
    let second = uow.repository::<Customer>().unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(uow.cached_repositories(), 1);

    let orders = uow.repository::<Order>().unwrap();
    assert_eq!(uow.cached_repositories(), 2);

    let sibling = first.get_repository::<Order>().unwrap();
    assert!(Rc::ptr_eq(&orders, &sibling));
    assert_eq!(uow.cached_repositories(), 2);
}

#[test]
fn dispose_is_idempotent() {
    let uow = memory_uow();
    uow.repository::<Customer>().unwrap();

    assert!(uow.dispose());
    assert!(!uow.dispose());
    assert!(uow.is_disposed());
    assert_eq!(uow.cached_repositories(), 0);

    assert!(matches!(uow.repository::<Customer>(), Err(UowError::Disposed)));
    assert!(matches!(uow.save_changes(), Err(UowError::Disposed)));
    assert!(matches!(
        uow.begin_transaction(IsolationLevel::Unspecified),
        Err(UowError::Disposed)
    ));
}

#[test]
fn commit_without_transaction_fails_and_rollback_is_noop() {
    let uow = memory_uow();
    assert!(matches!(
        uow.commit_transaction(),
        Err(UowError::NoActiveTransaction)
    ));
    uow.rollback_transaction().unwrap();
    assert!(!uow.is_transaction_active());
}

#[test]
fn begin_while_active_is_rejected_and_keeps_open_transaction() {
    let uow = memory_uow();
    uow.begin_transaction(IsolationLevel::ReadCommitted).unwrap();

    let err = uow
        .begin_transaction(IsolationLevel::Serializable)
        .expect_err("second begin must be rejected");
    assert!(matches!(
        err,
        UowError::TransactionAlreadyActive(IsolationLevel::ReadCommitted)
    ));
    assert!(uow.is_transaction_active());
    assert_eq!(
        uow.transaction_isolation(),
        Some(IsolationLevel::ReadCommitted)
    );

    assert!(uow.commit_transaction().unwrap());
    assert!(!uow.is_transaction_active());
    assert_eq!(uow.transaction_isolation(), None);
}

#[test]
fn rolled_back_insert_is_not_visible_to_a_fresh_unit_of_work() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.db");

    let uow = file_uow(&path);
    uow.begin_transaction(IsolationLevel::Unspecified).unwrap();
    let service = CustomerService::new(&uow).unwrap();
    let inserted = service.insert(Customer::new("A1", "Acme"));
    assert!(inserted.succeeded());
    assert_eq!(uow.save_changes().unwrap(), 1);
    uow.rollback_transaction().unwrap();
    assert!(uow.dispose());

    let fresh = UnitOfWork::open(&path, &ContextOptions::default()).unwrap();
    let service = CustomerService::new(&fresh).unwrap();
    let exists = service.get_exists(Some(id_eq("A1")));
    assert!(exists.succeeded());
    assert_eq!(exists.payload(), Some(&false));
}

#[test]
fn committed_changes_persist_across_units_of_work() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.db");

    {
        let uow = file_uow(&path);
        uow.begin_transaction(IsolationLevel::Serializable).unwrap();
        seed_customers(&uow, &["B1", "B2"]);
        assert!(uow.commit_transaction().unwrap());
    }

    let fresh = UnitOfWork::open(&path, &ContextOptions::default()).unwrap();
    let repo = fresh.repository::<Customer>().unwrap();
    assert_eq!(repo.get_count(None).unwrap(), 2);
}

#[test]
fn save_without_transaction_writes_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.db");

    let uow = file_uow(&path);
    seed_customers(&uow, &["C1"]);

    let other = UnitOfWork::open(&path, &ContextOptions::default()).unwrap();
    let repo = other.repository::<Customer>().unwrap();
    assert!(repo.get_exists(Some(id_eq("C1"))).unwrap());
}

#[test]
fn dispose_abandons_open_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.db");

    let uow = file_uow(&path);
    uow.begin_transaction(IsolationLevel::RepeatableRead).unwrap();
    seed_customers(&uow, &["D1"]);
    drop(uow);

    let fresh = UnitOfWork::open(&path, &ContextOptions::default()).unwrap();
    let repo = fresh.repository::<Customer>().unwrap();
    assert!(!repo.get_exists(Some(id_eq("D1"))).unwrap());
}

#[test]
fn repository_outliving_its_unit_of_work_reports_release() {
    let uow = memory_uow();
    let repo = uow.repository::<Customer>().unwrap();
    uow.dispose();

    assert!(matches!(repo.get_count(None), Err(RepoError::ContextReleased)));
    assert!(matches!(
        repo.insert(Customer::new("E1", "Late")),
        Err(RepoError::ContextReleased)
    ));
    assert!(matches!(
        repo.get_repository::<Order>(),
        Err(RepoError::ContextReleased)
    ));

    drop(uow);
    assert!(matches!(
        repo.get_repository::<Order>(),
        Err(RepoError::ContextReleased)
    ));
}

#[test]
fn discard_changes_drops_staged_entities() {
    let uow = memory_uow();
    let repo = uow.repository::<Customer>().unwrap();
    repo.insert(Customer::new("F1", "Fabrikam")).unwrap();
    repo.insert(Customer::new("F2", "Fourth")).unwrap();
    assert!(uow.has_changes());

    assert_eq!(uow.discard_changes(), 2);
    assert!(!uow.has_changes());
    assert_eq!(uow.save_changes().unwrap(), 0);
    assert_eq!(repo.get_count(None).unwrap(), 0);
}

#[test]
fn update_of_missing_row_fails_on_save() {
    let uow = memory_uow();
    let repo = uow.repository::<Customer>().unwrap();
    repo.update(Customer::new("G1", "Ghost")).unwrap();
    assert_eq!(
        uow.with_context(|context| context.state_of::<Customer>(&"G1".to_string()))
            .unwrap(),
        Some(EntityState::Modified)
    );

    let err = uow.save_changes().expect_err("update of a missing row must fail");
    assert!(matches!(
        err,
        UowError::Repo(RepoError::Db(DbError::RowNotFound { table: "customers", .. }))
    ));
    assert_eq!(uow.pending_changes(), 1);
}

#[test]
fn writes_inside_with_context_report_busy_context() {
    let uow = memory_uow();
    let repo = uow.repository::<Customer>().unwrap();

    let staged = uow
        .with_context(|_| repo.insert(Customer::new("Z1", "Zeta")))
        .unwrap();
    assert!(matches!(staged, Err(RepoError::ContextBusy)));
    assert!(!uow.has_changes());

    let count = uow.with_context(|_| repo.get_count(None)).unwrap();
    assert_eq!(count.unwrap(), 0);

    let saved = uow.with_context(|_| uow.save_changes()).unwrap();
    assert!(matches!(saved, Err(UowError::Repo(RepoError::ContextBusy))));

    repo.insert(Customer::new("Z1", "Zeta")).unwrap();
    assert_eq!(uow.save_changes().unwrap(), 1);
}

#[test]
fn dispose_inside_with_context_is_deferred_until_the_borrow_ends() {
    let uow = memory_uow();
    let repo = uow.repository::<Customer>().unwrap();

    let released = uow.with_context(|_| uow.dispose()).unwrap();
    assert!(!released);
    assert!(!uow.is_disposed());
    assert_eq!(uow.cached_repositories(), 1);

    assert!(uow.dispose());
    assert!(uow.is_disposed());
    assert!(matches!(
        repo.insert(Customer::new("Z2", "Zulu")),
        Err(RepoError::ContextReleased)
    ));
    assert!(matches!(repo.get_count(None), Err(RepoError::ContextReleased)));
}

#[test]
fn failed_commit_clears_handle_and_rolls_back() {
    let uow = memory_uow();
    uow.with_context(|context| {
        context
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TABLE invoices (
                    id TEXT PRIMARY KEY,
                    customer_id TEXT NOT NULL
                        REFERENCES customers(id) DEFERRABLE INITIALLY DEFERRED
                );",
            )
            .unwrap()
    })
    .unwrap();

    uow.begin_transaction(IsolationLevel::Unspecified).unwrap();
    seed_customers(&uow, &["H1"]);
    uow.with_context(|context| {
        context
            .connection()
            .unwrap()
            .execute("INSERT INTO invoices (id, customer_id) VALUES ('I1', 'nobody');", [])
            .unwrap()
    })
    .unwrap();

    let err = uow
        .commit_transaction()
        .expect_err("deferred foreign key must fail the commit");
    assert!(matches!(err, UowError::Repo(RepoError::Db(DbError::Sqlite(_)))));
    assert!(!uow.is_transaction_active());
    assert!(!uow.with_context(|context| context.in_transaction()).unwrap());

    let repo = uow.repository::<Customer>().unwrap();
    assert!(!repo.get_exists(Some(id_eq("H1"))).unwrap());

    uow.begin_transaction(IsolationLevel::Serializable).unwrap();
    assert!(uow.is_transaction_active());
    uow.rollback_transaction().unwrap();
}
