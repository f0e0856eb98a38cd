//! Integration tests for the versioned store: SCD2 upserts, batch atomicity,
//! history ordering, and concurrent access through a shared store.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use histo_core::config::StoreConfig;
use histo_core::Record;
use histo_store::{
    EventType, HistoryDetails, NewHistoryEvent, StoreError, UpsertError, VersionedStore,
    OPEN_ENDED_VALID_TO,
};
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn open_store(dir: &TempDir) -> VersionedStore {
    VersionedStore::open(dir.path().join("histo.db"), &StoreConfig::default()).unwrap()
}

/// Second connection to the same file, as external tooling would read it.
fn reader(dir: &TempDir) -> Connection {
    Connection::open(dir.path().join("histo.db")).unwrap()
}

fn account(id: &str, balance: &str) -> Record {
    Record::new().with("account_id", id).with("balance", balance)
}

#[derive(Debug)]
struct VersionRow {
    id: i64,
    valid_from: String,
    valid_to: String,
    is_current: i64,
    row_hash: String,
}

fn versions(conn: &Connection, table: &str, key_field: &str, key: &str) -> Vec<VersionRow> {
    let sql = format!(
        "SELECT id, valid_from, valid_to, is_current, row_hash FROM {table} WHERE {key_field} = ?1 ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql).unwrap();
    let rows = stmt
        .query_map([key], |row| {
            Ok(VersionRow {
                id: row.get(0)?,
                valid_from: row.get(1)?,
                valid_to: row.get(2)?,
                is_current: row.get(3)?,
                row_hash: row.get(4)?,
            })
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

fn table_exists(path: &Path, table: &str) -> bool {
    let conn = Connection::open(path).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        == 1
}

/// Keys that have more than one current row.
fn multi_current_keys(conn: &Connection, table: &str, key_field: &str) -> Vec<String> {
    let sql = format!(
        "SELECT {key_field} FROM {table} WHERE is_current = 1 GROUP BY {key_field} HAVING COUNT(*) > 1"
    );
    let mut stmt = conn.prepare(&sql).unwrap();
    let keys = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap();
    keys
}

// ============================================================================
// SCD2 upserts
// ============================================================================

#[test]
fn accounts_scenario() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store
        .ensure_entity_table("accounts", &["account_id"], &["balance"])
        .unwrap();

    let inserted = store
        .upsert("accounts", vec![account("A1", "100")], &["account_id"], None)
        .unwrap();
    assert_eq!(inserted, 1);
    let conn = reader(&dir);
    let rows = versions(&conn, "accounts", "account_id", "A1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].is_current, 1);
    assert_eq!(rows[0].valid_to, OPEN_ENDED_VALID_TO);

    let again = store
        .upsert("accounts", vec![account("A1", "100")], &["account_id"], None)
        .unwrap();
    assert_eq!(again, 0);

    let changed = store
        .upsert("accounts", vec![account("A1", "200")], &["account_id"], None)
        .unwrap();
    assert_eq!(changed, 1);

    let rows = versions(&conn, "accounts", "account_id", "A1");
    assert_eq!(rows.len(), 2);
    assert!(rows[0].id < rows[1].id);
    assert_eq!(rows[0].is_current, 0);
    assert_eq!(rows[1].is_current, 1);
    assert_eq!(rows[0].valid_to, rows[1].valid_from);
    assert_eq!(rows[1].valid_to, OPEN_ENDED_VALID_TO);
    assert_ne!(rows[0].row_hash, rows[1].row_hash);
}

#[test]
fn identical_batch_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let batch = || {
        vec![
            account("A1", "100"),
            account("A2", "250"),
            account("A3", "0"),
        ]
    };

    assert_eq!(store.upsert("accounts", batch(), &["account_id"], None).unwrap(), 3);
    let conn = reader(&dir);
    let before = row_count(&conn, "accounts");

    assert_eq!(store.upsert("accounts", batch(), &["account_id"], None).unwrap(), 0);
    assert_eq!(row_count(&conn, "accounts"), before);
}

#[test]
fn empty_batch_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let inserted = store
        .upsert("never_created", Vec::<Record>::new(), &["id_field"], None)
        .unwrap();
    assert_eq!(inserted, 0);
    assert!(!table_exists(&dir.path().join("histo.db"), "never_created"));
}

#[test]
fn equal_attributes_share_a_hash_across_keys() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store
        .upsert(
            "accounts",
            vec![account("A1", "100"), account("B9", "100"), account("C3", "101")],
            &["account_id"],
            None,
        )
        .unwrap();

    let conn = reader(&dir);
    let a = &versions(&conn, "accounts", "account_id", "A1")[0];
    let b = &versions(&conn, "accounts", "account_id", "B9")[0];
    let c = &versions(&conn, "accounts", "account_id", "C3")[0];
    assert_eq!(a.row_hash, b.row_hash);
    assert_ne!(a.row_hash, c.row_hash);
    assert_eq!(a.row_hash.len(), 64);
}

#[test]
fn batch_with_missing_key_is_rolled_back_entirely() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store
        .ensure_entity_table("accounts", &["account_id"], &["balance"])
        .unwrap();

    let batch = vec![
        account("A1", "100"),
        account("A2", "200"),
        account("A3", "300"),
        Record::new().with("balance", "400"),
    ];
    let err = store
        .upsert("accounts", batch, &["account_id"], Some(["balance"].as_slice()))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Upsert(UpsertError::MissingKeyField { index: 3, ref field }) if field == "account_id"
    ));

    let conn = reader(&dir);
    assert_eq!(row_count(&conn, "accounts"), 0);
}

#[test]
fn inferred_batch_with_missing_key_reports_the_key() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let batch = vec![
        account("A1", "100"),
        account("A2", "200"),
        account("A3", "300"),
        Record::new().with("balance", "400"),
    ];
    let err = store.upsert("accounts", batch, &["account_id"], None).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Upsert(UpsertError::MissingKeyField { index: 3, ref field }) if field == "account_id"
    ));
    assert!(!table_exists(&dir.path().join("histo.db"), "accounts"));
}

#[test]
fn failed_first_batch_leaves_no_table_behind() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let batch = vec![
        account("A1", "100"),
        Record::new()
            .with("account_id", histo_core::FieldValue::Null)
            .with("balance", "5"),
    ];
    let err = store
        .upsert("fresh_accounts", batch, &["account_id"], None)
        .unwrap_err();
    assert!(matches!(err, StoreError::Upsert(UpsertError::NullKeyField { index: 1, .. })));
    assert!(!table_exists(&dir.path().join("histo.db"), "fresh_accounts"));
}

#[test]
fn inferred_fields_must_stay_consistent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let batch = vec![
        Record::new().with("tx_id", "t1").with("amount", "10").with("currency", "KRW"),
        Record::new().with("tx_id", "t2").with("amount", "20"),
    ];
    let err = store.upsert("transactions", batch, &["tx_id"], None).unwrap_err();
    match err {
        StoreError::Upsert(UpsertError::InconsistentFields { index, expected, found }) => {
            assert_eq!(index, 1);
            assert_eq!(expected, "amount, currency, tx_id");
            assert_eq!(found, "amount, tx_id");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn explicit_attributes_tolerate_missing_and_extra_fields() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let batch = vec![
        Record::new().with("tx_id", "t1").with("amount", "10").with("ignored", "x"),
        Record::new().with("tx_id", "t2"),
    ];
    let inserted = store
        .upsert("transactions", batch, &["tx_id"], Some(["amount", "currency"].as_slice()))
        .unwrap();
    assert_eq!(inserted, 2);

    let conn = reader(&dir);
    let nulls: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM transactions WHERE currency IS NULL",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(nulls, 2);
}

#[test]
fn composite_keys_version_independently() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let rec = |branch: &str, id: &str, balance: &str| {
        Record::new()
            .with("branch", branch)
            .with("account_id", id)
            .with("balance", balance)
    };

    store
        .upsert(
            "branch_accounts",
            vec![rec("seoul", "A1", "1"), rec("busan", "A1", "1")],
            &["branch", "account_id"],
            None,
        )
        .unwrap();
    let inserted = store
        .upsert(
            "branch_accounts",
            vec![rec("seoul", "A1", "2"), rec("busan", "A1", "1")],
            &["branch", "account_id"],
            None,
        )
        .unwrap();
    assert_eq!(inserted, 1);

    let conn = reader(&dir);
    assert_eq!(row_count(&conn, "branch_accounts"), 3);
    let current: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM branch_accounts WHERE is_current = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(current, 2);
}

#[test]
fn repeated_key_within_one_batch_chains_versions() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let inserted = store
        .upsert(
            "accounts",
            vec![account("A1", "1"), account("A1", "2"), account("A1", "2")],
            &["account_id"],
            None,
        )
        .unwrap();
    assert_eq!(inserted, 2);

    let conn = reader(&dir);
    let rows = versions(&conn, "accounts", "account_id", "A1");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].is_current, 0);
    assert_eq!(rows[1].is_current, 1);
}

// ============================================================================
// History log
// ============================================================================

#[test]
fn fetch_recent_returns_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let stamps = [
        "2025-06-14T08:00:00.000000+00:00",
        "2025-06-14T08:01:00.000000+00:00",
        "2025-06-14T08:02:00.000000+00:00",
    ];
    let mut ids = Vec::new();
    for (i, ts) in stamps.iter().enumerate() {
        let event = NewHistoryEvent::new(format!("job-{i}"), EventType::Start, "running")
            .started_at(*ts);
        ids.push(store.log_event(&event).unwrap());
    }
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let recent = store.fetch_recent(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, ids[2]);
    assert_eq!(recent[0].job_name, "job-2");
    assert_eq!(recent[1].id, ids[1]);
    assert_eq!(recent[1].started_at.as_deref(), Some(stamps[1]));
}

#[test]
fn history_round_trips_all_columns() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let event = NewHistoryEvent::new("fetch_transactions", EventType::Success, "ok")
        .started_at("2025-06-14T08:00:00.000000+00:00")
        .ended_at("2025-06-14T08:00:01.500000+00:00")
        .duration_ms(1500)
        .row_count(5)
        .details(json!({ "source": "mock", "table": "transactions" }));
    let id = store.log_event(&event).unwrap();

    let got = &store.fetch_recent(10).unwrap()[0];
    assert_eq!(got.id, id);
    assert_eq!(got.event_type, "success");
    assert_eq!(got.status, "ok");
    assert_eq!(got.duration_ms, Some(1500));
    assert_eq!(got.row_count, Some(5));
    assert_eq!(
        got.details_json(),
        Some(json!({ "source": "mock", "table": "transactions" }))
    );
}

#[test]
fn started_at_defaults_to_now_and_text_details_stay_plain() {
    let store = VersionedStore::open_in_memory().unwrap();
    let event = NewHistoryEvent::new("job", EventType::Failure, "error")
        .details(HistoryDetails::from("connection reset"));
    store.log_event(&event).unwrap();

    let got = &store.fetch_recent(1).unwrap()[0];
    assert!(got.started_at.as_deref().is_some_and(|s| s.ends_with("+00:00")));
    assert_eq!(got.details.as_deref(), Some("connection reset"));
    assert!(got.ended_at.is_none());
}

#[test]
fn history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir);
        store
            .log_event(&NewHistoryEvent::new("job", EventType::Start, "running"))
            .unwrap();
        store.close().unwrap();
    }
    let store = open_store(&dir);
    assert_eq!(store.fetch_recent(50).unwrap().len(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_upserts_keep_one_current_row_per_key() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_store(&dir));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..10 {
                    let batch: Vec<Record> = (0..5)
                        .map(|k| account(&format!("A{k}"), &format!("{}", (worker + round) % 3)))
                        .collect();
                    store.upsert("accounts", batch, &["account_id"], None).unwrap();
                    store
                        .log_event(&NewHistoryEvent::new(
                            format!("worker-{worker}"),
                            EventType::Success,
                            "ok",
                        ))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = reader(&dir);
    assert!(multi_current_keys(&conn, "accounts", "account_id").is_empty());
    let current: i64 = conn
        .query_row("SELECT COUNT(*) FROM accounts WHERE is_current = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(current, 5);
    assert_eq!(store.fetch_recent(1000).unwrap().len(), 80);
}
