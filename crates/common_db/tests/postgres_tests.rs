//! PostgreSQL integration tests
//!
//! Run with `cargo test -p common_db -- --ignored` on a machine with Docker.

use common_db::{ConnectionManager, DatabaseError, ManagerState, PoolSettings};
use test_utils::db_test;

db_test!(test_connects_lazily_and_reuses_pool, |manager| {
    assert_eq!(manager.state().await, ManagerState::Uninitialized);

    let first = manager.get_connection().await.unwrap().transport_id();
    let second = manager.get_connection().await.unwrap().transport_id();

    assert_eq!(first, second);
    assert_eq!(manager.state().await, ManagerState::Ready);
});

db_test!(test_execute_reports_rows_affected, |manager| {
    manager
        .execute("CREATE TABLE IF NOT EXISTS exec_rows (id SERIAL PRIMARY KEY, note TEXT)")
        .await
        .unwrap();

    let rows = manager
        .execute("INSERT INTO exec_rows (note) VALUES ('a'), ('b')")
        .await
        .unwrap();

    assert_eq!(rows, 2);
});

db_test!(test_bound_parameters_round_trip, |manager| {
    manager
        .execute("CREATE TABLE IF NOT EXISTS bound_runs (id SERIAL PRIMARY KEY, label TEXT)")
        .await
        .unwrap();

    let inserted = manager
        .execute_with(
            sqlx::query("INSERT INTO bound_runs (label) VALUES ($1), ($2)")
                .bind("nightly")
                .bind("o'brien"),
        )
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let labels: Vec<(String,)> = manager
        .fetch_all(
            sqlx::query_as("SELECT label FROM bound_runs WHERE label = ANY($1) ORDER BY label")
                .bind(vec!["nightly".to_string(), "o'brien".to_string()]),
        )
        .await
        .unwrap();
    assert_eq!(labels, vec![("nightly".to_string(),), ("o'brien".to_string(),)]);
});

db_test!(test_fetch_optional_returns_generated_key, |manager| {
    manager
        .execute("CREATE TABLE IF NOT EXISTS keyed_runs (id SERIAL PRIMARY KEY, label TEXT)")
        .await
        .unwrap();

    let created: Option<(i32,)> = manager
        .fetch_optional(
            sqlx::query_as("INSERT INTO keyed_runs (label) VALUES ($1) RETURNING id")
                .bind("weekly"),
        )
        .await
        .unwrap();
    let id = created.unwrap().0;

    let missing: Option<(String,)> = manager
        .fetch_optional(
            sqlx::query_as("SELECT label FROM keyed_runs WHERE id = $1").bind(id + 1000),
        )
        .await
        .unwrap();
    assert!(missing.is_none());
});

db_test!(test_transaction_commits_on_success, |manager| {
    manager
        .execute("CREATE TABLE IF NOT EXISTS tx_commit (id INT PRIMARY KEY)")
        .await
        .unwrap();

    manager
        .with_transaction(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO tx_commit (id) VALUES (1) ON CONFLICT DO NOTHING")
                    .execute(&mut *tx)
                    .await
                    .map_err(DatabaseError::from)?;
                Ok::<_, DatabaseError>(())
            })
        })
        .await
        .unwrap();

    let count: i64 = manager
        .with_connection(|conn| {
            Box::pin(async move {
                let row: (i64,) = sqlx::query_as("SELECT count(*) FROM tx_commit")
                    .fetch_one(&mut ***conn)
                    .await
                    .map_err(DatabaseError::from)?;
                Ok::<_, DatabaseError>(row.0)
            })
        })
        .await
        .unwrap();
    assert_eq!(count, 1);
});

db_test!(test_transaction_rolls_back_on_error, |manager| {
    manager
        .execute("CREATE TABLE IF NOT EXISTS tx_rollback (id INT PRIMARY KEY)")
        .await
        .unwrap();

    let result = manager
        .with_transaction(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO tx_rollback (id) VALUES (7)")
                    .execute(&mut *tx)
                    .await
                    .map_err(DatabaseError::from)?;
                Err::<(), _>(DatabaseError::QueryFailed("abort after insert".to_string()))
            })
        })
        .await;
    assert!(result.is_err());

    let rows = manager.execute("DELETE FROM tx_rollback WHERE id = 7").await.unwrap();
    assert_eq!(rows, 0);
});

db_test!(test_sql_errors_surface_as_query_failures, |manager| {
    let err = manager.execute("SELEC 1").await.unwrap_err();

    assert!(!err.is_connection_error());
    assert_eq!(manager.state().await, ManagerState::Ready);
});

#[tokio::test]
#[ignore = "requires docker"]
async fn test_saturated_pool_keeps_transport() {
    let db = test_utils::get_shared_test_database().await;
    let settings = PoolSettings {
        pool_min: 1,
        pool_max: 1,
        pool_timeout: 5,
        ..db.settings()
    };
    let manager = ConnectionManager::init(settings);

    let held = manager.get_connection().await.unwrap();
    let err = manager.get_connection().await.unwrap_err();

    assert!(matches!(err, DatabaseError::PoolExhausted));
    let status = manager.status().await;
    assert_eq!(status.reconnects, 0);
    assert_eq!(status.transport_id, Some(held.transport_id()));

    let id = held.transport_id();
    drop(held);
    assert_eq!(manager.get_connection().await.unwrap().transport_id(), id);
    manager.shutdown().await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_wrong_password_is_not_retried() {
    let db = test_utils::get_shared_test_database().await;
    let settings = PoolSettings {
        password: "definitely-wrong".to_string(),
        ..db.settings()
    };
    let manager = ConnectionManager::init(settings);

    let err = manager.get_connection().await.unwrap_err();

    assert!(err.is_configuration_error());
    assert_eq!(manager.state().await, ManagerState::Uninitialized);
}

#[tokio::test]
#[ignore = "requires network"]
async fn test_unreachable_host_exhausts_retries() {
    let settings = PoolSettings {
        host: Some("127.0.0.1".to_string()),
        port: 1,
        user: Some("nobody".to_string()),
        name: Some("nothing".to_string()),
        pool_timeout: 5,
        retry_attempts: 2,
        retry_backoff_ms: 10,
        retry_backoff_max_ms: 10,
        ..PoolSettings::default()
    };
    let manager = ConnectionManager::init(settings);

    let err = manager.get_connection().await.unwrap_err();

    assert!(matches!(err, DatabaseError::ConnectionUnavailable { attempts: 2, .. }));
    assert_eq!(manager.state().await, ManagerState::Failed);
}
