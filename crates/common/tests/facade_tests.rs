//! Facade tests
//!
//! Exercise the caller-facing surface with the in-memory connector.

use common::{Common, CommonError, ConnectionManager, ManagerState, INTERFACE_VERSION};
use test_utils::{mock_pool_config, MockConnector};

fn facade(connector: MockConnector) -> Common<MockConnector> {
    Common::with_manager(ConnectionManager::with_config(mock_pool_config(3), connector))
}

#[test]
fn test_interface_version_is_semver() {
    let parts: Vec<&str> = INTERFACE_VERSION.split('.').collect();

    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
}

#[tokio::test]
async fn test_both_operations_through_facade() {
    let common = facade(MockConnector::new());

    let conn = common.get_connection().await.unwrap();
    let ts = common.to_timestamp(1_690_000_000i64).unwrap();

    assert_eq!(ts.to_rfc3339(), "2023-07-22T04:26:40Z");
    assert_eq!(common.connections().status().await.transport_id, Some(conn.transport_id()));
}

#[tokio::test]
async fn test_errors_wrapped_by_layer() {
    let common = facade(MockConnector::failing(10));

    let db_err = common.get_connection().await.unwrap_err();
    let ts_err = common.to_timestamp("yesterday").unwrap_err();

    assert!(matches!(db_err, CommonError::Database(_)));
    assert!(matches!(ts_err, CommonError::Timestamp(_)));
    assert_eq!(common.connections().state().await, ManagerState::Failed);
}

#[tokio::test]
async fn test_shutdown_through_facade() {
    let common = facade(MockConnector::new());
    drop(common.get_connection().await.unwrap());

    common.shutdown().await;
    common.shutdown().await;

    assert_eq!(common.connections().connector().close_count(), 1);
    assert!(common.get_connection().await.is_err());
}
