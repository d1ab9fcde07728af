//! Database Test Utilities
//!
//! Provides a disposable PostgreSQL testcontainer and connection managers
//! pointed at it for integration tests.

use std::sync::Arc;

use common_db::{ConnectionManager, PoolSettings};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::OnceCell;

/// Default PostgreSQL image for testing
const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "common_test";

/// A wrapper around a PostgreSQL test container
pub struct TestDatabase {
    container: ContainerAsync<GenericImage>,
    host: String,
    port: u16,
}

impl TestDatabase {
    /// Starts a new PostgreSQL container for testing
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432.tcp()).await?;
        let host = container.get_host().await?.to_string();

        Ok(Self { container, host, port })
    }

    /// Settings pointing at the container, as if read from `DB_*`
    pub fn settings(&self) -> PoolSettings {
        PoolSettings {
            host: Some(self.host.clone()),
            port: self.port,
            user: Some(POSTGRES_USER.to_string()),
            password: POSTGRES_PASSWORD.to_string(),
            name: Some(POSTGRES_DB.to_string()),
            pool_min: 1,
            pool_max: 5,
            ..PoolSettings::default()
        }
    }

    /// A fresh PostgreSQL connection manager for the container
    pub fn manager(&self) -> ConnectionManager {
        ConnectionManager::init(self.settings())
    }

    /// Container id, for diagnostics when a test fails
    pub fn container_id(&self) -> &str {
        self.container.id()
    }
}

/// Global test database for shared integration tests
static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// Gets or creates a shared test database instance
///
/// # Panics
///
/// Panics if the container fails to start
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to start shared test database"),
            )
        })
        .await
        .clone()
}

/// Helper macro for tests that need a live PostgreSQL manager
///
/// Binds `manager` to a fresh [`ConnectionManager`] against the shared
/// container and shuts it down after the body runs.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$manager:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires docker"]
        async fn $name() {
            let db = $crate::database::get_shared_test_database().await;
            let $manager = db.manager();
            $body
            $manager.shutdown().await;
        }
    };
}
