//! Test Utilities Crate
//!
//! Provides shared test infrastructure for the common library test suite.
//!
//! # Modules
//!
//! - `connectors`: in-memory connector that simulates outages and tracks sessions
//! - `database`: PostgreSQL testcontainer management
//! - `generators`: property-based test data generators

pub mod connectors;
pub mod database;
pub mod generators;

pub use connectors::*;
pub use database::*;
pub use generators::*;
