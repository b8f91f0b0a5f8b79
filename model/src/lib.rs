//! Data model for the user graph GraphQL facade.
//!
//! The facade owns no data. Every entity lives in an external REST store
//! ([`store`]), and the GraphQL schema ([`schema`]) resolves each field with a
//! single pass-through HTTP call against it.

use tracing_subscriber::EnvFilter;

pub mod schema;
pub mod store;

#[cfg(feature = "testing")]
pub mod testing;

/// Initialize logging for a server or test process.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
