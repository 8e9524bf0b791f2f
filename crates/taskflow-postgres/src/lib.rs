//! taskflow-postgres — PostgreSQL implementations of the taskflow-types
//! port traits.

pub mod store;

pub use store::{PgConsumerRegistry, PgTaskStore};

use sqlx::PgPool;

/// Convenience struct that constructs both Postgres adapters from a single
/// pool, mirroring the teacher's `PgStores` aggregator.
pub struct PgStores {
    pub tasks: PgTaskStore,
    pub consumers: PgConsumerRegistry,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tasks: PgTaskStore::new(pool.clone()),
            consumers: PgConsumerRegistry::new(pool),
        }
    }
}
