//! Target registry for HealthTrail.
//!
//! Provides SQLite storage for the set of monitored targets.

mod models;
mod store;

pub use models::*;
pub use store::*;

/// Persistent registry of monitored targets.
///
/// Only supports what the monitor needs: appending a target and reading the
/// whole set once at startup.
pub trait TargetRegistry: Send + Sync {
    /// Persist a newly registered target.
    fn insert_target(&self, target: &Target) -> Result<(), DbError>;

    /// Read every registered target, in registration order.
    fn find_targets(&self) -> Result<Vec<Target>, DbError>;
}
