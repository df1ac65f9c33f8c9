/// Storage capabilities the pipeline consumes.
///
/// The pipeline never talks to a database directly. It sees three narrow
/// capabilities, each implemented by both the Postgres store (`db`) and the
/// in-memory store (`memory`) used by tests and simulations.
///
/// Submodules:
/// - `db`     - Postgres-backed implementation for the daemon.
/// - `memory` - in-process implementation with failure injection.

pub mod db;
pub mod memory;

use crate::model::{BinAssignment, BinError, Record, Role, User};

/// Read access to registered users.
pub trait UserStore: Send + Sync {
    /// All users whose stored role is `role`, in storage order.
    fn users_with_role(&self, role: Role) -> Result<Vec<User>, BinError>;

    /// One user by id. `Ok(None)` when no such user exists.
    fn user(&self, user_id: &str) -> Result<Option<User>, BinError>;
}

/// Read access to bin-to-user assignments.
pub trait AssignmentStore: Send + Sync {
    /// Every assignment record for `bin_id`. Normally zero or one.
    fn assignments_for(&self, bin_id: &str) -> Result<Vec<BinAssignment>, BinError>;
}

/// Append-only write access for level history and notifications.
pub trait PersistenceSink: Send + Sync {
    fn append(&self, record: &Record) -> Result<(), BinError>;
}
