/// In-memory store for tests, simulations, and dry runs.
///
/// Implements every store capability over plain vectors behind a mutex.
/// Reads and appends can be made to fail on demand so the pipeline's
/// failure handling can be exercised without a database.

use std::sync::{Mutex, PoisonError};

use crate::model::{BinAssignment, BinError, Record, Role, User};
use crate::store::{AssignmentStore, PersistenceSink, UserStore};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    assignments: Vec<BinAssignment>,
    records: Vec<Record>,
    fail_reads: bool,
    fail_appends: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.lock().users.push(user);
    }

    pub fn add_assignment(&self, bin_id: &str, assignees: &[&str]) {
        self.lock().assignments.push(BinAssignment {
            bin_id: bin_id.to_string(),
            assignees: assignees.iter().map(|s| s.to_string()).collect(),
        });
    }

    /// Makes every user and assignment lookup fail with a transient error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Makes every append fail with a sink error.
    pub fn set_fail_appends(&self, fail: bool) {
        self.lock().fail_appends = fail;
    }

    /// Everything appended so far, in append order.
    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    /// Appended records belonging to `collection`.
    pub fn records_in(&self, collection: &str) -> Vec<Record> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.collection() == collection)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reads(inner: &Inner) -> Result<(), BinError> {
        if inner.fail_reads {
            return Err(BinError::Transient("memory store unavailable".to_string()));
        }
        Ok(())
    }
}

impl UserStore for MemoryStore {
    fn users_with_role(&self, role: Role) -> Result<Vec<User>, BinError> {
        let inner = self.lock();
        Self::check_reads(&inner)?;
        Ok(inner
            .users
            .iter()
            .filter(|u| u.role == Some(role))
            .cloned()
            .collect())
    }

    fn user(&self, user_id: &str) -> Result<Option<User>, BinError> {
        let inner = self.lock();
        Self::check_reads(&inner)?;
        Ok(inner.users.iter().find(|u| u.user_id == user_id).cloned())
    }
}

impl AssignmentStore for MemoryStore {
    fn assignments_for(&self, bin_id: &str) -> Result<Vec<BinAssignment>, BinError> {
        let inner = self.lock();
        Self::check_reads(&inner)?;
        Ok(inner
            .assignments
            .iter()
            .filter(|a| a.bin_id == bin_id)
            .cloned()
            .collect())
    }
}

impl PersistenceSink for MemoryStore {
    fn append(&self, record: &Record) -> Result<(), BinError> {
        let mut inner = self.lock();
        if inner.fail_appends {
            return Err(BinError::Sink {
                sink: "persistence",
                reason: format!("append to {} rejected", record.collection()),
            });
        }
        inner.records.push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
