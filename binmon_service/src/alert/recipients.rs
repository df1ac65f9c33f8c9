//! Who gets told when a bin is full.
//!
//! Every administrator is notified about every bin. On top of that, the
//! users assigned to the bin are notified, provided they still exist and
//! still hold the `user` role. Admins come first in storage order, then
//! assignees in the order the assignment lists them.
//!
//! Resolution fails soft: any lookup error yields an empty list and a log
//! line, never an error to the caller.

use crate::logging::{self, Component};
use crate::model::{BinError, Recipient, Role, User};
use crate::store::{AssignmentStore, UserStore};

/// Assignee lookups running at once, unless overridden.
pub const MAX_PARALLEL_LOOKUPS: usize = 4;

pub struct RecipientResolver<'a> {
    users: &'a dyn UserStore,
    assignments: &'a dyn AssignmentStore,
    max_parallel: usize,
}

impl<'a> RecipientResolver<'a> {
    pub fn new(users: &'a dyn UserStore, assignments: &'a dyn AssignmentStore) -> Self {
        RecipientResolver {
            users,
            assignments,
            max_parallel: MAX_PARALLEL_LOOKUPS,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Admins followed by assigned users for `bin_id`. Empty on any lookup failure.
    pub fn resolve(&self, bin_id: &str) -> Vec<Recipient> {
        match self.try_resolve(bin_id) {
            Ok(recipients) => recipients,
            Err(e) => {
                logging::log_failure(Component::Resolver, bin_id, "Recipient resolution", &e);
                Vec::new()
            }
        }
    }

    fn try_resolve(&self, bin_id: &str) -> Result<Vec<Recipient>, BinError> {
        let mut recipients: Vec<Recipient> = self
            .users
            .users_with_role(Role::Admin)?
            .iter()
            .map(|u| Recipient::from_user(u, Role::Admin))
            .collect();

        let assignments = self.assignments.assignments_for(bin_id)?;
        let Some(assignment) = assignments.first() else {
            logging::debug(Component::Resolver, Some(bin_id), "No assignment found");
            return Ok(recipients);
        };
        if assignments.len() > 1 {
            logging::warn(
                Component::Resolver,
                Some(bin_id),
                &format!(
                    "{} assignment records found, using the first",
                    assignments.len()
                ),
            );
        }
        if assignment.assignees.is_empty() {
            logging::debug(Component::Resolver, Some(bin_id), "Assignment has no assignees");
            return Ok(recipients);
        }

        for user in self.fetch_users(&assignment.assignees)?.into_iter().flatten() {
            if user.role == Some(Role::User) {
                recipients.push(Recipient::from_user(&user, Role::User));
            }
        }

        Ok(recipients)
    }

    /// Looks up ids concurrently, `max_parallel` at a time. Results are in
    /// the same order as `ids`.
    fn fetch_users(&self, ids: &[String]) -> Result<Vec<Option<User>>, BinError> {
        let users = self.users;
        let mut found = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.max_parallel.max(1)) {
            let results: Vec<Result<Option<User>, BinError>> = std::thread::scope(|s| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|id| s.spawn(move || users.user(id)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(BinError::Transient("user lookup panicked".to_string()))
                        })
                    })
                    .collect()
            });
            for result in results {
                found.push(result?);
            }
        }

        Ok(found)
    }
}

/// Convenience wrapper over `RecipientResolver::resolve`.
pub fn resolve_recipients(
    users: &dyn UserStore,
    assignments: &dyn AssignmentStore,
    bin_id: &str,
) -> Vec<Recipient> {
    RecipientResolver::new(users, assignments).resolve(bin_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
