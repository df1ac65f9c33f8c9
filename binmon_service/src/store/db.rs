/// Postgres-backed store for users, assignments, level history, and notifications.
///
/// Schema lives in `sql/001_base_schema.sql`. Level history and notifications
/// are append-only; this module never issues an UPDATE or DELETE.
///
/// `postgres::Client` needs `&mut self` for every query, so the client sits
/// behind a mutex and concurrent lookups from the resolver are serialized
/// on the connection.

use std::env;
use std::sync::{Mutex, PoisonError};

use postgres::{Client, NoTls};
use serde_json::Value;

use crate::model::{BinAssignment, BinError, Record, Role, User};
use crate::store::{AssignmentStore, PersistenceSink, UserStore};

/// Tables the service reads from or appends to.
pub const REQUIRED_TABLES: &[&str] =
    &["users", "bin_assignments", "trash_levels", "new_notifications"];

impl From<postgres::Error> for BinError {
    fn from(e: postgres::Error) -> Self {
        BinError::Transient(format!("database error: {}", e))
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Connects using `DATABASE_URL` from the environment or `.env`.
pub fn connect() -> Result<Client, BinError> {
    dotenv::dotenv().ok();
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| BinError::Config("DATABASE_URL must be set".to_string()))?;
    Client::connect(&database_url, NoTls).map_err(BinError::from)
}

/// Connects and checks that every table in `tables` exists in the public schema.
///
/// The error names the missing tables and the migration that creates them.
pub fn connect_and_verify(tables: &[&str]) -> Result<Client, BinError> {
    let mut client = connect()?;

    let mut missing = Vec::new();
    for table in tables {
        let row = client.query_one(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.tables
                 WHERE table_schema = 'public' AND table_name = $1
             )",
            &[table],
        )?;
        let exists: bool = row.get(0);
        if !exists {
            missing.push(*table);
        }
    }

    if !missing.is_empty() {
        return Err(BinError::Config(format!(
            "missing tables: {} (apply sql/001_base_schema.sql)",
            missing.join(", ")
        )));
    }

    Ok(client)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct PgStore {
    client: Mutex<Client>,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        PgStore {
            client: Mutex::new(client),
        }
    }

    fn client(&self) -> std::sync::MutexGuard<'_, Client> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn user_from_row(row: &postgres::Row) -> User {
    let role: String = row.get(4);
    User {
        user_id: row.get(0),
        first_name: row.get(1),
        last_name: row.get(2),
        contact_number: row.get(3),
        role: Role::parse(&role),
    }
}

impl UserStore for PgStore {
    fn users_with_role(&self, role: Role) -> Result<Vec<User>, BinError> {
        let rows = self.client().query(
            "SELECT user_id, first_name, last_name, contact_number, role
             FROM users
             WHERE role = $1
             ORDER BY created_at, user_id",
            &[&role.as_str()],
        )?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    fn user(&self, user_id: &str) -> Result<Option<User>, BinError> {
        let row = self.client().query_opt(
            "SELECT user_id, first_name, last_name, contact_number, role
             FROM users
             WHERE user_id = $1",
            &[&user_id],
        )?;
        Ok(row.as_ref().map(user_from_row))
    }
}

impl AssignmentStore for PgStore {
    fn assignments_for(&self, bin_id: &str) -> Result<Vec<BinAssignment>, BinError> {
        let rows = self.client().query(
            "SELECT bin_id, assignee
             FROM bin_assignments
             WHERE bin_id = $1
             ORDER BY id",
            &[&bin_id],
        )?;
        Ok(rows
            .iter()
            .map(|row| BinAssignment {
                bin_id: row.get(0),
                assignees: row.get(1),
            })
            .collect())
    }
}

impl PersistenceSink for PgStore {
    fn append(&self, record: &Record) -> Result<(), BinError> {
        let result = match record {
            Record::Level(level) => self.client().execute(
                "INSERT INTO trash_levels (bin_id, trash_level, created_at)
                 VALUES ($1, $2, $3)",
                &[
                    &level.bin_id,
                    &(level.level_percent as i16),
                    &level.computed_at,
                ],
            ),
            Record::Notification(event) => {
                let (gps, recipients) = jsonb_columns(&record.to_document());
                self.client().execute(
                    "INSERT INTO new_notifications (bin_id, trash_level, gps, recipients, datetime)
                     VALUES ($1, $2, $3, $4, $5)",
                    &[
                        &event.bin_id,
                        &(event.level_percent as i16),
                        &gps,
                        &recipients,
                        &event.fired_at,
                    ],
                )
            }
        };

        result.map(|_| ()).map_err(|e| BinError::Sink {
            sink: "persistence",
            reason: format!(
                "append to {} for bin {} failed: {}",
                record.collection(),
                record.bin_id(),
                e
            ),
        })
    }
}

/// The `gps` and `recipients` JSONB values of a notification document.
///
/// A missing or `null` GPS fix becomes SQL NULL; recipients are always an array.
fn jsonb_columns(document: &Value) -> (Option<Value>, Value) {
    let gps = document.get("gps").filter(|g| !g.is_null()).cloned();
    let recipients = match document.get("recipients") {
        Some(list @ Value::Array(_)) => list.clone(),
        _ => Value::Array(Vec::new()),
    };
    (gps, recipients)
}
