//! Persistent token registry backed by `SQLite`.
//!
//! The `services` table has columns `token` (primary key) and
//! `service_name` (unique). Both constraints are enforced by the store, so
//! concurrent registrations of the same name are serialised there and never
//! by a check-then-insert in this process.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::{Error, Result};
use crate::token;
use crate::types::ServiceRegistration;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS services (
    token TEXT PRIMARY KEY NOT NULL,
    service_name TEXT NOT NULL UNIQUE
)";

/// Attempts made when a freshly drawn token collides with an existing one.
const MAX_TOKEN_ATTEMPTS: usize = 3;

/// Handle to the registration store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Registry {
    conn: Arc<Mutex<Connection>>,
}

impl Registry {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!("Opened registry database at {}", path.display());
        Self::with_connection(conn)
    }

    /// Registry that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("registry connection lock poisoned".into()))
    }

    /// Registers `service_name` under a fresh token and returns the token.
    pub fn register(&self, service_name: &str) -> Result<String> {
        self.register_with(service_name, token::generate)
    }

    fn register_with(
        &self,
        service_name: &str,
        mut next_token: impl FnMut() -> String,
    ) -> Result<String> {
        if service_name.trim().is_empty() {
            return Err(Error::InvalidInput("service name must not be empty".into()));
        }

        let conn = self.lock()?;
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = next_token();
            let inserted = conn.execute(
                "INSERT INTO services (token, service_name) VALUES (?1, ?2)",
                params![token, service_name],
            );
            match inserted {
                Ok(_) => {
                    info!("Registered service {}", service_name);
                    return Ok(token);
                }
                Err(e) => match unique_violation_column(&e) {
                    Some("service_name") => {
                        return Err(Error::DuplicateService(service_name.to_string()))
                    }
                    Some("token") => {
                        warn!("Token collision while registering {}, retrying", service_name);
                        continue;
                    }
                    _ => return Err(e.into()),
                },
            }
        }
        Err(Error::Internal(format!(
            "could not allocate a unique token for {service_name}"
        )))
    }

    /// Looks up the registration owning `token`.
    pub fn resolve(&self, token: &str) -> Result<ServiceRegistration> {
        if !token::is_valid_format(token) {
            return Err(Error::InvalidTokenFormat);
        }

        let conn = self.lock()?;
        conn.query_row(
            "SELECT token, service_name FROM services WHERE token = ?1",
            params![token],
            |row| {
                Ok(ServiceRegistration {
                    token: row.get(0)?,
                    service_name: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::NotFound("token".into()))
    }

    /// Deletes the registration for `service_name`.
    pub fn remove(&self, service_name: &str) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM services WHERE service_name = ?1",
            params![service_name],
        )?;
        match deleted {
            0 => Err(Error::NotFound(format!("service {service_name}"))),
            1 => {
                info!("Removed service {}", service_name);
                Ok(())
            }
            n => Err(Error::Internal(format!(
                "removing {service_name} deleted {n} rows"
            ))),
        }
    }

    /// Snapshot of every registration, ordered by service name.
    pub fn list(&self) -> Result<Vec<ServiceRegistration>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT token, service_name FROM services ORDER BY service_name")?;
        let rows = stmt.query_map([], |row| {
            Ok(ServiceRegistration {
                token: row.get(0)?,
                service_name: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

/// Column named by a `UNIQUE`/`PRIMARY KEY` violation, if `err` is one.
fn unique_violation_column(err: &rusqlite::Error) -> Option<&'static str> {
    let rusqlite::Error::SqliteFailure(failure, Some(message)) = err else {
        return None;
    };
    if failure.code != ErrorCode::ConstraintViolation {
        return None;
    }
    if message.contains("services.service_name") {
        Some("service_name")
    } else if message.contains("services.token") {
        Some("token")
    } else {
        None
    }
}
