//! SQLite-backed persistence with monotonic observation-window merges

use rekuper_core::{Error, ObservationWindow, RecordPayload, ResourceKind, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// A session ties a CI job to the version it reported when first seen.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub jenkins_job: String,
    pub sat_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
}

/// A tracked resource (instance or container) and its observation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRecord {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    pub image: String,
    pub session_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    pub first_seen: Option<i64>,
    pub last_seen: Option<i64>,
}

/// The record store. The single connection behind a mutex serializes every
/// lookup-merge-write sequence, which is what makes the upsert atomic per
/// entity under concurrent pushes.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create or merge one entity record.
    ///
    /// Required fields are checked before any mutation. The session is
    /// resolved (or lazily created) by CI job identity, then the entity is
    /// looked up by its unique name: absent means create with the supplied
    /// window, present means merge. `first_seen` is only lowered and
    /// `last_seen` only raised; display attributes are overwritten with the
    /// latest observed values. The whole sequence runs in one transaction.
    pub fn upsert(&self, kind: ResourceKind, payload: &RecordPayload) -> Result<EntityRecord> {
        let name = required(payload.name.as_deref(), "name")?;
        let image = required(payload.image.as_deref(), "image")?;
        let jenkins_url = required(payload.jenkins_url.as_deref(), "jenkins_url")?;

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let session_id =
            get_or_create_session(&tx, jenkins_url, payload.job_sat_version.as_deref())?;
        let project_id = match (kind, payload.project.as_deref()) {
            (ResourceKind::Instance, Some(project)) => Some(get_or_create_project(&tx, project)?),
            _ => None,
        };

        let table = table_name(kind);
        let record = match find_by_name(&tx, table, name)? {
            Some(existing) => {
                let mut window = ObservationWindow {
                    first_seen: existing.first_seen,
                    last_seen: existing.last_seen,
                };
                window.merge(ObservationWindow {
                    first_seen: payload.first_seen,
                    last_seen: payload.last_seen,
                });
                debug!(
                    name,
                    old_first = ?existing.first_seen,
                    old_last = ?existing.last_seen,
                    new_first = ?window.first_seen,
                    new_last = ?window.last_seen,
                    "merging observation window"
                );
                tx.execute(
                    &format!(
                        "UPDATE {table}
                         SET flavor = ?1, image = ?2, session_id = ?3, project_id = ?4,
                             first_seen = ?5, last_seen = ?6
                         WHERE id = ?7"
                    ),
                    params![
                        payload.flavor,
                        image,
                        session_id,
                        project_id,
                        window.first_seen,
                        window.last_seen,
                        existing.id
                    ],
                )
                .map_err(db_err)?;
                EntityRecord {
                    id: existing.id,
                    name: name.to_string(),
                    flavor: payload.flavor.clone(),
                    image: image.to_string(),
                    session_id,
                    project_id,
                    first_seen: window.first_seen,
                    last_seen: window.last_seen,
                }
            }
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {table}
                         (name, flavor, image, session_id, project_id, first_seen, last_seen)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                    ),
                    params![
                        name,
                        payload.flavor,
                        image,
                        session_id,
                        project_id,
                        payload.first_seen,
                        payload.last_seen
                    ],
                )
                .map_err(db_err)?;
                EntityRecord {
                    id: tx.last_insert_rowid(),
                    name: name.to_string(),
                    flavor: payload.flavor.clone(),
                    image: image.to_string(),
                    session_id,
                    project_id,
                    first_seen: payload.first_seen,
                    last_seen: payload.last_seen,
                }
            }
        };

        tx.commit().map_err(db_err)?;
        Ok(record)
    }

    pub fn list(&self, kind: ResourceKind) -> Result<Vec<EntityRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, name, flavor, image, session_id, project_id, first_seen, last_seen
                 FROM {} ORDER BY name",
                table_name(kind)
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_record).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, jenkins_job, sat_version FROM sessions ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    jenkins_job: row.get(1)?,
                    sat_version: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM projects ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProjectRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("store mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            jenkins_job TEXT NOT NULL UNIQUE,
            sat_version TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS instances (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            flavor TEXT,
            image TEXT NOT NULL,
            session_id INTEGER NOT NULL REFERENCES sessions(id),
            project_id INTEGER REFERENCES projects(id),
            first_seen INTEGER,
            last_seen INTEGER
        );
        CREATE TABLE IF NOT EXISTS containers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            flavor TEXT,
            image TEXT NOT NULL,
            session_id INTEGER NOT NULL REFERENCES sessions(id),
            project_id INTEGER REFERENCES projects(id),
            first_seen INTEGER,
            last_seen INTEGER
        );
        ",
    )
    .map_err(db_err)
}

fn table_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Instance => "instances",
        ResourceKind::Container => "containers",
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("{field} is required"))),
    }
}

/// Session lookup is by job identity alone. A job re-reporting a different
/// version is kept as first-write-wins; the mismatch is logged rather than
/// reconciled because the submitted history does not say which one is right.
fn get_or_create_session(
    tx: &Transaction<'_>,
    jenkins_job: &str,
    submitted_version: Option<&str>,
) -> Result<i64> {
    let existing: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, sat_version FROM sessions WHERE jenkins_job = ?1",
            params![jenkins_job],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;

    if let Some((id, stored_version)) = existing {
        if let Some(submitted) = submitted_version {
            if submitted != stored_version {
                warn!(
                    jenkins_job,
                    stored = %stored_version,
                    submitted,
                    "session version mismatch, keeping first-submitted value"
                );
            }
        }
        return Ok(id);
    }

    let Some(version) = submitted_version else {
        return Err(Error::Validation("job_sat_version is required".into()));
    };
    info!(jenkins_job, version, "creating session record");
    tx.execute(
        "INSERT INTO sessions (jenkins_job, sat_version) VALUES (?1, ?2)",
        params![jenkins_job, version],
    )
    .map_err(db_err)?;
    Ok(tx.last_insert_rowid())
}

fn get_or_create_project(tx: &Transaction<'_>, name: &str) -> Result<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM projects WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute("INSERT INTO projects (name) VALUES (?1)", params![name])
        .map_err(db_err)?;
    Ok(tx.last_insert_rowid())
}

fn find_by_name(tx: &Transaction<'_>, table: &str, name: &str) -> Result<Option<EntityRecord>> {
    tx.query_row(
        &format!(
            "SELECT id, name, flavor, image, session_id, project_id, first_seen, last_seen
             FROM {table} WHERE name = ?1"
        ),
        params![name],
        row_to_record,
    )
    .optional()
    .map_err(db_err)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRecord> {
    Ok(EntityRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        flavor: row.get(2)?,
        image: row.get(3)?,
        session_id: row.get(4)?,
        project_id: row.get(5)?,
        first_seen: row.get(6)?,
        last_seen: row.get(7)?,
    })
}

fn db_err(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(code, _) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::Conflict(err.to_string());
        }
    }
    Error::Internal(err.to_string())
}
