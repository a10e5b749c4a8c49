use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::normalize::OrganizationRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub inserted: usize,
    /// Records already present under the uniqueness constraint.
    pub duplicates: usize,
    pub rejected: usize,
}

/// SQLite-backed organization table. Each operation opens its own connection
/// and drops it before returning.
#[derive(Debug, Clone)]
pub struct OrganizationStore {
    path: PathBuf,
}

impl OrganizationStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_schema(&self) -> AppResult<()> {
        let connection = self.open()?;
        run_migrations(&connection)?;
        info!(
            target: "database_bootstrap",
            path = %self.path.display(),
            "organizations schema ready"
        );
        Ok(())
    }

    /// Inserts every record that is not already stored. Existing rows are left
    /// untouched; bad records are logged and skipped without failing the batch.
    pub fn save(&self, records: &[OrganizationRecord]) -> AppResult<SaveSummary> {
        let mut summary = SaveSummary::default();
        if records.is_empty() {
            info!(target: "database", "nothing to save");
            return Ok(summary);
        }

        let mut connection = self.open()?;
        let tx = connection.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO organizations (name, address, lat, lon, type)
                VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                if let Err(err) = validate(record) {
                    warn!(target: "database", name = %record.name, error = %err, "skipping record");
                    summary.rejected += 1;
                    continue;
                }
                match stmt.execute(params![
                    record.name,
                    record.address,
                    record.latitude,
                    record.longitude,
                    record.category
                ]) {
                    Ok(0) => summary.duplicates += 1,
                    Ok(_) => summary.inserted += 1,
                    Err(err) => {
                        warn!(target: "database", name = %record.name, error = %err, "failed to save record");
                        summary.rejected += 1;
                    }
                }
            }
        }
        tx.commit()?;

        info!(
            target: "database",
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "organizations saved"
        );
        Ok(summary)
    }

    pub fn count(&self) -> AppResult<usize> {
        let connection = self.open_read_only()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM organizations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn list(&self) -> AppResult<Vec<OrganizationRecord>> {
        let connection = self.open_read_only()?;
        let mut stmt = connection
            .prepare("SELECT name, address, lat, lon, type FROM organizations ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(OrganizationRecord {
                    name: row.get(0)?,
                    address: row.get(1)?,
                    latitude: row.get(2)?,
                    longitude: row.get(3)?,
                    category: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn open(&self) -> AppResult<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(&self.path, flags)?;
        debug!(target: "database", path = %self.path.display(), "connection opened");
        Ok(connection)
    }

    /// Reads never create the database file.
    fn open_read_only(&self) -> AppResult<Connection> {
        let connection = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        debug!(target: "database", path = %self.path.display(), "read-only connection opened");
        Ok(connection)
    }
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            address TEXT,
            lat REAL,
            lon REAL,
            type TEXT,
            UNIQUE(name, address, lat, lon, type)
        );
        "#,
    )?;
    Ok(())
}

fn validate(record: &OrganizationRecord) -> AppResult<()> {
    if record.name.trim().is_empty() {
        return Err(AppError::InvalidRecord("empty name".into()));
    }
    if !record.latitude.is_finite() || !record.longitude.is_finite() {
        return Err(AppError::InvalidRecord(format!(
            "non-finite coordinates ({}, {})",
            record.latitude, record.longitude
        )));
    }
    Ok(())
}
