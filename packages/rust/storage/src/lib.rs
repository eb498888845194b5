//! libSQL storage layer for generated site content.
//!
//! The [`Storage`] struct wraps a local libSQL database holding page sections
//! produced by the pipeline and snapshots of finished pipeline runs.
//!
//! **Access rules:**
//! - generation runs: read-write via [`Storage::open`]
//! - listing commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sitegen_shared::{Result, SitegenError};

/// A section row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSection {
    pub project_id: String,
    pub section_id: String,
    pub content: Value,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// A saved pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub project_id: String,
    pub status: String,
    pub snapshot: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SHA-256 of the compact JSON encoding, lowercase hex.
pub fn content_hash(content: &Value) -> String {
    let encoded = content.to_string();
    format!("{:x}", Sha256::digest(encoded.as_bytes()))
}

fn storage_err(e: impl std::fmt::Display) -> SitegenError {
    SitegenError::Storage(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SitegenError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SitegenError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SitegenError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SitegenError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Section operations
    // -----------------------------------------------------------------------

    /// Insert or replace a section. Returns `false` when the stored content
    /// already has the same hash and nothing was written.
    pub async fn upsert_section(
        &self,
        project_id: &str,
        section_id: &str,
        content: &Value,
    ) -> Result<bool> {
        self.check_writable()?;
        let hash = content_hash(content);

        let mut rows = self
            .conn
            .query(
                "SELECT content_hash FROM sections WHERE project_id = ?1 AND section_id = ?2",
                params![project_id, section_id],
            )
            .await
            .map_err(storage_err)?;
        if let Ok(Some(row)) = rows.next().await {
            let existing: String = row.get(0).map_err(storage_err)?;
            if existing == hash {
                tracing::debug!(project_id, section_id, "section unchanged");
                return Ok(false);
            }
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO sections (project_id, section_id, content_json, content_hash, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(project_id, section_id) DO UPDATE SET
                   content_json = excluded.content_json,
                   content_hash = excluded.content_hash,
                   updated_at = excluded.updated_at",
                params![
                    project_id,
                    section_id,
                    content.to_string(),
                    hash.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(true)
    }

    pub async fn get_section(
        &self,
        project_id: &str,
        section_id: &str,
    ) -> Result<Option<StoredSection>> {
        let mut rows = self
            .conn
            .query(
                "SELECT project_id, section_id, content_json, content_hash, updated_at
                 FROM sections WHERE project_id = ?1 AND section_id = ?2",
                params![project_id, section_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_section(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All sections of a project, ordered by section id.
    pub async fn list_sections(&self, project_id: &str) -> Result<Vec<StoredSection>> {
        let mut rows = self
            .conn
            .query(
                "SELECT project_id, section_id, content_json, content_hash, updated_at
                 FROM sections WHERE project_id = ?1 ORDER BY section_id",
                params![project_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_section(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Save (or overwrite) a run snapshot.
    pub async fn save_run(
        &self,
        run_id: &str,
        project_id: &str,
        status: &str,
        snapshot: &Value,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pipeline_runs (id, project_id, status, snapshot_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   status = excluded.status,
                   snapshot_json = excluded.snapshot_json,
                   updated_at = excluded.updated_at",
                params![
                    run_id,
                    project_id,
                    status,
                    snapshot.to_string(),
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, status, snapshot_json, created_at, updated_at
                 FROM pipeline_runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Runs of a project, newest first.
    pub async fn list_runs(&self, project_id: &str) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, status, snapshot_json, created_at, updated_at
                 FROM pipeline_runs WHERE project_id = ?1 ORDER BY created_at DESC, id DESC",
                params![project_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SitegenError::Storage(format!("invalid date: {e}")))
}

fn parse_json(s: &str) -> Result<Value> {
    serde_json::from_str(s).map_err(|e| SitegenError::Storage(format!("invalid stored JSON: {e}")))
}

fn row_to_section(row: &Row) -> Result<StoredSection> {
    let content: String = row.get(2).map_err(storage_err)?;
    let updated_at: String = row.get(4).map_err(storage_err)?;
    Ok(StoredSection {
        project_id: row.get(0).map_err(storage_err)?,
        section_id: row.get(1).map_err(storage_err)?,
        content: parse_json(&content)?,
        content_hash: row.get(3).map_err(storage_err)?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn row_to_run(row: &Row) -> Result<RunRecord> {
    let snapshot: String = row.get(3).map_err(storage_err)?;
    let created_at: String = row.get(4).map_err(storage_err)?;
    let updated_at: String = row.get(5).map_err(storage_err)?;
    Ok(RunRecord {
        id: row.get(0).map_err(storage_err)?,
        project_id: row.get(1).map_err(storage_err)?,
        status: row.get(2).map_err(storage_err)?,
        snapshot: parse_json(&snapshot)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}
