use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use ts_rs::TS;

use crate::model::FormRecord;

pub const BACKUP_FORMAT_VERSION: u32 = 1;
pub const BACKUP_EXTENSION: &str = "icsbackup.json";

/// Integrity metadata stored at the head of every backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BackupManifest {
    pub format_version: u32,
    pub app_version: String,
    pub schema_hash: String,
    pub created_at: String,
    #[ts(type = "number")]
    pub form_count: usize,
    /// Hex SHA-256 of the compact JSON encoding of `forms`.
    pub sha256: String,
}

impl BackupManifest {
    pub fn new(
        app_version: impl Into<String>,
        schema_hash: impl Into<String>,
        forms: &[FormRecord],
    ) -> Result<Self> {
        Ok(Self {
            format_version: BACKUP_FORMAT_VERSION,
            app_version: app_version.into(),
            schema_hash: schema_hash.into(),
            created_at: crate::time::now_rfc3339(),
            form_count: forms.len(),
            sha256: forms_sha256(forms)?,
        })
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}

/// A whole-store snapshot: manifest plus every form record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub manifest: BackupManifest,
    pub forms: Vec<FormRecord>,
}

impl BackupFile {
    /// Recompute the forms checksum and compare it with the manifest.
    pub fn checksum_matches(&self) -> Result<bool> {
        Ok(forms_sha256(&self.forms)? == self.manifest.sha256)
    }
}

#[derive(Deserialize)]
struct BackupHeader {
    manifest: BackupManifest,
}

pub fn forms_sha256(forms: &[FormRecord]) -> Result<String> {
    let bytes = serde_json::to_vec(forms).context("serialize forms for hashing")?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

pub async fn schema_hash(pool: &SqlitePool) -> Result<String> {
    let rows = sqlx::query(
        "SELECT type, name, tbl_name, sql FROM sqlite_master\n         WHERE type IN ('table','index','trigger','view')\n           AND name NOT LIKE 'sqlite_%'\n  ORDER BY type, name",
    )
    .fetch_all(pool)
    .await
    .context("read sqlite_master for schema hash")?;

    let mut hasher = Sha256::new();
    for row in rows {
        let ty: String = row.try_get("type")?;
        let name: String = row.try_get("name")?;
        let tbl: String = row.try_get("tbl_name")?;
        let sql: Option<String> = row.try_get("sql").ok();

        hasher.update(ty.as_bytes());
        hasher.update([0]);
        hasher.update(name.as_bytes());
        hasher.update([0]);
        hasher.update(tbl.as_bytes());
        hasher.update([0]);
        if let Some(sql) = sql {
            hasher.update(sql.as_bytes());
        }
        hasher.update([0]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Read only the manifest of a backup file.
pub fn read_manifest(path: &Path) -> Result<BackupManifest> {
    let file =
        File::open(path).with_context(|| format!("open backup file: {}", path.display()))?;
    let header: BackupHeader = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse backup manifest: {}", path.display()))?;
    Ok(header.manifest)
}

pub fn read_backup(path: &Path) -> Result<BackupFile> {
    let file =
        File::open(path).with_context(|| format!("open backup file: {}", path.display()))?;
    let backup: BackupFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse backup file: {}", path.display()))?;
    Ok(backup)
}
