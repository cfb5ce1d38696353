use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use fs2::available_space;
use sqlx::SqlitePool;
use tokio::task;
use tracing::{info, warn};

use crate::{db::manifest, repo, AppError, AppResult};

use super::manifest::{BackupFile, BackupManifest};

const REQUIRED_FREE_MULTIPLIER: f64 = 1.2;
pub const ENV_FAKE_FREE_BYTES: &str = "ICS_FORMS_BACKUP_FAKE_FREE_BYTES";

/// Snapshot the whole store into a single backup file at `backup_path`.
pub async fn create_backup(pool: &SqlitePool, backup_path: &Path) -> AppResult<String> {
    let schema_hash = manifest::schema_hash(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "schema_hash"))?;
    let forms = repo::list_forms_by_id(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "backup_list_forms"))?;
    let manifest = BackupManifest::new(env!("CARGO_PKG_VERSION"), schema_hash, &forms)
        .map_err(|err| AppError::from(err).with_context("operation", "backup_manifest"))?;
    let backup = BackupFile { manifest, forms };

    let path = backup_path.to_path_buf();
    let written = task::spawn_blocking(move || write_backup_sync(&path, &backup))
        .await
        .map_err(|err| AppError::from_join("create_backup", err))??;

    info!(
        target: "ics_forms",
        event = "backup_created",
        path = %backup_path.display(),
        form_count = written.form_count,
        sha256 = %written.sha256
    );
    Ok(format!(
        "Backup created at {}: {} forms, checksum {}",
        backup_path.display(),
        written.form_count,
        written.sha256
    ))
}

fn write_backup_sync(path: &Path, backup: &BackupFile) -> AppResult<BackupManifest> {
    if path.is_dir() {
        return Err(AppError::new(
            "BACKUP/INVALID_PATH",
            "Backup path points to a directory",
        )
        .with_context("path", path.display().to_string()));
    }
    let payload = serde_json::to_vec_pretty(backup)
        .map_err(|err| AppError::from(err).with_context("operation", "serialize_backup"))?;

    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_backup_dir")
            .with_context("path", parent.display().to_string())
    })?;
    let required = required_free_bytes(payload.len() as u64);
    let available = free_disk_space(&parent)?;
    if available < required {
        return Err(AppError::new(
            "BACKUP/LOW_DISK",
            format!("Not enough disk space (need ~{}).", format_bytes(required)),
        )
        .with_context("available_bytes", available.to_string())
        .with_context("required_bytes", required.to_string()));
    }

    crate::db::write_atomic(path, &payload).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "write_backup")
            .with_context("path", path.display().to_string())
    })?;
    Ok(backup.manifest.clone())
}

/// Replace every stored form with the contents of a verified backup file.
pub async fn restore_backup(pool: &SqlitePool, backup_path: &Path) -> AppResult<String> {
    let path = backup_path.to_path_buf();
    let backup = task::spawn_blocking(move || load_verified(&path))
        .await
        .map_err(|err| AppError::from_join("restore_backup", err))??;

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "restore_begin"))?;
    let removed = repo::clear_forms_tx(&mut tx)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "restore_clear"))?;
    for form in &backup.forms {
        repo::insert_record_tx(&mut tx, form, true)
            .await
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "restore_insert")
                    .with_context("id", form.id.map(|id| id.to_string()).unwrap_or_default())
            })?;
    }
    tx.commit()
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "restore_commit"))?;

    info!(
        target: "ics_forms",
        event = "backup_restored",
        path = %backup_path.display(),
        form_count = backup.forms.len(),
        replaced = removed
    );
    Ok(format!(
        "Restored {} forms from {} (created {})",
        backup.forms.len(),
        backup_path.display(),
        backup.manifest.created_at
    ))
}

fn load_verified(path: &Path) -> AppResult<BackupFile> {
    let backup = load_backup(path)?;
    let matches = backup.checksum_matches().map_err(|err| {
        AppError::from(err).with_context("operation", "hash_backup")
    })?;
    if !matches || backup.manifest.form_count != backup.forms.len() {
        return Err(AppError::new(
            "BACKUP/CHECKSUM_MISMATCH",
            "Backup checksum does not match its contents",
        )
        .with_context("path", path.display().to_string())
        .with_context("expected", backup.manifest.sha256.clone()));
    }
    Ok(backup)
}

fn load_backup(path: &Path) -> AppResult<BackupFile> {
    if !path.is_file() {
        return Err(AppError::new("BACKUP/NOT_FOUND", "Backup file not found")
            .with_context("path", path.display().to_string()));
    }
    manifest::read_backup(path).map_err(|err| {
        AppError::new("BACKUP/INVALID", "File is not a readable backup")
            .with_context("path", path.display().to_string())
            .with_cause(err)
    })
}

/// Describe every readable backup in `directory`, newest first.
pub async fn list_backups(directory: &Path) -> AppResult<Vec<String>> {
    let dir = directory.to_path_buf();
    task::spawn_blocking(move || list_backups_sync(&dir))
        .await
        .map_err(|err| AppError::from_join("list_backups", err))?
}

fn list_backups_sync(directory: &Path) -> AppResult<Vec<String>> {
    if !directory.exists() {
        return Ok(Vec::new());
    }
    if !directory.is_dir() {
        return Err(
            AppError::new("BACKUP/NOT_A_DIRECTORY", "Backup location is not a directory")
                .with_context("path", directory.display().to_string()),
        );
    }

    let mut found: Vec<(PathBuf, BackupManifest)> = Vec::new();
    for entry in fs::read_dir(directory).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "read_backups_dir")
            .with_context("path", directory.display().to_string())
    })? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(target: "ics_forms", event = "skip_invalid_backup_entry", error = %err);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !is_backup_candidate(&path) {
            continue;
        }
        match manifest::read_manifest(&path) {
            Ok(manifest) => found.push((path, manifest)),
            Err(err) => {
                warn!(
                    target: "ics_forms",
                    event = "skip_backup_invalid",
                    error = %err,
                    path = %path.display()
                );
            }
        }
    }

    found.sort_by(|(pa, a), (pb, b)| {
        b.created_at_utc()
            .cmp(&a.created_at_utc())
            .then_with(|| pa.cmp(pb))
    });
    Ok(found
        .into_iter()
        .map(|(path, manifest)| describe_entry(&path, &manifest))
        .collect())
}

fn is_backup_candidate(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn describe_entry(path: &Path, manifest: &BackupManifest) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!(
        "{name} | created {} | {} forms | sha256 {}",
        manifest.created_at,
        manifest.form_count,
        short_hash(&manifest.sha256)
    )
}

/// Human-readable summary of a backup file, including whether its checksum verifies.
pub async fn get_backup_info(backup_path: &Path) -> AppResult<String> {
    let path = backup_path.to_path_buf();
    task::spawn_blocking(move || backup_info_sync(&path))
        .await
        .map_err(|err| AppError::from_join("get_backup_info", err))?
}

fn backup_info_sync(path: &Path) -> AppResult<String> {
    let backup = load_backup(path)?;
    let size = fs::metadata(path)
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "backup_metadata")
                .with_context("path", path.display().to_string())
        })?
        .len();
    let verified = backup
        .checksum_matches()
        .map_err(|err| AppError::from(err).with_context("operation", "hash_backup"))?
        && backup.manifest.form_count == backup.forms.len();
    let m = &backup.manifest;
    Ok(format!(
        "Backup: {}\nCreated: {}\nForms: {}\nApp version: {}\nFormat version: {}\nSchema hash: {}\nChecksum: {} ({})\nSize: {} bytes",
        path.display(),
        m.created_at,
        m.form_count,
        m.app_version,
        m.format_version,
        short_hash(&m.schema_hash),
        m.sha256,
        if verified { "verified" } else { "MISMATCH" },
        size
    ))
}

/// Default file name for a backup taken now, e.g. `ics-forms-20240501-101500.icsbackup.json`.
pub fn default_backup_file_name() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    format!("ics-forms-{stamp}.{}", manifest::BACKUP_EXTENSION)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn required_free_bytes(payload_size: u64) -> u64 {
    ((payload_size as f64 * REQUIRED_FREE_MULTIPLIER).ceil()) as u64
}

fn free_disk_space(path: &Path) -> AppResult<u64> {
    if let Ok(fake) = env::var(ENV_FAKE_FREE_BYTES) {
        if let Ok(value) = fake.parse::<u64>() {
            return Ok(value);
        }
    }

    available_space(path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "available_space")
            .with_context("path", path.display().to_string())
    })
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1_000 {
        return format!("{bytes} B");
    }
    let kb = (bytes as f64) / 1_000.0;
    if kb < 1_000.0 {
        format!("{:.0} KB", kb.ceil())
    } else {
        format!("{:.0} MB", (kb / 1_000.0).ceil())
    }
}
