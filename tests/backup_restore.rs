#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use std::fs;
use std::path::Path;

use ics_forms_lib::db::manifest::{read_manifest, BackupFile};
use tempfile::tempdir;
use util::{seed_forms, temp_service};

fn set_created_at(path: &Path, created_at: &str) {
    let mut backup: BackupFile = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    backup.manifest.created_at = created_at.to_string();
    fs::write(path, serde_json::to_vec_pretty(&backup).unwrap()).unwrap();
}

#[tokio::test]
async fn backup_then_restore_reproduces_store() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("snapshot.icsbackup.json");
    let path_str = path.to_string_lossy().into_owned();

    let service = temp_service().await;
    let ids = seed_forms(&service).await;
    let before = service.get_all_forms().await.unwrap();

    let status = service.create_backup(&path_str).await.unwrap();
    assert!(status.contains("3 forms"), "{status}");
    let manifest = read_manifest(&path).unwrap();
    assert_eq!(manifest.form_count, 3);
    assert!(status.contains(&manifest.sha256));

    service.delete_form(ids[0]).await.unwrap();
    service
        .save_form("Later Incident", "ICS-213", "{}")
        .await
        .unwrap();

    let restored = service.restore_backup(&path_str).await.unwrap();
    assert!(restored.starts_with("Restored 3 forms"), "{restored}");
    assert_eq!(service.get_all_forms().await.unwrap(), before);
}

#[tokio::test]
async fn restore_into_fresh_store_keeps_ids() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("ids.icsbackup.json");
    let path_str = path.to_string_lossy().into_owned();

    let source = temp_service().await;
    let ids = seed_forms(&source).await;
    source.create_backup(&path_str).await.unwrap();

    let target = temp_service().await;
    target.restore_backup(&path_str).await.unwrap();
    for id in ids {
        let a = source.get_form(id).await.unwrap().unwrap();
        let b = target.get_form(id).await.unwrap().unwrap();
        assert_eq!(a, b);
    }
}

#[tokio::test]
async fn tampered_backup_is_rejected_and_store_untouched() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("tampered.icsbackup.json");
    let path_str = path.to_string_lossy().into_owned();

    let service = temp_service().await;
    seed_forms(&service).await;
    service.create_backup(&path_str).await.unwrap();

    let mut backup: BackupFile = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    backup.forms[0].form_data = r#"{"summary":"edited offline"}"#.into();
    fs::write(&path, serde_json::to_vec_pretty(&backup).unwrap()).unwrap();

    service
        .save_form("Unrelated", "ICS-202", "{}")
        .await
        .unwrap();
    let before = service.get_all_forms().await.unwrap();

    let err = service.restore_backup(&path_str).await.unwrap_err();
    assert_eq!(err.code(), "BACKUP/CHECKSUM_MISMATCH");
    assert_eq!(service.get_all_forms().await.unwrap(), before);

    let info = service.get_backup_info(&path_str).await.unwrap();
    assert!(info.contains("(MISMATCH)"), "{info}");
}

#[tokio::test]
async fn missing_and_unreadable_backups() {
    let tmp = tempdir().unwrap();
    let service = temp_service().await;

    let missing = tmp.path().join("nope.icsbackup.json");
    let err = service
        .restore_backup(&missing.to_string_lossy())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BACKUP/NOT_FOUND");

    let junk = tmp.path().join("junk.json");
    fs::write(&junk, b"{\"hello\":true}").unwrap();
    let err = service
        .get_backup_info(&junk.to_string_lossy())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BACKUP/INVALID");

    let err = service
        .create_backup(&tmp.path().to_string_lossy())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BACKUP/INVALID_PATH");
}

#[tokio::test]
async fn list_and_describe_backups() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("backups");
    let service = temp_service().await;

    assert!(service
        .list_backups(&dir.to_string_lossy())
        .await
        .unwrap()
        .is_empty());

    seed_forms(&service).await;
    let first = dir.join("a.icsbackup.json");
    service.create_backup(&first.to_string_lossy()).await.unwrap();
    service.save_form("Fourth", "ICS-215A", "{}").await.unwrap();
    let second = dir.join("b.icsbackup.json");
    service
        .create_backup(&second.to_string_lossy())
        .await
        .unwrap();
    fs::write(dir.join("notes.txt"), b"not a backup").unwrap();
    fs::write(dir.join("broken.json"), b"{").unwrap();

    let lines = service.list_backups(&dir.to_string_lossy()).await.unwrap();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines.iter().any(|l| l.starts_with("a.icsbackup.json |") && l.contains("| 3 forms |")));
    assert!(lines.iter().any(|l| l.starts_with("b.icsbackup.json |") && l.contains("| 4 forms |")));

    let third = dir.join("c.icsbackup.json");
    service.create_backup(&third.to_string_lossy()).await.unwrap();
    set_created_at(&first, "2025-06-01T12:00:00.000Z");
    set_created_at(&second, "2024-01-15T08:30:00.000Z");
    set_created_at(&third, "2025-09-30T23:59:59.000Z");
    let names: Vec<String> = service
        .list_backups(&dir.to_string_lossy())
        .await
        .unwrap()
        .iter()
        .map(|l| l.split(" | ").next().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        ["c.icsbackup.json", "a.icsbackup.json", "b.icsbackup.json"]
    );

    let info = service
        .get_backup_info(&second.to_string_lossy())
        .await
        .unwrap();
    assert!(info.contains("Forms: 4"), "{info}");
    assert!(info.contains("(verified)"), "{info}");
    assert!(info.contains("Format version: 1"), "{info}");
    let size = fs::metadata(&second).unwrap().len();
    assert!(size > 0);
    assert!(info.ends_with(&format!("Size: {size} bytes")), "{info}");

    let err = service
        .list_backups(&first.to_string_lossy())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BACKUP/NOT_A_DIRECTORY");
}
