#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use ics_forms_lib::{FormService, SqliteBackend};
use sqlx::SqlitePool;

pub async fn temp_pool() -> SqlitePool {
    ics_forms_lib::db::open_memory_pool()
        .await
        .expect("open in-memory form store")
}

pub async fn temp_service() -> FormService<SqliteBackend> {
    FormService::new(SqliteBackend::new(temp_pool().await))
}

/// Saves a small mixed set of forms across two incidents; returns their ids.
pub async fn seed_forms(service: &FormService<SqliteBackend>) -> Vec<i64> {
    let mut ids = Vec::new();
    for (incident, form_type, data) in [
        ("Creek Fire", "ICS-201", r#"{"summary":"initial briefing"}"#),
        ("Creek Fire", "ICS-214", r#"{"activities":["staging"]}"#),
        ("Harbor Spill", "ICS-205A", r#"{"channels":[1,2]}"#),
    ] {
        ids.push(
            service
                .save_form(incident, form_type, data)
                .await
                .expect("seed form"),
        );
    }
    ids
}
