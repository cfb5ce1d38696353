use sqlx::SqlitePool;
use tracing::info;

use crate::model::ExportBundle;
use crate::{repo, time, AppError, AppResult};

/// Snapshot every stored form into an export bundle, oldest id first.
pub async fn build_bundle(pool: &SqlitePool) -> AppResult<ExportBundle> {
    let forms = repo::list_forms_by_id(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "export_list_forms"))?;
    Ok(ExportBundle::new(forms, time::now_rfc3339()))
}

pub async fn export_forms_json(pool: &SqlitePool) -> AppResult<String> {
    let bundle = build_bundle(pool).await?;
    let payload = serde_json::to_string_pretty(&bundle)
        .map_err(|err| AppError::from(err).with_context("operation", "serialize_bundle"))?;
    info!(
        target: "ics_forms",
        event = "export_forms",
        form_count = bundle.metadata.form_count
    );
    Ok(payload)
}

pub async fn export_form_json(pool: &SqlitePool, form_id: i64) -> AppResult<String> {
    let form = repo::get_form(pool, form_id)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "export_get_form"))?
        .ok_or_else(|| {
            AppError::new("FORMS/NOT_FOUND", "Form not found")
                .with_context("id", form_id.to_string())
        })?;
    let payload = serde_json::to_string_pretty(&form)
        .map_err(|err| AppError::from(err).with_context("operation", "serialize_form"))?;
    info!(target: "ics_forms", event = "export_form", id = form_id);
    Ok(payload)
}
