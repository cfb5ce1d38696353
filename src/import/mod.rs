//! JSON bundle import.
//!
//! Imports are all-or-nothing: the whole bundle is checked (shape, version,
//! declared count, every record's fields) before anything is written, and
//! the inserts run in one transaction. Imported records get fresh store ids
//! but keep their status and timestamps.

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use semver::Version;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::model::{ExportBundle, FormRecord, EXPORT_FORMAT_VERSION};
use crate::{repo, time, validation, AppError, AppResult};

const BUNDLE_SCHEMA_SOURCE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/export-bundle-v1.schema.json"
));

static BUNDLE_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    let schema: Value =
        serde_json::from_str(BUNDLE_SCHEMA_SOURCE).expect("bundle schema should remain valid JSON");
    JSONSchema::compile(&schema).expect("bundle schema should compile")
});

/// Parse and check a serialized bundle without touching the store.
pub fn parse_bundle(json_data: &str) -> AppResult<ExportBundle> {
    let value: Value = serde_json::from_str(json_data)
        .map_err(|err| AppError::from(err).with_context("operation", "parse_bundle"))?;

    if let Err(errors) = BUNDLE_SCHEMA.validate(&value) {
        let messages: Vec<String> = errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        return Err(AppError::new(
            "IMPORT/INVALID_BUNDLE",
            format!("Bundle does not match the export format: {}", messages.join("; ")),
        )
        .with_context("error_count", messages.len().to_string()));
    }

    let mut bundle: ExportBundle = serde_json::from_value(value)
        .map_err(|err| AppError::from(err).with_context("operation", "decode_bundle"))?;

    check_version(&bundle.metadata.version)?;

    if bundle.metadata.form_count != bundle.forms.len() {
        return Err(AppError::new(
            "IMPORT/COUNT_MISMATCH",
            "Bundle form count does not match the number of forms",
        )
        .with_context("declared", bundle.metadata.form_count.to_string())
        .with_context("actual", bundle.forms.len().to_string()));
    }

    for (index, form) in bundle.forms.iter_mut().enumerate() {
        form.incident_name = form.incident_name.trim().to_string();
        check_record(form).map_err(|err| {
            AppError::new(
                "IMPORT/INVALID_BUNDLE",
                format!("Form #{} is invalid: {}", index + 1, err.message()),
            )
            .with_context("index", index.to_string())
            .with_cause(err)
        })?;
    }

    Ok(bundle)
}

fn check_version(raw: &str) -> AppResult<()> {
    let supported = Version::parse(EXPORT_FORMAT_VERSION).map_err(|err| {
        AppError::new("IMPORT/UNSUPPORTED_VERSION", err.to_string())
    })?;
    let found = Version::parse(raw).map_err(|err| {
        AppError::new(
            "IMPORT/UNSUPPORTED_VERSION",
            format!("Invalid bundle version {raw:?}: {err}"),
        )
    })?;
    if found.major != supported.major {
        return Err(AppError::new(
            "IMPORT/UNSUPPORTED_VERSION",
            format!("Bundle version {found} is not supported (expected {}.x)", supported.major),
        )
        .with_context("found", found.to_string())
        .with_context("supported", supported.to_string()));
    }
    Ok(())
}

fn check_record(form: &FormRecord) -> AppResult<()> {
    validation::collect([
        validation::required(&form.incident_name, "Incident name"),
        validation::max_length(
            &form.incident_name,
            validation::INCIDENT_NAME_MAX,
            "Incident name",
        ),
        validation::required(&form.status, "Status"),
        validation::max_length(&form.status, validation::STATUS_MAX, "Status"),
        validation::valid_json(&form.form_data),
    ])
}

/// Validate the whole bundle, then insert every record in one transaction.
pub async fn import_forms_json(pool: &SqlitePool, json_data: &str) -> AppResult<String> {
    let bundle = match parse_bundle(json_data) {
        Ok(bundle) => bundle,
        Err(err) => {
            warn!(target: "ics_forms", event = "import_rejected", code = %err.code());
            return Err(err);
        }
    };

    let now = time::now_ms();
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "import_begin"))?;
    for (index, form) in bundle.forms.iter().enumerate() {
        let mut record = form.clone();
        if record.created_at <= 0 {
            record.created_at = now;
        }
        if record.updated_at <= 0 {
            record.updated_at = record.created_at;
        }
        // Dropping `tx` on the error path rolls the transaction back.
        repo::insert_record_tx(&mut tx, &record, false)
            .await
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "import_insert")
                    .with_context("index", index.to_string())
            })?;
    }
    tx.commit()
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "import_commit"))?;

    let count = bundle.forms.len();
    info!(target: "ics_forms", event = "import_forms", form_count = count);
    Ok(format!(
        "Imported {count} form{}",
        if count == 1 { "" } else { "s" }
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::export;
    use crate::model::FormType;
    use serde_json::json;

    fn bundle_json(forms: Value, count: usize, version: &str) -> String {
        json!({
            "metadata": { "version": version, "exported_at": "2024-05-01T00:00:00.000Z", "form_count": count },
            "forms": forms,
        })
        .to_string()
    }

    #[tokio::test]
    async fn export_then_import_reproduces_forms() {
        let source = open_memory_pool().await.unwrap();
        repo::insert_form(&source, "Creek Fire", FormType::Ics201, r#"{"a":1}"#)
            .await
            .unwrap();
        repo::insert_form(&source, "River Flood", FormType::Ics214, r#"{"log":[]}"#)
            .await
            .unwrap();
        let exported = export::export_forms_json(&source).await.unwrap();

        let target = open_memory_pool().await.unwrap();
        let summary = import_forms_json(&target, &exported).await.unwrap();
        assert_eq!(summary, "Imported 2 forms");

        let before = repo::list_forms_by_id(&source).await.unwrap();
        let after = repo::list_forms_by_id(&target).await.unwrap();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert!(a.same_content(b), "{a:?} != {b:?}");
        }
    }

    #[tokio::test]
    async fn one_bad_record_rejects_the_whole_bundle() {
        let pool = open_memory_pool().await.unwrap();
        let forms = json!([
            { "incident_name": "Good", "form_type": "ICS-201", "form_data": "{}" },
            { "incident_name": "Bad", "form_type": "ICS-202", "form_data": "{oops" },
        ]);
        let err = import_forms_json(&pool, &bundle_json(forms, 2, "1.0.0"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "IMPORT/INVALID_BUNDLE");
        assert_eq!(err.context().get("index").map(String::as_str), Some("1"));
        assert_eq!(repo::count_forms(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_form_type_fails_schema() {
        let pool = open_memory_pool().await.unwrap();
        let forms = json!([{ "incident_name": "X", "form_type": "ICS-999", "form_data": "{}" }]);
        let err = import_forms_json(&pool, &bundle_json(forms, 1, "1.0.0"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "IMPORT/INVALID_BUNDLE");
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let forms = json!([{ "incident_name": "X", "form_type": "ICS-201", "form_data": "{}" }]);
        let err = parse_bundle(&bundle_json(forms, 3, "1.0.0")).unwrap_err();
        assert_eq!(err.code(), "IMPORT/COUNT_MISMATCH");
    }

    #[test]
    fn newer_major_version_is_rejected() {
        let err = parse_bundle(&bundle_json(json!([]), 0, "2.0.0")).unwrap_err();
        assert_eq!(err.code(), "IMPORT/UNSUPPORTED_VERSION");
        let err = parse_bundle(&bundle_json(json!([]), 0, "one")).unwrap_err();
        assert_eq!(err.code(), "IMPORT/UNSUPPORTED_VERSION");
        assert!(parse_bundle(&bundle_json(json!([]), 0, "1.4.2")).is_ok());
    }

    #[test]
    fn malformed_json_surfaces_syntax_error() {
        let err = parse_bundle("{not json").unwrap_err();
        assert_eq!(err.code(), "JSON/SYNTAX");
    }

    #[tokio::test]
    async fn missing_timestamps_are_filled() {
        let pool = open_memory_pool().await.unwrap();
        let forms = json!([{ "incident_name": "X", "form_type": "ICS-201", "form_data": "{}" }]);
        let summary = import_forms_json(&pool, &bundle_json(forms, 1, "1.0.0"))
            .await
            .unwrap();
        assert_eq!(summary, "Imported 1 form");
        let stored = repo::list_forms(&pool).await.unwrap();
        assert!(stored[0].created_at > 0);
        assert_eq!(stored[0].created_at, stored[0].updated_at);
        assert_eq!(stored[0].status, "draft");
    }

    #[tokio::test]
    async fn incident_names_are_trimmed_before_checks_and_storage() {
        let pool = open_memory_pool().await.unwrap();
        let padded = format!("  {}  ", "y".repeat(validation::INCIDENT_NAME_MAX));
        let forms = json!([
            { "incident_name": "  Creek Fire  ", "form_type": "ICS-201", "form_data": "{}" },
            { "incident_name": padded, "form_type": "ICS-202", "form_data": "{}" },
        ]);
        import_forms_json(&pool, &bundle_json(forms, 2, "1.0.0"))
            .await
            .unwrap();
        let stored = repo::list_forms_by_id(&pool).await.unwrap();
        assert_eq!(stored[0].incident_name, "Creek Fire");
        assert_eq!(stored[1].incident_name, "y".repeat(validation::INCIDENT_NAME_MAX));

        let blank = json!([{ "incident_name": "   ", "form_type": "ICS-201", "form_data": "{}" }]);
        let err = parse_bundle(&bundle_json(blank, 1, "1.0.0")).unwrap_err();
        assert_eq!(err.code(), "IMPORT/INVALID_BUNDLE");
    }
}
