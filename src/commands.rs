use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::backend::{self, FormBackend};
use crate::db::backup;
use crate::model::{FormRecord, FormType};
use crate::{export, import, repo, validation, AppError, AppResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SaveFormArgs {
    incident_name: String,
    form_type: String,
    form_data: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IdArgs {
    id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SearchArgs {
    #[serde(default)]
    incident_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateArgs {
    id: i64,
    form_data: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ExportFormArgs {
    form_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ImportArgs {
    json_data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BackupPathArgs {
    backup_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DirectoryArgs {
    directory_path: String,
}

fn decode_args<T: DeserializeOwned>(command: &str, args: Value) -> AppResult<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|err| {
        AppError::new(
            "COMMAND/INVALID_ARGS",
            format!("Invalid arguments for {command}: {err}"),
        )
        .with_context("command", command.to_string())
    })
}

fn encode<T: Serialize>(command: &str, value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "encode_result")
            .with_context("command", command.to_string())
    })
}

pub async fn save_form_command(
    pool: &SqlitePool,
    incident_name: &str,
    form_type: &str,
    form_data: &str,
) -> AppResult<i64> {
    validation::check_new_form(incident_name, form_type, form_data)?;
    let form_type: FormType = form_type.parse().map_err(|err: crate::model::UnknownFormType| {
        AppError::new("VALIDATION/INVALID_FORM", err.to_string())
    })?;
    let id = repo::insert_form(pool, incident_name.trim(), form_type, form_data)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "save_form")
                .with_context("form_type", form_type.code())
        })?;
    tracing::info!(target: "ics_forms", event = "form_saved", id, form_type = %form_type);
    Ok(id)
}

pub async fn get_form_command(pool: &SqlitePool, id: i64) -> AppResult<Option<FormRecord>> {
    repo::get_form(pool, id).await.map_err(|err| {
        AppError::from(err)
            .with_context("operation", "get_form")
            .with_context("id", id.to_string())
    })
}

pub async fn search_forms_command(
    pool: &SqlitePool,
    incident_name: Option<&str>,
) -> AppResult<Vec<FormRecord>> {
    repo::search_forms(pool, incident_name).await.map_err(|err| {
        AppError::from(err)
            .with_context("operation", "search_forms")
            .with_context("incident_name", incident_name.unwrap_or("").to_string())
    })
}

pub async fn update_form_command(pool: &SqlitePool, id: i64, form_data: &str) -> AppResult<()> {
    validation::collect([validation::valid_json(form_data)])?;
    let updated = repo::update_form_data(pool, id, form_data)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "update_form")
                .with_context("id", id.to_string())
        })?;
    if !updated {
        return Err(AppError::new("FORMS/NOT_FOUND", "Form not found")
            .with_context("id", id.to_string()));
    }
    tracing::info!(target: "ics_forms", event = "form_updated", id);
    Ok(())
}

pub async fn get_all_forms_command(pool: &SqlitePool) -> AppResult<Vec<FormRecord>> {
    repo::list_forms(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "get_all_forms"))
}

pub async fn delete_form_command(pool: &SqlitePool, id: i64) -> AppResult<bool> {
    let removed = repo::delete_form(pool, id).await.map_err(|err| {
        AppError::from(err)
            .with_context("operation", "delete_form")
            .with_context("id", id.to_string())
    })?;
    tracing::info!(target: "ics_forms", event = "form_deleted", id, removed);
    Ok(removed)
}

/// In-process command router over the SQLite store.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn dispatch(&self, command: &str, args: Value) -> AppResult<Value> {
        tracing::debug!(target: "ics_forms", event = "command_invoked", command);
        let result = self.route(command, args).await;
        if let Err(err) = &result {
            err.log_with_event("command_failed");
        }
        result
    }

    async fn route(&self, command: &str, args: Value) -> AppResult<Value> {
        let pool = &self.pool;
        match command {
            backend::SAVE_FORM => {
                let a: SaveFormArgs = decode_args(command, args)?;
                let id = save_form_command(pool, &a.incident_name, &a.form_type, &a.form_data)
                    .await?;
                encode(command, id)
            }
            backend::GET_FORM => {
                let a: IdArgs = decode_args(command, args)?;
                encode(command, get_form_command(pool, a.id).await?)
            }
            backend::SEARCH_FORMS => {
                let a: SearchArgs = decode_args(command, args)?;
                encode(
                    command,
                    search_forms_command(pool, a.incident_name.as_deref()).await?,
                )
            }
            backend::UPDATE_FORM => {
                let a: UpdateArgs = decode_args(command, args)?;
                update_form_command(pool, a.id, &a.form_data).await?;
                Ok(Value::Null)
            }
            backend::GET_ALL_FORMS => {
                let _: NoArgs = decode_args(command, args)?;
                encode(command, get_all_forms_command(pool).await?)
            }
            backend::DELETE_FORM => {
                let a: IdArgs = decode_args(command, args)?;
                encode(command, delete_form_command(pool, a.id).await?)
            }
            backend::EXPORT_FORMS_JSON => {
                let _: NoArgs = decode_args(command, args)?;
                encode(command, export::export_forms_json(pool).await?)
            }
            backend::EXPORT_FORM_JSON => {
                let a: ExportFormArgs = decode_args(command, args)?;
                encode(command, export::export_form_json(pool, a.form_id).await?)
            }
            backend::IMPORT_FORMS_JSON => {
                let a: ImportArgs = decode_args(command, args)?;
                encode(command, import::import_forms_json(pool, &a.json_data).await?)
            }
            backend::CREATE_BACKUP => {
                let a: BackupPathArgs = decode_args(command, args)?;
                encode(
                    command,
                    backup::create_backup(pool, Path::new(&a.backup_path)).await?,
                )
            }
            backend::RESTORE_BACKUP => {
                let a: BackupPathArgs = decode_args(command, args)?;
                encode(
                    command,
                    backup::restore_backup(pool, Path::new(&a.backup_path)).await?,
                )
            }
            backend::LIST_BACKUPS => {
                let a: DirectoryArgs = decode_args(command, args)?;
                encode(
                    command,
                    backup::list_backups(Path::new(&a.directory_path)).await?,
                )
            }
            backend::GET_BACKUP_INFO => {
                let a: BackupPathArgs = decode_args(command, args)?;
                encode(
                    command,
                    backup::get_backup_info(Path::new(&a.backup_path)).await?,
                )
            }
            other => Err(backend::unknown_command(other)),
        }
    }
}

impl FormBackend for SqliteBackend {
    async fn invoke(&self, command: &str, args: Value) -> AppResult<Value> {
        self.dispatch(command, args).await
    }
}
