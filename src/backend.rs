//! Transport seam between the form service and whatever executes its commands.
//!
//! A backend receives a command name and a JSON parameter bag with camelCase
//! keys, and answers with a JSON value or an [`AppError`].

use std::future::Future;

use serde_json::Value;

use crate::{AppError, AppResult};

pub const SAVE_FORM: &str = "save_form";
pub const GET_FORM: &str = "get_form";
pub const SEARCH_FORMS: &str = "search_forms";
pub const UPDATE_FORM: &str = "update_form";
pub const GET_ALL_FORMS: &str = "get_all_forms";
pub const DELETE_FORM: &str = "delete_form";
pub const EXPORT_FORMS_JSON: &str = "export_forms_json";
pub const EXPORT_FORM_JSON: &str = "export_form_json";
pub const IMPORT_FORMS_JSON: &str = "import_forms_json";
pub const CREATE_BACKUP: &str = "create_backup";
pub const RESTORE_BACKUP: &str = "restore_backup";
pub const LIST_BACKUPS: &str = "list_backups";
pub const GET_BACKUP_INFO: &str = "get_backup_info";

pub const COMMANDS: &[&str] = &[
    SAVE_FORM,
    GET_FORM,
    SEARCH_FORMS,
    UPDATE_FORM,
    GET_ALL_FORMS,
    DELETE_FORM,
    EXPORT_FORMS_JSON,
    EXPORT_FORM_JSON,
    IMPORT_FORMS_JSON,
    CREATE_BACKUP,
    RESTORE_BACKUP,
    LIST_BACKUPS,
    GET_BACKUP_INFO,
];

pub trait FormBackend: Send + Sync {
    fn invoke(&self, command: &str, args: Value) -> impl Future<Output = AppResult<Value>> + Send;
}

impl<B: FormBackend> FormBackend for std::sync::Arc<B> {
    fn invoke(&self, command: &str, args: Value) -> impl Future<Output = AppResult<Value>> + Send {
        (**self).invoke(command, args)
    }
}

pub fn unknown_command(command: &str) -> AppError {
    AppError::new("COMMAND/UNKNOWN", format!("Unknown command: {command}"))
        .with_context("command", command.to_string())
}
