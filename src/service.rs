//! Typed façade over a [`FormBackend`].
//!
//! Each method forwards exactly the named camelCase parameters of its command
//! and decodes the reply. Validation and persistence live behind the backend;
//! backend failures surface unchanged.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::backend::{self, FormBackend};
use crate::model::FormRecord;
use crate::{AppError, AppResult};

pub struct FormService<B> {
    backend: B,
}

fn decode<T: DeserializeOwned>(command: &str, value: Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|err| {
        AppError::new(
            "COMMAND/INVALID_RESPONSE",
            format!("Unexpected response from {command}: {err}"),
        )
        .with_context("command", command.to_string())
    })
}

impl<B: FormBackend> FormService<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, args: Value) -> AppResult<T> {
        let reply = self.backend.invoke(command, args).await?;
        decode(command, reply)
    }

    pub async fn save_form(
        &self,
        incident_name: &str,
        form_type: &str,
        form_data: &str,
    ) -> AppResult<i64> {
        self.call(
            backend::SAVE_FORM,
            json!({
                "incidentName": incident_name,
                "formType": form_type,
                "formData": form_data,
            }),
        )
        .await
    }

    pub async fn get_form(&self, id: i64) -> AppResult<Option<FormRecord>> {
        self.call(backend::GET_FORM, json!({ "id": id })).await
    }

    /// With no filter every form is returned.
    pub async fn search_forms(&self, incident_name: Option<&str>) -> AppResult<Vec<FormRecord>> {
        let mut args = Map::new();
        if let Some(name) = incident_name {
            args.insert("incidentName".into(), Value::from(name));
        }
        self.call(backend::SEARCH_FORMS, Value::Object(args)).await
    }

    pub async fn update_form(&self, id: i64, form_data: &str) -> AppResult<()> {
        self.backend
            .invoke(
                backend::UPDATE_FORM,
                json!({ "id": id, "formData": form_data }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_all_forms(&self) -> AppResult<Vec<FormRecord>> {
        self.call(backend::GET_ALL_FORMS, json!({})).await
    }

    pub async fn delete_form(&self, id: i64) -> AppResult<bool> {
        self.call(backend::DELETE_FORM, json!({ "id": id })).await
    }

    pub async fn export_forms_json(&self) -> AppResult<String> {
        self.call(backend::EXPORT_FORMS_JSON, json!({})).await
    }

    pub async fn export_form_json(&self, form_id: i64) -> AppResult<String> {
        self.call(backend::EXPORT_FORM_JSON, json!({ "formId": form_id }))
            .await
    }

    pub async fn import_forms_json(&self, json_data: &str) -> AppResult<String> {
        self.call(backend::IMPORT_FORMS_JSON, json!({ "jsonData": json_data }))
            .await
    }

    pub async fn create_backup(&self, backup_path: &str) -> AppResult<String> {
        self.call(backend::CREATE_BACKUP, json!({ "backupPath": backup_path }))
            .await
    }

    pub async fn restore_backup(&self, backup_path: &str) -> AppResult<String> {
        self.call(backend::RESTORE_BACKUP, json!({ "backupPath": backup_path }))
            .await
    }

    pub async fn list_backups(&self, directory_path: &str) -> AppResult<Vec<String>> {
        self.call(
            backend::LIST_BACKUPS,
            json!({ "directoryPath": directory_path }),
        )
        .await
    }

    pub async fn get_backup_info(&self, backup_path: &str) -> AppResult<String> {
        self.call(backend::GET_BACKUP_INFO, json!({ "backupPath": backup_path }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every invocation and answers with a canned reply.
    struct RecordingBackend {
        calls: Mutex<Vec<(String, Value)>>,
        reply: AppResult<Value>,
    }

    impl RecordingBackend {
        fn replying(reply: Value) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply: Ok(reply),
            }
        }

        fn failing(err: AppError) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply: Err(err),
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FormBackend for RecordingBackend {
        async fn invoke(&self, command: &str, args: Value) -> AppResult<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args));
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn save_form_sends_named_params_and_returns_id() {
        let service = FormService::new(RecordingBackend::replying(json!(42)));
        let id = service
            .save_form("Test Incident", "ICS-201", r#"{"a":1}"#)
            .await
            .unwrap();
        assert_eq!(id, 42);
        assert_eq!(
            service.backend().calls(),
            vec![(
                "save_form".to_string(),
                json!({
                    "incidentName": "Test Incident",
                    "formType": "ICS-201",
                    "formData": r#"{"a":1}"#,
                })
            )]
        );
    }

    #[tokio::test]
    async fn get_form_maps_null_to_none() {
        let service = FormService::new(RecordingBackend::replying(Value::Null));
        assert!(service.get_form(5).await.unwrap().is_none());
        assert_eq!(
            service.backend().calls(),
            vec![("get_form".to_string(), json!({ "id": 5 }))]
        );
    }

    #[tokio::test]
    async fn search_without_filter_omits_incident_name() {
        let service = FormService::new(RecordingBackend::replying(json!([])));
        service.search_forms(None).await.unwrap();
        service.search_forms(Some("Creek")).await.unwrap();
        let calls = service.backend().calls();
        assert_eq!(calls[0].1, json!({}));
        assert_eq!(calls[1].1, json!({ "incidentName": "Creek" }));
    }

    #[tokio::test]
    async fn backup_and_export_commands_use_camel_case_params() {
        let service = FormService::new(RecordingBackend::replying(json!("ok")));
        service.export_form_json(3).await.unwrap();
        service.import_forms_json("{}").await.unwrap();
        service.create_backup("/tmp/a.json").await.unwrap();
        service.restore_backup("/tmp/a.json").await.unwrap();
        service.get_backup_info("/tmp/a.json").await.unwrap();
        let calls = service.backend().calls();
        let names: Vec<_> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [
                "export_form_json",
                "import_forms_json",
                "create_backup",
                "restore_backup",
                "get_backup_info"
            ]
        );
        assert_eq!(calls[0].1, json!({ "formId": 3 }));
        assert_eq!(calls[1].1, json!({ "jsonData": "{}" }));
        assert_eq!(calls[2].1, json!({ "backupPath": "/tmp/a.json" }));
    }

    #[tokio::test]
    async fn list_backups_sends_directory_path() {
        let service = FormService::new(RecordingBackend::replying(json!(["a", "b"])));
        let lines = service.list_backups("/backups").await.unwrap();
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            service.backend().calls()[0].1,
            json!({ "directoryPath": "/backups" })
        );
    }

    #[tokio::test]
    async fn backend_errors_pass_through_unchanged() {
        let err = AppError::new("FORMS/NOT_FOUND", "Form not found").with_context("id", "9");
        let service = FormService::new(RecordingBackend::failing(err.clone()));
        let got = service.update_form(9, "{}").await.unwrap_err();
        assert_eq!(got, err);
    }

    #[tokio::test]
    async fn wrong_reply_shape_is_reported() {
        let service = FormService::new(RecordingBackend::replying(json!("not a number")));
        let err = service.save_form("X", "ICS-201", "{}").await.unwrap_err();
        assert_eq!(err.code(), "COMMAND/INVALID_RESPONSE");
    }
}
