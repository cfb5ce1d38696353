//! Field checks shared by the form commands.
//!
//! Each helper returns `None` when the value passes and a message meant for
//! the user when it does not. They never panic and never touch the store.

use crate::model::FormType;
use crate::AppError;

pub const INCIDENT_NAME_MAX: usize = 200;
pub const STATUS_MAX: usize = 32;

pub fn required(value: &str, field_name: &str) -> Option<String> {
    if value.trim().is_empty() {
        Some(format!("{field_name} is required"))
    } else {
        None
    }
}

pub fn max_length(value: &str, max: usize, field_name: &str) -> Option<String> {
    if value.chars().count() > max {
        Some(format!("{field_name} must be at most {max} characters"))
    } else {
        None
    }
}

pub fn valid_form_type(value: &str) -> Option<String> {
    match value.parse::<FormType>() {
        Ok(_) => None,
        Err(_) => Some(format!("Invalid form type: {value}")),
    }
}

pub fn valid_json(value: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(_) => None,
        Err(err) => Some(format!("Invalid JSON: {err}")),
    }
}

/// Fold helper results into a single validation error, or `Ok` when every check passed.
pub fn collect<I>(results: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = Option<String>>,
{
    let messages: Vec<String> = results.into_iter().flatten().collect();
    if messages.is_empty() {
        return Ok(());
    }
    let mut err = AppError::new("VALIDATION/INVALID_FORM", messages.join("; "));
    for (idx, message) in messages.iter().enumerate() {
        err = err.with_context(format!("error_{idx}"), message.clone());
    }
    Err(err)
}

/// Checks applied to every new or imported record before it reaches the store.
/// The incident name is judged as stored, without surrounding whitespace.
pub fn check_new_form(incident_name: &str, form_type: &str, form_data: &str) -> Result<(), AppError> {
    let incident_name = incident_name.trim();
    collect([
        required(incident_name, "Incident name"),
        max_length(incident_name, INCIDENT_NAME_MAX, "Incident name"),
        valid_form_type(form_type),
        valid_json(form_data),
    ])
}
