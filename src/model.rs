use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Standard ICS form codes accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum FormType {
    #[serde(rename = "ICS-201")]
    Ics201,
    #[serde(rename = "ICS-202")]
    Ics202,
    #[serde(rename = "ICS-203")]
    Ics203,
    #[serde(rename = "ICS-204")]
    Ics204,
    #[serde(rename = "ICS-205")]
    Ics205,
    #[serde(rename = "ICS-205A")]
    Ics205A,
    #[serde(rename = "ICS-206")]
    Ics206,
    #[serde(rename = "ICS-207")]
    Ics207,
    #[serde(rename = "ICS-208")]
    Ics208,
    #[serde(rename = "ICS-209")]
    Ics209,
    #[serde(rename = "ICS-210")]
    Ics210,
    #[serde(rename = "ICS-211")]
    Ics211,
    #[serde(rename = "ICS-213")]
    Ics213,
    #[serde(rename = "ICS-214")]
    Ics214,
    #[serde(rename = "ICS-215")]
    Ics215,
    #[serde(rename = "ICS-215A")]
    Ics215A,
    #[serde(rename = "ICS-218")]
    Ics218,
    #[serde(rename = "ICS-219")]
    Ics219,
    #[serde(rename = "ICS-220")]
    Ics220,
    #[serde(rename = "ICS-221")]
    Ics221,
    #[serde(rename = "ICS-225")]
    Ics225,
}

impl FormType {
    pub const ALL: [FormType; 21] = [
        FormType::Ics201,
        FormType::Ics202,
        FormType::Ics203,
        FormType::Ics204,
        FormType::Ics205,
        FormType::Ics205A,
        FormType::Ics206,
        FormType::Ics207,
        FormType::Ics208,
        FormType::Ics209,
        FormType::Ics210,
        FormType::Ics211,
        FormType::Ics213,
        FormType::Ics214,
        FormType::Ics215,
        FormType::Ics215A,
        FormType::Ics218,
        FormType::Ics219,
        FormType::Ics220,
        FormType::Ics221,
        FormType::Ics225,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FormType::Ics201 => "ICS-201",
            FormType::Ics202 => "ICS-202",
            FormType::Ics203 => "ICS-203",
            FormType::Ics204 => "ICS-204",
            FormType::Ics205 => "ICS-205",
            FormType::Ics205A => "ICS-205A",
            FormType::Ics206 => "ICS-206",
            FormType::Ics207 => "ICS-207",
            FormType::Ics208 => "ICS-208",
            FormType::Ics209 => "ICS-209",
            FormType::Ics210 => "ICS-210",
            FormType::Ics211 => "ICS-211",
            FormType::Ics213 => "ICS-213",
            FormType::Ics214 => "ICS-214",
            FormType::Ics215 => "ICS-215",
            FormType::Ics215A => "ICS-215A",
            FormType::Ics218 => "ICS-218",
            FormType::Ics219 => "ICS-219",
            FormType::Ics220 => "ICS-220",
            FormType::Ics221 => "ICS-221",
            FormType::Ics225 => "ICS-225",
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ICS form type: {0}")]
pub struct UnknownFormType(pub String);

impl FromStr for FormType {
    type Err = UnknownFormType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormType::ALL
            .iter()
            .copied()
            .find(|ty| ty.code() == s)
            .ok_or_else(|| UnknownFormType(s.to_string()))
    }
}

pub const DEFAULT_STATUS: &str = "draft";

/// One stored instance of a filled-in ICS form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FormRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional, type = "number")]
    pub id: Option<i64>,
    pub incident_name: String,
    pub form_type: FormType,
    #[serde(default = "default_status")]
    pub status: String,
    /// Serialized JSON payload of the form's fields.
    pub form_data: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub created_at: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub updated_at: i64,
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

impl FormRecord {
    /// True when two records carry the same content, ignoring store-assigned ids.
    pub fn same_content(&self, other: &FormRecord) -> bool {
        self.incident_name == other.incident_name
            && self.form_type == other.form_type
            && self.status == other.status
            && self.form_data == other.form_data
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
    }
}

pub const EXPORT_FORMAT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExportMetadata {
    pub version: String,
    pub exported_at: String,
    #[ts(type = "number")]
    pub form_count: usize,
}

/// A batch of form records plus descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExportBundle {
    pub metadata: ExportMetadata,
    pub forms: Vec<FormRecord>,
}

impl ExportBundle {
    pub fn new(forms: Vec<FormRecord>, exported_at: impl Into<String>) -> Self {
        Self {
            metadata: ExportMetadata {
                version: EXPORT_FORMAT_VERSION.to_string(),
                exported_at: exported_at.into(),
                form_count: forms.len(),
            },
            forms,
        }
    }
}
