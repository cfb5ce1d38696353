use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;

pub const APP_IDENTIFIER: &str = "com.icsforms.app";
pub const DB_FILE_NAME: &str = "ics-forms.sqlite3";
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";
pub const LOG_DIR_NAME: &str = "logs";

pub const ENV_FAKE_APPDATA: &str = "ICS_FORMS_FAKE_APPDATA";
pub const ENV_DB_PATH: &str = "ICS_FORMS_DB";
pub const ENV_LOG_FILTER: &str = "ICS_FORMS_LOG";
pub const DEFAULT_LOG_FILTER: &str = "ics_forms=info,sqlx=warn";

/// Locations the application reads and writes, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppConfig {
    /// Resolve from the environment, falling back to the platform data directory.
    pub fn from_env() -> Result<Self> {
        let data_dir = match env::var_os(ENV_FAKE_APPDATA) {
            Some(fake) => PathBuf::from(fake),
            None => dirs::data_dir()
                .or_else(|| env::current_dir().ok())
                .ok_or_else(|| anyhow::anyhow!("failed to resolve application data directory"))?
                .join(APP_IDENTIFIER),
        };
        let db_path = env::var_os(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));
        Ok(Self { data_dir, db_path })
    }

    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            data_dir,
        }
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn default_backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

pub fn log_filter() -> String {
    env::var(ENV_LOG_FILTER).unwrap_or_else(|_| DEFAULT_LOG_FILTER.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_layout() {
        let cfg = AppConfig::with_data_dir("/tmp/ics");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/ics").join(DB_FILE_NAME));
        assert_eq!(cfg.preferences_path(), PathBuf::from("/tmp/ics/preferences.json"));
        assert_eq!(cfg.log_dir(), PathBuf::from("/tmp/ics/logs"));
        assert_eq!(cfg.default_backup_dir(), PathBuf::from("/tmp/ics/backups"));
    }
}
