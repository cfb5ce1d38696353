use std::sync::Arc;

use sqlx::SqlitePool;

use crate::commands::SqliteBackend;
use crate::config::AppConfig;
use crate::service::FormService;
use crate::theme::{StoreHandle, SystemAppearance};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub preferences: StoreHandle,
    pub appearance: SystemAppearance,
}

impl AppState {
    /// Open the form store and preference file described by `config`.
    pub async fn open(config: AppConfig) -> anyhow::Result<Self> {
        let pool = crate::db::open_sqlite_pool(&config.db_path).await?;
        let preferences = StoreHandle::json_file(config.preferences_path());
        Ok(Self {
            pool,
            config: Arc::new(config),
            preferences,
            appearance: SystemAppearance::detect(),
        })
    }

    pub fn backend(&self) -> SqliteBackend {
        SqliteBackend::new(self.pool.clone())
    }

    pub fn form_service(&self) -> FormService<SqliteBackend> {
        FormService::new(self.backend())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::{get_stored_theme, save_theme, Theme};
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_lays_out_data_dir() {
        let tmp = tempdir().unwrap();
        let state = AppState::open(AppConfig::with_data_dir(tmp.path()))
            .await
            .unwrap();
        assert!(state.config.db_path.exists());

        let id = state
            .form_service()
            .save_form("Harbor Spill", "ICS-214", "{}")
            .await
            .unwrap();
        assert!(id > 0);

        save_theme(&state.preferences, Theme::Dark);
        assert!(state.config.preferences_path().exists());
        assert_eq!(get_stored_theme(&state.preferences), Theme::Dark);
        state.pool.close().await;
    }
}
