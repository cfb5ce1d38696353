pub mod backend;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod repo;
pub mod service;
pub mod state;
pub mod theme;
pub mod time;
pub mod validation;

pub use backend::FormBackend;
pub use commands::SqliteBackend;
pub use error::{AppError, AppResult};
pub use logging::{init_file_logging, init_logging};
pub use model::{ExportBundle, FormRecord, FormType};
pub use service::FormService;
pub use state::AppState;
pub use theme::Theme;
