use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use ics_forms_lib::commands::SqliteBackend;
use ics_forms_lib::config::AppConfig;
use ics_forms_lib::db::{backup, write_atomic};
use ics_forms_lib::service::FormService;
use ics_forms_lib::theme::{self, Theme};
use ics_forms_lib::AppState;

#[derive(Debug, Parser)]
#[command(name = "ics-forms", about = "ICS incident form store", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create, query and exchange incident forms.
    #[command(subcommand)]
    Forms(FormsCommand),
    /// Whole-store snapshots.
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Appearance preference.
    #[command(subcommand)]
    Theme(ThemeCommand),
}

#[derive(Debug, Args)]
struct FormDataArg {
    /// Form payload as a JSON string.
    #[arg(long, conflicts_with = "data_file", required_unless_present = "data_file")]
    data: Option<String>,
    /// Read the form payload from a file.
    #[arg(long)]
    data_file: Option<PathBuf>,
}

impl FormDataArg {
    fn read(self) -> Result<String> {
        match (self.data, self.data_file) {
            (Some(data), _) => Ok(data),
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("read form data from {}", path.display())),
            (None, None) => anyhow::bail!("either --data or --data-file is required"),
        }
    }
}

#[derive(Debug, Subcommand)]
enum FormsCommand {
    /// Save a new form and print its id.
    Save {
        #[arg(long)]
        incident: String,
        /// Form type code, e.g. ICS-201.
        #[arg(long = "type")]
        form_type: String,
        #[command(flatten)]
        data: FormDataArg,
    },
    /// Print one form as JSON.
    Get { id: i64 },
    /// List forms whose incident name contains the filter.
    Search {
        #[arg(long)]
        incident: Option<String>,
    },
    /// Replace the payload of an existing form.
    Update {
        id: i64,
        #[command(flatten)]
        data: FormDataArg,
    },
    /// Print every form as JSON.
    List,
    Delete { id: i64 },
    /// Export every form as a bundle.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export a single form as JSON.
    ExportOne {
        id: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a bundle file.
    Import { file: PathBuf },
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// Write a backup; defaults to a timestamped file in the data directory.
    Create { path: Option<PathBuf> },
    /// Replace the store with the contents of a backup.
    Restore { path: PathBuf },
    /// Summarise the backups found in a directory.
    List { dir: Option<PathBuf> },
    /// Describe one backup file.
    Info { path: PathBuf },
}

#[derive(Debug, Subcommand)]
enum ThemeCommand {
    Get,
    Set {
        #[arg(value_parser = parse_theme)]
        theme: Theme,
    },
    /// Print the theme after resolving `system`.
    Effective,
}

fn parse_theme(raw: &str) -> std::result::Result<Theme, String> {
    raw.parse().map_err(|err: theme::UnknownTheme| err.to_string())
}

fn main() {
    let cli = Cli::parse();
    let code = match AppConfig::from_env() {
        Ok(config) => {
            if ics_forms_lib::init_file_logging(&config.log_dir()).is_err() {
                ics_forms_lib::init_logging();
            }
            match run(cli.command, config) {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("Error: {err:#}");
                    1
                }
            }
        }
        Err(err) => {
            ics_forms_lib::init_logging();
            eprintln!("Error: {err:#}");
            1
        }
    };
    process::exit(code);
}

fn run(command: Commands, config: AppConfig) -> Result<()> {
    if let Commands::Theme(cmd) = command {
        return handle_theme(cmd, &config);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    runtime.block_on(async move {
        let state = AppState::open(config).await?;
        let service = state.form_service();
        let result = match command {
            Commands::Forms(cmd) => handle_forms(&service, cmd).await,
            Commands::Backup(cmd) => handle_backup(&service, cmd, &state).await,
            Commands::Theme(_) => Ok(()),
        };
        state.pool.close().await;
        result
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serialize output")?
    );
    Ok(())
}

fn emit(text: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            write_atomic(path, text.as_bytes())
                .with_context(|| format!("write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

async fn handle_forms(service: &FormService<SqliteBackend>, command: FormsCommand) -> Result<()> {
    match command {
        FormsCommand::Save {
            incident,
            form_type,
            data,
        } => {
            let data = data.read()?;
            let id = service.save_form(&incident, &form_type, &data).await?;
            println!("{id}");
        }
        FormsCommand::Get { id } => match service.get_form(id).await? {
            Some(form) => print_json(&form)?,
            None => anyhow::bail!("form {id} not found"),
        },
        FormsCommand::Search { incident } => {
            print_json(&service.search_forms(incident.as_deref()).await?)?
        }
        FormsCommand::Update { id, data } => {
            let data = data.read()?;
            service.update_form(id, &data).await?;
            println!("Updated form {id}");
        }
        FormsCommand::List => print_json(&service.get_all_forms().await?)?,
        FormsCommand::Delete { id } => {
            if service.delete_form(id).await? {
                println!("Deleted form {id}");
            } else {
                println!("No form with id {id}");
            }
        }
        FormsCommand::Export { out } => {
            let json = service.export_forms_json().await?;
            emit(&json, out.as_deref())?;
        }
        FormsCommand::ExportOne { id, out } => {
            let json = service.export_form_json(id).await?;
            emit(&json, out.as_deref())?;
        }
        FormsCommand::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("read bundle {}", file.display()))?;
            println!("{}", service.import_forms_json(&json).await?);
        }
    }
    Ok(())
}

async fn handle_backup(
    service: &FormService<SqliteBackend>,
    command: BackupCommand,
    state: &AppState,
) -> Result<()> {
    let backup_dir = state.config.default_backup_dir();
    match command {
        BackupCommand::Create { path } => {
            let path = path.unwrap_or_else(|| backup_dir.join(backup::default_backup_file_name()));
            println!("{}", service.create_backup(&path.to_string_lossy()).await?);
        }
        BackupCommand::Restore { path } => {
            println!("{}", service.restore_backup(&path.to_string_lossy()).await?);
        }
        BackupCommand::List { dir } => {
            let dir = dir.unwrap_or(backup_dir);
            let lines = service.list_backups(&dir.to_string_lossy()).await?;
            if lines.is_empty() {
                println!("No backups in {}", dir.display());
            }
            for line in lines {
                println!("{line}");
            }
        }
        BackupCommand::Info { path } => {
            println!("{}", service.get_backup_info(&path.to_string_lossy()).await?);
        }
    }
    Ok(())
}

fn handle_theme(command: ThemeCommand, config: &AppConfig) -> Result<()> {
    let store = theme::StoreHandle::json_file(config.preferences_path());
    match command {
        ThemeCommand::Get => println!("{}", theme::get_stored_theme(&store)),
        ThemeCommand::Set { theme: chosen } => {
            theme::save_theme(&store, chosen);
            println!("{}", theme::get_stored_theme(&store));
        }
        ThemeCommand::Effective => {
            let stored = theme::get_stored_theme(&store);
            println!(
                "{}",
                theme::get_effective_theme(stored, &theme::EnvAppearance)
            );
        }
    }
    Ok(())
}
