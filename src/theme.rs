use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use ts_rs::TS;

use crate::db::write_atomic;

pub const THEME_KEY: &str = "theme";
pub const LIGHT_CLASS: &str = "theme-light";
pub const DARK_CLASS: &str = "theme-dark";
pub const ENV_PREFERS_DARK: &str = "ICS_FORMS_PREFERS_DARK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown theme: {0}")]
pub struct UnknownTheme(pub String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(UnknownTheme(other.to_string())),
        }
    }
}

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn save(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("preference store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("preference store lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Key-value preferences kept as a flat JSON object on disk.
///
/// The file is read on first access; `set` stages in memory and `save`
/// rewrites the whole file atomically.
struct JsonFileStore {
    path: PathBuf,
    data: Mutex<Option<Map<String, Value>>>,
}

impl JsonFileStore {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: Mutex::new(None),
        }
    }

    fn load(path: &Path) -> anyhow::Result<Map<String, Value>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read preferences {}", path.display()))
            }
        };
        match serde_json::from_slice::<Value>(&bytes)
            .with_context(|| format!("parse preferences {}", path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow!(
                "preferences file {} is not a JSON object",
                path.display()
            )),
        }
    }

    /// Run `f` against the loaded map. Reads surface load failures; writes
    /// replace an unreadable file with an empty map so the next save repairs it.
    fn with_data<T>(
        &self,
        recover: bool,
        f: impl FnOnce(&mut Map<String, Value>) -> T,
    ) -> anyhow::Result<T> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("preference store lock poisoned"))?;
        if guard.is_none() {
            let loaded = match Self::load(&self.path) {
                Ok(map) => map,
                Err(err) if recover => {
                    warn!(
                        target: "ics_forms",
                        event = "preferences_reset",
                        path = %self.path.display(),
                        error = %err
                    );
                    Map::new()
                }
                Err(err) => return Err(err),
            };
            *guard = Some(loaded);
        }
        let map = guard
            .as_mut()
            .ok_or_else(|| anyhow!("preferences not loaded"))?;
        Ok(f(map))
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.with_data(false, |map| map.get(key).and_then(|v| v.as_str().map(str::to_owned)))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.with_data(true, |map| {
            map.insert(key.to_string(), Value::from(value));
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let bytes = self.with_data(true, |map| serde_json::to_vec_pretty(map))??;
        write_atomic(&self.path, &bytes)
            .with_context(|| format!("write preferences {}", self.path.display()))
    }
}

#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn PreferenceStore>,
}

impl StoreHandle {
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(JsonFileStore::new(path.into())),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(MemoryStore::default()),
        }
    }

    pub fn from_store(store: Arc<dyn PreferenceStore>) -> Self {
        Self { inner: store }
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.set(key, value)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.inner.save()
    }
}

/// Stored preference, or `System` when missing, unrecognised or unreadable.
pub fn get_stored_theme(store: &StoreHandle) -> Theme {
    match store.get(THEME_KEY) {
        Ok(Some(raw)) => match raw.parse() {
            Ok(theme) => theme,
            Err(err) => {
                warn!(target: "ics_forms", event = "theme_invalid", value = %raw, error = %err);
                Theme::System
            }
        },
        Ok(None) => Theme::System,
        Err(err) => {
            warn!(target: "ics_forms", event = "theme_read_failed", error = %err);
            Theme::System
        }
    }
}

pub fn save_theme(store: &StoreHandle, theme: Theme) {
    let result = store
        .set(THEME_KEY, theme.as_str())
        .and_then(|()| store.save());
    match result {
        Ok(()) => info!(target: "ics_forms", event = "theme_saved", theme = %theme),
        Err(err) => warn!(
            target: "ics_forms",
            event = "theme_save_failed",
            theme = %theme,
            error = %err
        ),
    }
}

/// Source of the OS dark-mode signal. `None` means the platform cannot tell.
pub trait AppearanceProbe: Send + Sync {
    fn prefers_dark(&self) -> Option<bool>;
}

/// Reads `ICS_FORMS_PREFERS_DARK` first, then the `GTK_THEME` variant suffix.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvAppearance;

impl AppearanceProbe for EnvAppearance {
    fn prefers_dark(&self) -> Option<bool> {
        if let Ok(raw) = std::env::var(ENV_PREFERS_DARK) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "dark" => return Some(true),
                "0" | "false" | "no" | "light" => return Some(false),
                _ => {}
            }
        }
        std::env::var("GTK_THEME")
            .ok()
            .map(|gtk| gtk.to_ascii_lowercase().ends_with(":dark"))
    }
}

pub fn system_prefers_dark(probe: &dyn AppearanceProbe) -> bool {
    probe.prefers_dark().unwrap_or(false)
}

/// Resolve `System` to a concrete light or dark theme.
pub fn get_effective_theme(theme: Theme, probe: &dyn AppearanceProbe) -> Theme {
    match theme {
        Theme::System if system_prefers_dark(probe) => Theme::Dark,
        Theme::System => Theme::Light,
        concrete => concrete,
    }
}

/// Class list of the rendered document's root element.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentRoot {
    classes: BTreeSet<String>,
}

impl DocumentRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: &str) {
        self.classes.insert(class.to_string());
    }

    pub fn remove_class(&mut self, class: &str) {
        self.classes.remove(class);
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }
}

pub fn apply_theme(root: &mut DocumentRoot, theme: Theme) {
    root.remove_class(LIGHT_CLASS);
    root.remove_class(DARK_CLASS);
    match theme {
        Theme::Light => root.add_class(LIGHT_CLASS),
        Theme::Dark => root.add_class(DARK_CLASS),
        Theme::System => {}
    }
}

/// Current OS appearance plus change notifications.
///
/// Platform integrations push new readings through [`SystemAppearance::set_prefers_dark`].
#[derive(Clone)]
pub struct SystemAppearance {
    tx: Arc<watch::Sender<Option<bool>>>,
}

impl SystemAppearance {
    pub fn new(initial: Option<bool>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn detect() -> Self {
        Self::new(EnvAppearance.prefers_dark())
    }

    /// Returns true when the reading changed and listeners were notified.
    pub fn set_prefers_dark(&self, dark: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == Some(dark) {
                false
            } else {
                *current = Some(dark);
                true
            }
        })
    }

    fn subscribe(&self) -> watch::Receiver<Option<bool>> {
        self.tx.subscribe()
    }
}

impl AppearanceProbe for SystemAppearance {
    fn prefers_dark(&self) -> Option<bool> {
        *self.tx.borrow()
    }
}

/// Keeps a system theme listener registered until dropped or unsubscribed.
pub struct ThemeListener {
    task: Option<JoinHandle<()>>,
}

impl ThemeListener {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ThemeListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Invoke `callback` with the new dark-mode flag on every OS appearance change.
///
/// Must be called from within a tokio runtime.
pub fn setup_system_theme_listener<F>(appearance: &SystemAppearance, callback: F) -> ThemeListener
where
    F: Fn(bool) + Send + 'static,
{
    let mut rx = appearance.subscribe();
    let task = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let reading = *rx.borrow_and_update();
            if let Some(dark) = reading {
                callback(dark);
            }
        }
    });
    ThemeListener { task: Some(task) }
}
