use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

const APP_DIR: &str = "wc26_predictor";
const DB_FILE: &str = "predictor.sqlite";
pub const DB_ENV: &str = "WC26_PREDICTOR_DB";
pub const LOG_ENV: &str = "WC26_PREDICTOR_LOG";
const DEFAULT_LOG_FILTER: &str = "wc26_predictor=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Settings {
    /// Database path priority: explicit flag, then `WC26_PREDICTOR_DB`, then the
    /// per-user data directory.
    pub fn resolve(db_flag: Option<&Path>) -> Result<Self> {
        let db_path = match db_flag {
            Some(path) => path.to_path_buf(),
            None => env_path(DB_ENV)
                .or_else(default_db_path)
                .ok_or_else(|| {
                    EngineError::Config(format!(
                        "no database path: pass --db, set {DB_ENV}, or set HOME"
                    ))
                })?,
        };
        let log_filter = std::env::var(LOG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Ok(Self {
            db_path,
            log_filter,
        })
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join(APP_DIR).join(DB_FILE))
}

fn data_dir() -> Option<PathBuf> {
    if let Some(base) = env_path("XDG_DATA_HOME") {
        return Some(base);
    }
    let home = env_path("HOME")?;
    Some(home.join(".local").join("share"))
}

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}
