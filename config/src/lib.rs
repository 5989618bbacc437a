//! Configuration loading for the Tact language server.
//!
//! Settings are layered: built-in defaults, then the user file
//! (`<config dir>/tactls/config.toml`), then `tactls.toml` at the workspace
//! root. A later layer only overrides the keys it sets. Settings sent by the
//! editor at runtime are applied on top by the server, not here.
//!
//! ```toml
//! [validation]
//! enabled = true
//! delay_ms = 800
//! report_import_errors = false
//!
//! [compiler]
//! command = "npx"
//! args = ["tact", "--check", "{file}"]
//! timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tactls_types::{CompilerSettings, Settings, SettingsError};

/// Name of the per-workspace config file.
pub const WORKSPACE_CONFIG_FILE: &str = "tactls.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: SettingsError,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

// Raw layer: every key optional so a file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    validation: Option<ValidationTable>,
    compiler: Option<CompilerTable>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationTable {
    enabled: Option<bool>,
    delay_ms: Option<u64>,
    report_import_errors: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CompilerTable {
    command: Option<String>,
    args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

impl ConfigFile {
    fn apply(self, base: Settings) -> Result<Settings, SettingsError> {
        let mut settings = base;

        if let Some(table) = self.validation {
            let mut validation = settings.validation;
            if let Some(enabled) = table.enabled {
                validation = validation.with_live_check(enabled);
            }
            if let Some(report) = table.report_import_errors {
                validation = validation.with_report_import_errors(report);
            }
            if let Some(delay_ms) = table.delay_ms {
                validation = validation.with_delay_ms(delay_ms)?;
            }
            settings.validation = validation;
        }

        if let Some(table) = self.compiler {
            let current = &settings.compiler;
            settings.compiler = CompilerSettings::new(
                table
                    .command
                    .unwrap_or_else(|| current.command().to_string()),
                table.args.unwrap_or_else(|| current.args().to_vec()),
                table
                    .timeout_secs
                    .unwrap_or_else(|| current.timeout().as_secs()),
            )?;
        }

        Ok(settings)
    }
}

/// `<config dir>/tactls/config.toml`, if the platform has a config dir.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tactls").join("config.toml"))
}

#[must_use]
pub fn workspace_config_path(root: &Path) -> PathBuf {
    root.join(WORKSPACE_CONFIG_FILE)
}

/// Apply one TOML document on top of `base`.
pub fn parse_layer(content: &str, path: &Path, base: Settings) -> Result<Settings, ConfigError> {
    let file: ConfigFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.apply(base).map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply the file at `path` on top of `base`. A missing file is not an error
/// and returns `base` unchanged.
pub fn load_layer(path: &Path, base: Settings) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(base);
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_layer(&content, path, base)
}

/// Resolve settings from every layer that applies.
///
/// A layer that fails to load is logged and skipped; the server always starts
/// with usable settings.
#[must_use]
pub fn load(workspace_root: Option<&Path>) -> Settings {
    let layers = user_config_path()
        .into_iter()
        .chain(workspace_root.map(workspace_config_path));
    load_from(layers)
}

/// Same as [`load`] over an explicit list of files, lowest precedence first.
#[must_use]
pub fn load_from(layers: impl IntoIterator<Item = PathBuf>) -> Settings {
    let mut settings = Settings::default();
    for path in layers {
        match load_layer(&path, settings.clone()) {
            Ok(next) => {
                if path.exists() {
                    tracing::debug!(path = %path.display(), "Applied config layer");
                }
                settings = next;
            }
            Err(e) => {
                tracing::warn!("{e}; ignoring this config file");
            }
        }
    }
    settings
}
