//! Resolved configuration types shared across crates.
//!
//! These types represent fully-validated settings. Each deserializes through a
//! private raw struct and `#[serde(try_from)]`, so holding a value is proof
//! that its invariants were checked at the parse boundary.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default quiet period between an edit or save and the validation it triggers.
pub const DEFAULT_VALIDATION_DELAY_MS: u64 = 1500;

/// Upper bound for the validation delay. Anything longer is a typo.
pub const MAX_VALIDATION_DELAY_MS: u64 = 60_000;

pub const DEFAULT_COMPILER_COMMAND: &str = "tact";

pub const DEFAULT_COMPILER_TIMEOUT_SECS: u64 = 30;

/// Placeholder in compiler arguments replaced by the file being compiled.
pub const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("validation delay {0}ms exceeds the maximum of {MAX_VALIDATION_DELAY_MS}ms")]
    DelayTooLarge(u64),
    #[error("compiler command must not be empty")]
    EmptyCommand,
    #[error("compiler timeout must be at least one second")]
    ZeroTimeout,
}

// ============================================================================
// Validation
// ============================================================================

const fn default_delay_ms() -> u64 {
    DEFAULT_VALIDATION_DELAY_MS
}

#[derive(Deserialize)]
struct RawValidationSettings {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_delay_ms")]
    delay_ms: u64,
    #[serde(default)]
    report_import_errors: bool,
}

/// When and how documents are validated.
///
/// Invariant: `delay <= MAX_VALIDATION_DELAY_MS`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawValidationSettings")]
pub struct ValidationSettings {
    live_check: bool,
    delay: Duration,
    report_import_errors: bool,
}

impl TryFrom<RawValidationSettings> for ValidationSettings {
    type Error = SettingsError;

    fn try_from(raw: RawValidationSettings) -> Result<Self, Self::Error> {
        Self::default()
            .with_live_check(raw.enabled)
            .with_report_import_errors(raw.report_import_errors)
            .with_delay_ms(raw.delay_ms)
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            live_check: false,
            delay: Duration::from_millis(DEFAULT_VALIDATION_DELAY_MS),
            report_import_errors: false,
        }
    }
}

impl ValidationSettings {
    /// Whether documents are compiled as they are opened, edited and saved.
    /// When false every validation is a no-op.
    #[must_use]
    pub fn live_check(&self) -> bool {
        self.live_check
    }

    /// Debounce applied to save- and change-triggered validations.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether errors in imported files are surfaced on the importing line.
    #[must_use]
    pub fn report_import_errors(&self) -> bool {
        self.report_import_errors
    }

    #[must_use]
    pub fn with_live_check(mut self, live_check: bool) -> Self {
        self.live_check = live_check;
        self
    }

    #[must_use]
    pub fn with_report_import_errors(mut self, report: bool) -> Self {
        self.report_import_errors = report;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Result<Self, SettingsError> {
        if delay_ms > MAX_VALIDATION_DELAY_MS {
            return Err(SettingsError::DelayTooLarge(delay_ms));
        }
        self.delay = Duration::from_millis(delay_ms);
        Ok(self)
    }
}

// ============================================================================
// Compiler
// ============================================================================

fn default_command() -> String {
    DEFAULT_COMPILER_COMMAND.to_string()
}

fn default_args() -> Vec<String> {
    vec!["--check".to_string(), FILE_PLACEHOLDER.to_string()]
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_COMPILER_TIMEOUT_SECS
}

#[derive(Deserialize)]
struct RawCompilerSettings {
    #[serde(default = "default_command")]
    command: String,
    #[serde(default = "default_args")]
    args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

/// How the external compiler is invoked.
///
/// Invariant: `command` is non-empty and `timeout` is at least one second.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCompilerSettings")]
pub struct CompilerSettings {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl TryFrom<RawCompilerSettings> for CompilerSettings {
    type Error = SettingsError;

    fn try_from(raw: RawCompilerSettings) -> Result<Self, Self::Error> {
        Self::new(raw.command, raw.args, raw.timeout_secs)
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            timeout: Duration::from_secs(DEFAULT_COMPILER_TIMEOUT_SECS),
        }
    }
}

impl CompilerSettings {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        timeout_secs: u64,
    ) -> Result<Self, SettingsError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(SettingsError::EmptyCommand);
        }
        if timeout_secs == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        Ok(Self {
            command,
            args,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arguments for compiling `file`: every `{file}` placeholder is replaced,
    /// and the path is appended when no argument mentions it.
    #[must_use]
    pub fn args_for(&self, file: &Path) -> Vec<String> {
        let file = file.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(FILE_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(FILE_PLACEHOLDER, &file)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(file.into_owned());
        }
        args
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Everything the server needs to know about its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub compiler: CompilerSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_defaults() {
        let settings: ValidationSettings = serde_json::from_str("{}").unwrap();
        assert!(!settings.live_check());
        assert_eq!(settings.delay(), Duration::from_millis(1500));
        assert!(!settings.report_import_errors());
    }

    #[test]
    fn validation_rejects_absurd_delay() {
        let json = serde_json::json!({ "enabled": true, "delay_ms": 3_600_000 });
        assert!(serde_json::from_value::<ValidationSettings>(json).is_err());
        assert_eq!(
            ValidationSettings::default().with_delay_ms(60_001),
            Err(SettingsError::DelayTooLarge(60_001))
        );
    }

    #[test]
    fn validation_zero_delay_is_allowed() {
        let settings = ValidationSettings::default().with_delay_ms(0).unwrap();
        assert_eq!(settings.delay(), Duration::ZERO);
    }

    #[test]
    fn compiler_defaults_check_the_file() {
        let compiler = CompilerSettings::default();
        assert_eq!(compiler.command(), "tact");
        assert_eq!(
            compiler.args_for(Path::new("/p/main.tact")),
            ["--check", "/p/main.tact"]
        );
        assert_eq!(compiler.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn compiler_rejects_empty_command() {
        let json = serde_json::json!({ "command": "  " });
        assert!(serde_json::from_value::<CompilerSettings>(json).is_err());
    }

    #[test]
    fn compiler_rejects_zero_timeout() {
        assert_eq!(
            CompilerSettings::new("tact", vec![], 0),
            Err(SettingsError::ZeroTimeout)
        );
    }

    #[test]
    fn args_without_placeholder_get_file_appended() {
        let compiler = CompilerSettings::new("npx", vec!["tact".into()], 5).unwrap();
        assert_eq!(
            compiler.args_for(Path::new("/p/a.tact")),
            ["tact", "/p/a.tact"]
        );
    }

    #[test]
    fn placeholder_inside_argument_is_substituted() {
        let compiler = CompilerSettings::new("tact", vec!["--entry={file}".into()], 5).unwrap();
        assert_eq!(
            compiler.args_for(Path::new("/p/a.tact")),
            ["--entry=/p/a.tact"]
        );
    }

    #[test]
    fn settings_sections_default_independently() {
        let json = serde_json::json!({ "validation": { "enabled": true } });
        let settings: Settings = serde_json::from_value(json).unwrap();
        assert!(settings.validation.live_check());
        assert_eq!(settings.compiler, CompilerSettings::default());
    }
}
