//! Core domain types for the Tact language server.
//!
//! This crate contains the records the validation pipeline passes between its
//! stages (sources, compile requests, parsed compiler errors) and the resolved
//! settings shared by the config loader and the server. No IO, no async.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod path;
pub mod settings;

pub use path::normalize_path;
pub use settings::{CompilerSettings, Settings, SettingsError, ValidationSettings};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension of Tact source files, without the leading dot.
pub const SOURCE_EXTENSION: &str = "tact";

/// Width of a diagnostic span when the compiler output does not show one.
pub const DEFAULT_ERROR_LENGTH: u32 = 2;

/// Whether `path` carries the Tact source extension.
#[must_use]
pub fn is_source_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
}

// ============================================================================
// Severity
// ============================================================================

/// Severity of a compiler error or diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl Severity {
    /// LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    #[must_use]
    pub fn lsp_code(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Sources and compile requests
// ============================================================================

/// One file needed for a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSource {
    path: PathBuf,
    text: String,
}

impl ContractSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The immutable input of one compilation: every source the root needs, keyed
/// by absolute path, plus the files diagnostics should be produced for.
///
/// Built fresh for each validation pass and never mutated afterwards, so a
/// request can be handed to the compiler while the editor keeps changing the
/// document it came from.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    sources: BTreeMap<PathBuf, String>,
    targets: Vec<PathBuf>,
}

impl CompileRequest {
    /// A request whose only compile target is `root`.
    ///
    /// `sources` should contain the root itself; later duplicates of a path
    /// replace earlier ones.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, sources: impl IntoIterator<Item = ContractSource>) -> Self {
        Self::with_targets(sources, vec![root.into()])
    }

    #[must_use]
    pub fn with_targets(
        sources: impl IntoIterator<Item = ContractSource>,
        targets: Vec<PathBuf>,
    ) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|source| (source.path, source.text))
                .collect(),
            targets,
        }
    }

    /// A request for a single file with no imports.
    #[must_use]
    pub fn single(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(path.clone(), [ContractSource::new(path, text)])
    }

    #[must_use]
    pub fn sources(&self) -> &BTreeMap<PathBuf, String> {
        &self.sources
    }

    #[must_use]
    pub fn text(&self, path: &Path) -> Option<&str> {
        self.sources.get(path).map(String::as_str)
    }

    /// Files the compiler is invoked for. Diagnostics for other files in the
    /// request only appear when the compiler attributes errors to them.
    #[must_use]
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }
}

// ============================================================================
// Parsed compiler errors
// ============================================================================

/// A compiler error with a position inside one source file.
///
/// Invariant: `line >= 1` and `column >= 1` (both 1-based). The constructor
/// clamps zero to one so no caller can build a record that would map to a
/// negative editor position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedError {
    file: PathBuf,
    severity: Severity,
    line: u32,
    column: u32,
    length: u32,
    message: String,
}

impl ParsedError {
    #[must_use]
    pub fn new(
        file: impl Into<PathBuf>,
        severity: Severity,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            severity,
            line: line.max(1),
            column: column.max(1),
            length: DEFAULT_ERROR_LENGTH,
            message: message.into(),
        }
    }

    /// An error whose position is unknown, pinned to the start of the file.
    #[must_use]
    pub fn at_file_start(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(file, Severity::Error, 1, 1, message)
    }

    /// Override the highlighted span width. Zero is treated as one.
    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length.max(1);
        self
    }

    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// 1-based line.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column.
    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_lsp_codes() {
        assert_eq!(Severity::Error.lsp_code(), 1);
        assert_eq!(Severity::Warning.lsp_code(), 2);
        assert_eq!(Severity::Information.lsp_code(), 3);
        assert_eq!(Severity::Hint.lsp_code(), 4);
    }

    #[test]
    fn parsed_error_clamps_position_to_one() {
        let err = ParsedError::new("a.tact", Severity::Error, 0, 0, "boom");
        assert_eq!(err.line(), 1);
        assert_eq!(err.column(), 1);
        assert_eq!(err.length(), DEFAULT_ERROR_LENGTH);
    }

    #[test]
    fn parsed_error_length_never_zero() {
        let err = ParsedError::at_file_start("a.tact", "boom").with_length(0);
        assert_eq!(err.length(), 1);
    }

    #[test]
    fn compile_request_targets_root_by_default() {
        let request = CompileRequest::new(
            "/p/main.tact",
            [
                ContractSource::new("/p/main.tact", "import \"./lib\";"),
                ContractSource::new("/p/lib.tact", "trait T {}"),
            ],
        );
        assert_eq!(request.targets(), [PathBuf::from("/p/main.tact")]);
        assert_eq!(request.sources().len(), 2);
        assert_eq!(request.text(Path::new("/p/lib.tact")), Some("trait T {}"));
        assert!(request.text(Path::new("/p/other.tact")).is_none());
    }

    #[test]
    fn source_extension_check() {
        assert!(is_source_file(Path::new("/p/main.tact")));
        assert!(!is_source_file(Path::new("/p/main.fc")));
        assert!(!is_source_file(Path::new("/p/tact")));
    }
}
