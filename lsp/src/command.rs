//! Compiler backend that runs an external command, `tact --check {file}` by
//! default.
//!
//! The editor's buffers are usually ahead of the disk, so the command never
//! sees the real files. Every source in the request is written to a scratch
//! directory that mirrors the layout below the sources' common ancestor, the
//! command runs there, and scratch paths in its output are mapped back.

use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tactls_types::{CompileRequest, CompilerSettings, ParsedError, Severity};
use tempfile::TempDir;
use tokio::process::Command;

use crate::compiler::{Compiler, CompilerFault};
use crate::error_parser::COMPILATION_FAILED;

/// `<file>.tact:<line>:<col>: <message>` as printed by the Tact CLI.
static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)((?:[A-Za-z]:)?[^\s:]+\.(?:tact|fc)):([0-9]+):([0-9]+):?[ \t]*(.*)$")
        .expect("valid compiler location regex")
});

pub struct CommandCompiler {
    settings: CompilerSettings,
}

impl CommandCompiler {
    #[must_use]
    pub fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }
}

/// Sources of one compilation, written out to a temporary directory that is
/// removed on drop.
struct Scratch {
    dir: TempDir,
    base: PathBuf,
}

impl Scratch {
    async fn materialize(request: &CompileRequest) -> std::io::Result<Self> {
        let base = common_ancestor(request.sources().keys());
        let dir = tempfile::Builder::new().prefix("tactls-").tempdir()?;
        for (path, text) in request.sources() {
            let dest = dir.path().join(relative_to(path, &base));
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, text).await?;
        }
        Ok(Self { dir, base })
    }

    fn path_for(&self, real: &Path) -> PathBuf {
        self.dir.path().join(relative_to(real, &self.base))
    }

    /// Rewrite scratch paths in compiler output to the real paths.
    fn restore(&self, output: &str) -> String {
        let scratch = with_trailing_separator(self.dir.path());
        let base = with_trailing_separator(&self.base);
        output.replace(&scratch, &base)
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

fn with_trailing_separator(path: &Path) -> String {
    let text = path.to_string_lossy();
    if text.ends_with(MAIN_SEPARATOR_STR) {
        text.into_owned()
    } else {
        format!("{text}{MAIN_SEPARATOR_STR}")
    }
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
    }
}

/// Deepest directory containing every path.
fn common_ancestor<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> PathBuf {
    let mut paths = paths.into_iter();
    let Some(first) = paths.next() else {
        return PathBuf::new();
    };
    let mut base = first.parent().map(Path::to_path_buf).unwrap_or_default();
    for path in paths {
        while !path.starts_with(&base) {
            if !base.pop() {
                break;
            }
        }
    }
    base
}

/// Errors the output attributes to specific files, if any.
fn locate(output: &str, base: &Path) -> Vec<ParsedError> {
    let fallback = output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or(COMPILATION_FAILED);

    LOCATION
        .captures_iter(output)
        .filter_map(|captures| {
            let file = Path::new(captures.get(1)?.as_str());
            let file = if file.is_absolute() {
                file.to_path_buf()
            } else {
                base.join(file)
            };
            let line = captures[2].parse().ok()?;
            let column = captures[3].parse().ok()?;
            let message = captures[4].trim();
            let message = if message.is_empty() { fallback } else { message };
            Some(ParsedError::new(
                tactls_types::normalize_path(&file),
                Severity::Error,
                line,
                column,
                message,
            ))
        })
        .collect()
}

impl Compiler for CommandCompiler {
    async fn compile(&self, request: &CompileRequest, target: &Path) -> Result<(), CompilerFault> {
        let command = self.settings.command();
        let program = which::which(command).map_err(|e| {
            CompilerFault::Trace(format!("compiler `{command}` not found in PATH: {e}"))
        })?;

        let scratch = Scratch::materialize(request).await.map_err(|e| {
            CompilerFault::Trace(format!("failed to prepare sources for compilation: {e}"))
        })?;
        let file = scratch.path_for(target);

        let mut cmd = Command::new(&program);
        cmd.args(self.settings.args_for(&file))
            .current_dir(scratch.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %program.display(),
            target = %target.display(),
            "Running compiler"
        );

        let output = tokio::time::timeout(self.settings.timeout(), cmd.output())
            .await
            .map_err(|_| {
                CompilerFault::Trace(format!(
                    "compiler timed out after {}s",
                    self.settings.timeout().as_secs()
                ))
            })?
            .map_err(|e| CompilerFault::Trace(format!("failed to run `{command}`: {e}")))?;

        if output.status.success() {
            return Ok(());
        }

        let stream = if output.stderr.iter().all(u8::is_ascii_whitespace) {
            &output.stdout
        } else {
            &output.stderr
        };
        let text = scratch.restore(String::from_utf8_lossy(stream).trim_end());
        if text.trim().is_empty() {
            return Err(CompilerFault::Trace(format!(
                "`{command}` exited with {}",
                output.status
            )));
        }

        let located = locate(&text, &scratch.base);
        if located.is_empty() {
            Err(CompilerFault::Trace(text))
        } else {
            Err(CompilerFault::Located(located))
        }
    }
}
