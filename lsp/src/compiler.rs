//! The compiler seam and the adapter that turns compile outcomes into
//! [`ParsedError`]s.
//!
//! A [`Compiler`] is handed the whole source mapping plus one target and
//! reports either success or a [`CompilerFault`]. The adapter owns everything
//! around that call: the extension gate, the `"<file>\n<message>"` raw format
//! fed to the error parser, and carrying on past failing targets.

use std::future::Future;
use std::path::Path;

use tactls_types::{CompileRequest, ParsedError, is_source_file};

use crate::collection::ContractCollection;
use crate::error_parser::parse_raw_result;

/// Reported for targets that are not Tact sources. The compiler is not run.
pub const EXTENSION_MISMATCH: &str = "Choose Tact source file (.tact).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerFault {
    /// Free-form output. Parsed as the trace of a raw result.
    Trace(String),
    /// Errors the backend already attributed to files and positions.
    Located(Vec<ParsedError>),
}

pub trait Compiler: Send + Sync + 'static {
    /// Compile `target` with every source in `request` visible to the
    /// compiler.
    fn compile(
        &self,
        request: &CompileRequest,
        target: &Path,
    ) -> impl Future<Output = Result<(), CompilerFault>> + Send;
}

/// The raw result string for a failure of `target`.
#[must_use]
pub fn raw_result(target: &Path, message: &str) -> String {
    format!("{}\n{message}", target.display())
}

/// Compile one target. An empty result means success.
pub async fn compile_target<C: Compiler>(
    compiler: &C,
    request: &CompileRequest,
    target: &Path,
) -> Vec<ParsedError> {
    if !is_source_file(target) {
        tracing::debug!(target = %target.display(), "Not a Tact source; skipping compilation");
        return parse_raw_result(&raw_result(target, EXTENSION_MISMATCH))
            .into_iter()
            .collect();
    }

    match compiler.compile(request, target).await {
        Ok(()) => Vec::new(),
        Err(CompilerFault::Trace(trace)) => {
            tracing::debug!(target = %target.display(), "Compilation failed");
            parse_raw_result(&raw_result(target, &trace))
                .into_iter()
                .collect()
        }
        Err(CompilerFault::Located(errors)) => {
            tracing::debug!(
                target = %target.display(),
                count = errors.len(),
                "Compilation failed"
            );
            errors
        }
    }
}

/// Compile every target of `request` in order. A failing target never stops
/// the ones after it.
pub async fn compile_request<C: Compiler>(
    compiler: &C,
    request: &CompileRequest,
) -> Vec<ParsedError> {
    let mut errors = Vec::new();
    for target in request.targets() {
        errors.extend(compile_target(compiler, request, target).await);
    }
    errors
}

/// Errors for a resolved collection: its import failures followed by whatever
/// compiling the root produces.
pub async fn compile_collection<C: Compiler>(
    compiler: &C,
    collection: &ContractCollection,
) -> Vec<ParsedError> {
    let mut errors: Vec<ParsedError> = collection
        .failures()
        .iter()
        .map(crate::collection::ResolveFailure::to_parsed_error)
        .collect();
    errors.extend(compile_request(compiler, &collection.to_compile_request()).await);
    errors
}
