//! Parsed compiler errors to editor diagnostics.

use std::collections::HashSet;
use std::path::Path;

use tactls_types::{ParsedError, normalize_path};

use crate::collection::ContractCollection;
use crate::types::{Diagnostic, Range};

/// Convert one error. Positions go from 1-based to 0-based; the span covers
/// `length` characters from the error column.
#[must_use]
pub fn to_diagnostic(error: &ParsedError) -> Diagnostic {
    let line = error.line() - 1;
    let start = error.column() - 1;
    Diagnostic::new(
        Range::on_line(line, start, start.saturating_add(error.length())),
        error.severity(),
        error.message(),
    )
}

/// Diagnostics for the errors located in `target`. Errors in any other file
/// are dropped; paths are compared after normalization.
#[must_use]
pub fn diagnostics_for(errors: &[ParsedError], target: &Path) -> Vec<Diagnostic> {
    let target = normalize_path(target);
    errors
        .iter()
        .filter(|error| normalize_path(error.file()) == target)
        .map(to_diagnostic)
        .collect()
}

/// One diagnostic per imported file that has errors, placed on the root's
/// import statement through which that file was reached.
#[must_use]
pub fn import_diagnostics(errors: &[ParsedError], collection: &ContractCollection) -> Vec<Diagnostic> {
    let root = collection.root();
    let mut reported = HashSet::new();
    let mut diagnostics = Vec::new();

    for error in errors {
        let file = normalize_path(error.file());
        if file == root || reported.contains(&file) {
            continue;
        }
        let Some(site) = collection.import_site(&file) else {
            continue;
        };
        diagnostics.push(Diagnostic::new(
            site.path_range(),
            error.severity(),
            format!(
                "{}:{}:{}: {}",
                file.display(),
                error.line(),
                error.column(),
                error.message()
            ),
        ));
        reported.insert(file);
    }
    diagnostics
}
