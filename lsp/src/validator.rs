//! One validation pass: collect, compile, parse, map.

use tactls_types::{ValidationSettings, normalize_path};

use crate::collection::{ContractCollection, Overlay};
use crate::compiler::{Compiler, compile_collection};
use crate::diagnostics::{diagnostics_for, import_diagnostics};
use crate::documents::Document;
use crate::protocol::file_uri_to_path;
use crate::types::Diagnostic;

pub struct Validator<C> {
    compiler: C,
}

impl<C: Compiler> Validator<C> {
    pub fn new(compiler: C) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Diagnostics for `document` as it stands now.
    ///
    /// Documents without a local path (`untitled:` buffers) have nothing to
    /// compile against and get an empty list.
    pub async fn validate(
        &self,
        document: &Document,
        settings: &ValidationSettings,
        overlay: &Overlay,
    ) -> Vec<Diagnostic> {
        let Some(path) = file_uri_to_path(document.uri()) else {
            tracing::debug!(uri = %document.uri(), "Not a file URI; nothing to validate");
            return Vec::new();
        };
        let path = normalize_path(&path);

        let collection = ContractCollection::resolve(&path, document.text(), overlay).await;
        tracing::trace!(
            root = %path.display(),
            sources = collection.sources().len(),
            failures = collection.failures().len(),
            "Resolved contract collection"
        );

        let errors = compile_collection(&self.compiler, &collection).await;
        let mut diagnostics = diagnostics_for(&errors, &path);
        if settings.report_import_errors() {
            diagnostics.extend(import_diagnostics(&errors, &collection));
        }
        diagnostics
    }
}
