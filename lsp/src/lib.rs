//! Tact language server: document sync, the validation pipeline, and the
//! JSON-RPC plumbing that connects them to the editor.
//!
//! A validation pass resolves the contract collection reachable from a
//! document's imports, compiles it, parses the compiler's errors and maps
//! them to diagnostics for the document. [`ValidationScheduler`] decides when
//! passes run and which results are still worth publishing.

pub mod codec;
pub mod collection;
pub mod compiler;
pub mod diagnostics;
pub mod error_parser;
pub mod scheduler;
pub mod types;

pub(crate) mod protocol;

mod command;
mod documents;
mod features;
mod server;
mod validator;

use tactls_types::CompilerSettings;

pub use collection::{ContractCollection, Overlay};
pub use command::CommandCompiler;
pub use compiler::{Compiler, CompilerFault};
pub use documents::{Document, DocumentStore};
pub use features::{LanguageFeatures, TactFeatures};
pub use protocol::{PathToUriError, file_uri_to_path, path_to_file_uri};
pub use scheduler::{DiagnosticsSink, ValidationScheduler};
pub use server::{ServeOutcome, Server};
pub use validator::Validator;

/// Serve one editor over stdin/stdout, compiling with the configured external
/// command.
pub async fn serve_stdio() -> anyhow::Result<ServeOutcome> {
    Server::new(
        |settings: &CompilerSettings| CommandCompiler::new(settings.clone()),
        TactFeatures,
    )
    .serve(tokio::io::stdin(), tokio::io::stdout())
    .await
}
