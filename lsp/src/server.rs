//! The server loop: read frames from the editor, dispatch them, and write
//! replies and notifications through a single writer task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tactls_types::{CompilerSettings, Settings, normalize_path};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use url::Url;

use crate::codec::{FrameReader, FrameWriter};
use crate::compiler::Compiler;
use crate::documents::{Document, DocumentStore};
use crate::features::LanguageFeatures;
use crate::protocol::{
    self, DidChangeConfigurationParams, DidChangeParams, DidCloseParams, DidOpenParams,
    DidSaveParams, INVALID_REQUEST, InitializeParams, LOG_INFO, LogMessageParams,
    METHOD_NOT_FOUND, Notification, PARSE_ERROR, PublishDiagnosticsParams, Response,
    ResponseError, SERVER_NOT_INITIALIZED, TextDocumentPositionParams,
};
use crate::scheduler::{DiagnosticsSink, ValidationScheduler};
use crate::types::Diagnostic;
use crate::validator::Validator;

const WRITER_CHANNEL_CAPACITY: usize = 64;

const CREATED_MESSAGE: &str = "Tact language server is created.";

enum WriterCommand {
    Send(Value),
    Shutdown,
}

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// `exit` after `shutdown`.
    Exited,
    /// `exit` without a preceding `shutdown`.
    ExitedWithoutShutdown,
    /// The editor closed the input stream.
    Disconnected,
}

impl ServeOutcome {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            ServeOutcome::Exited => 0,
            ServeOutcome::ExitedWithoutShutdown | ServeOutcome::Disconnected => 1,
        }
    }
}

/// Outgoing half of the connection. Clones share the writer task.
#[derive(Clone)]
struct Client {
    tx: mpsc::Sender<WriterCommand>,
}

impl Client {
    async fn send(&self, message: impl Serialize) {
        let frame = match serde_json::to_value(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode outgoing message: {e}");
                return;
            }
        };
        if self.tx.send(WriterCommand::Send(frame)).await.is_err() {
            tracing::trace!("Writer closed; dropping outgoing message");
        }
    }

    async fn respond(&self, id: Value, result: Result<Value, ResponseError>) {
        let response = match result {
            Ok(value) => Response::ok(id, value),
            Err(error) => Response::err(id, error),
        };
        self.send(response).await;
    }

    async fn notify<P: Serialize>(&self, method: &'static str, params: P) {
        self.send(Notification::new(method, params)).await;
    }

    async fn log_message(&self, message: &str) {
        self.notify(
            "window/logMessage",
            LogMessageParams {
                kind: LOG_INFO,
                message,
            },
        )
        .await;
    }
}

impl DiagnosticsSink for Client {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        tracing::debug!(%uri, count = diagnostics.len(), "Publishing diagnostics");
        self.notify(
            "textDocument/publishDiagnostics",
            PublishDiagnosticsParams {
                uri: &uri,
                diagnostics: &diagnostics,
            },
        )
        .await;
    }
}

type SettingsLoader = Box<dyn Fn(Option<&Path>) -> Settings + Send + Sync>;
type CompilerFactory<C> = Box<dyn Fn(&CompilerSettings) -> C + Send + Sync>;

/// A language server, ready to serve one editor connection.
///
/// Settings are read when the editor sends `initialize`, since only then is
/// the workspace root known. The compiler is built from those settings.
pub struct Server<C, F> {
    make_compiler: CompilerFactory<C>,
    load_settings: SettingsLoader,
    features: F,
}

impl<C: Compiler, F: LanguageFeatures> Server<C, F> {
    pub fn new(
        make_compiler: impl Fn(&CompilerSettings) -> C + Send + Sync + 'static,
        features: F,
    ) -> Self {
        Self {
            make_compiler: Box::new(make_compiler),
            load_settings: Box::new(tactls_config::load),
            features,
        }
    }

    /// Replace the config-file lookup done at `initialize`.
    #[must_use]
    pub fn with_settings_loader(
        mut self,
        load_settings: impl Fn(Option<&Path>) -> Settings + Send + Sync + 'static,
    ) -> Self {
        self.load_settings = Box::new(load_settings);
        self
    }

    /// Serve until the editor sends `exit` or closes `input`.
    ///
    /// Malformed JSON gets a parse-error reply and the loop continues; broken
    /// framing or I/O failure ends it with an error.
    pub async fn serve<R, W>(self, input: R, output: W) -> Result<ServeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer = tokio::spawn(async move {
            let mut writer = FrameWriter::new(output);
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("LSP write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let mut connection = Connection {
            server: &self,
            client: Client { tx: tx.clone() },
            phase: Phase::Uninitialized,
        };
        let mut reader = FrameReader::new(input);

        let outcome = loop {
            match reader.read_frame().await {
                Ok(Some(frame)) => {
                    if let Some(outcome) = connection.dispatch(frame).await {
                        break Ok(outcome);
                    }
                }
                Ok(None) => {
                    tracing::info!("Editor closed the connection");
                    break Ok(ServeOutcome::Disconnected);
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Discarding malformed message: {e}");
                    connection
                        .client
                        .respond(
                            Value::Null,
                            Err(ResponseError::new(PARSE_ERROR, e.to_string())),
                        )
                        .await;
                }
                Err(e) => break Err(e).context("reading from the editor"),
            }
        };

        let _ = tx.send(WriterCommand::Shutdown).await;
        writer.await.context("LSP writer task failed")?;
        if let Ok(outcome) = &outcome {
            tracing::info!(?outcome, "Language server stopped");
        }
        outcome
    }
}

/// State built at `initialize`.
struct Session<C> {
    documents: Arc<DocumentStore>,
    scheduler: ValidationScheduler<C, Client>,
}

enum Phase<C> {
    Uninitialized,
    Running(Session<C>),
    ShutdownRequested,
}

struct Connection<'a, C, F> {
    server: &'a Server<C, F>,
    client: Client,
    phase: Phase<C>,
}

impl<C: Compiler, F: LanguageFeatures> Connection<'_, C, F> {
    /// Handle one frame. Returns the outcome once the editor sends `exit`.
    async fn dispatch(&mut self, frame: Value) -> Option<ServeOutcome> {
        match protocol::Incoming::classify(frame) {
            protocol::Incoming::Request { id, method, params } => {
                tracing::trace!(%method, "Request");
                let result = self.request(&method, params).await;
                self.client.respond(id, result).await;
                None
            }
            protocol::Incoming::Notification { method, params } => {
                tracing::trace!(%method, "Notification");
                self.notification(&method, params).await
            }
            protocol::Incoming::Response { id } => {
                tracing::trace!(%id, "Ignoring response from the editor");
                None
            }
            protocol::Incoming::Invalid { id } => {
                self.client
                    .respond(
                        id.unwrap_or(Value::Null),
                        Err(ResponseError::new(INVALID_REQUEST, "not a JSON-RPC message")),
                    )
                    .await;
                None
            }
        }
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ResponseError> {
        let session = match &self.phase {
            Phase::Running(session) => session,
            Phase::Uninitialized if method == "initialize" => return self.initialize(params),
            Phase::Uninitialized => {
                return Err(ResponseError::new(
                    SERVER_NOT_INITIALIZED,
                    "server not initialized",
                ));
            }
            Phase::ShutdownRequested => {
                return Err(ResponseError::new(INVALID_REQUEST, "server is shutting down"));
            }
        };

        match method {
            "initialize" => Err(ResponseError::new(
                INVALID_REQUEST,
                "server already initialized",
            )),
            "shutdown" => {
                tracing::info!("Shutdown requested");
                self.phase = Phase::ShutdownRequested;
                Ok(Value::Null)
            }
            "textDocument/completion" => {
                let params: TextDocumentPositionParams = protocol::params(params)?;
                let Some(document) = session.documents.get(&params.text_document.uri).await
                else {
                    return Ok(Value::Null);
                };
                protocol::result(
                    self.server
                        .features
                        .completion(document.text(), params.position),
                )
            }
            "textDocument/hover" => {
                let params: TextDocumentPositionParams = protocol::params(params)?;
                let Some((path, document)) = session.file_document(&params.text_document.uri).await
                else {
                    return Ok(Value::Null);
                };
                protocol::result(
                    self.server
                        .features
                        .hover(&path, document.text(), params.position),
                )
            }
            "textDocument/definition" => {
                let params: TextDocumentPositionParams = protocol::params(params)?;
                let Some((path, document)) = session.file_document(&params.text_document.uri).await
                else {
                    return Ok(Value::Null);
                };
                protocol::result(
                    self.server
                        .features
                        .definition(&path, document.text(), params.position),
                )
            }
            _ => Err(ResponseError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            )),
        }
    }

    fn initialize(&mut self, params: Value) -> Result<Value, ResponseError> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            protocol::params(params)?
        };
        let workspace_root = params.workspace_root().map(|root| normalize_path(&root));
        let mut settings = (self.server.load_settings)(workspace_root.as_deref());

        if let Some(options) = &params.initialization_options {
            match protocol::apply_settings(options, settings.validation.clone()) {
                Ok(validation) => settings.validation = validation,
                Err(e) => tracing::warn!("Ignoring initialization options: {e}"),
            }
        }

        tracing::info!(
            root = ?workspace_root,
            live_check = settings.validation.live_check(),
            delay_ms = settings.validation.delay().as_millis(),
            compiler = settings.compiler.command(),
            "Initializing"
        );

        let documents = Arc::new(DocumentStore::new());
        let validator = Validator::new((self.server.make_compiler)(&settings.compiler));
        let scheduler = ValidationScheduler::new(
            validator,
            self.client.clone(),
            Arc::clone(&documents),
            settings.validation,
        );
        self.phase = Phase::Running(Session {
            documents,
            scheduler,
        });
        Ok(protocol::initialize_result())
    }

    async fn notification(&mut self, method: &str, params: Value) -> Option<ServeOutcome> {
        if method == "exit" {
            return Some(match self.phase {
                Phase::ShutdownRequested => ServeOutcome::Exited,
                Phase::Uninitialized | Phase::Running(_) => ServeOutcome::ExitedWithoutShutdown,
            });
        }
        let Phase::Running(session) = &self.phase else {
            tracing::debug!(method, "Dropping notification outside a running session");
            return None;
        };

        let result = match method {
            "initialized" => {
                tracing::info!("{CREATED_MESSAGE}");
                self.client.log_message(CREATED_MESSAGE).await;
                Ok(())
            }
            "textDocument/didOpen" => session.did_open(params).await,
            "textDocument/didChange" => session.did_change(params).await,
            "textDocument/didSave" => session.did_save(params).await,
            "textDocument/didClose" => session.did_close(params).await,
            "workspace/didChangeConfiguration" => session.did_change_configuration(params).await,
            _ => {
                tracing::trace!(method, "Ignoring notification");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(method, "Ignoring notification: {}", e.message);
        }
        None
    }
}

impl<C: Compiler> Session<C> {
    async fn file_document(&self, uri: &Url) -> Option<(PathBuf, Document)> {
        let path = protocol::file_uri_to_path(uri)?;
        let document = self.documents.get(uri).await?;
        Some((path, document))
    }

    // Validation tasks are detached; their results arrive as notifications.

    async fn did_open(&self, params: Value) -> Result<(), ResponseError> {
        let DidOpenParams { text_document } = protocol::params(params)?;
        tracing::debug!(uri = %text_document.uri, version = text_document.version, "didOpen");
        self.documents
            .open(
                text_document.uri.clone(),
                text_document.text,
                text_document.version,
            )
            .await;
        drop(self.scheduler.did_open(&text_document.uri).await);
        Ok(())
    }

    async fn did_change(&self, params: Value) -> Result<(), ResponseError> {
        let DidChangeParams {
            text_document,
            content_changes,
        } = protocol::params(params)?;
        // Full sync: the last change carries the whole document.
        let Some(change) = content_changes.into_iter().last() else {
            return Ok(());
        };
        if !self
            .documents
            .update(&text_document.uri, change.text, Some(text_document.version))
            .await
        {
            tracing::debug!(uri = %text_document.uri, "Ignoring change to unknown or newer document");
            return Ok(());
        }
        drop(self.scheduler.did_change(&text_document.uri).await);
        Ok(())
    }

    async fn did_save(&self, params: Value) -> Result<(), ResponseError> {
        let DidSaveParams {
            text_document,
            text,
        } = protocol::params(params)?;
        if let Some(text) = text {
            self.documents.update(&text_document.uri, text, None).await;
        }
        drop(self.scheduler.did_save(&text_document.uri).await);
        Ok(())
    }

    async fn did_close(&self, params: Value) -> Result<(), ResponseError> {
        let DidCloseParams { text_document } = protocol::params(params)?;
        self.documents.close(&text_document.uri).await;
        self.scheduler.did_close(&text_document.uri).await;
        Ok(())
    }

    async fn did_change_configuration(&self, params: Value) -> Result<(), ResponseError> {
        let DidChangeConfigurationParams { settings } = protocol::params(params)?;
        let current = self.scheduler.settings().await;
        match protocol::apply_settings(&settings, current) {
            Ok(validation) => {
                tracing::info!(
                    live_check = validation.live_check(),
                    delay_ms = validation.delay().as_millis(),
                    report_import_errors = validation.report_import_errors(),
                    "Settings changed"
                );
                drop(self.scheduler.update_settings(validation).await);
            }
            Err(e) => tracing::warn!("Rejected settings change: {e}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::testing::FakeCompiler;
    use crate::features::TactFeatures;
    use serde_json::json;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    fn server() -> Server<FakeCompiler, TactFeatures> {
        Server::new(|_: &CompilerSettings| FakeCompiler::default(), TactFeatures)
            .with_settings_loader(|_| Settings::default())
    }

    fn frame(message: &Value) -> Vec<u8> {
        let body = serde_json::to_vec(message).unwrap();
        let mut bytes = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        bytes.extend(body);
        bytes
    }

    async fn replies(input: Vec<u8>) -> (ServeOutcome, Vec<Value>) {
        let (mut editor, server_side) = tokio::io::duplex(1 << 16);
        let (read, write) = tokio::io::split(server_side);
        editor.write_all(&input).await.unwrap();
        editor.shutdown().await.unwrap();

        let outcome = server().serve(read, write).await.unwrap();
        (outcome, read_all(editor).await)
    }

    async fn read_all(editor: DuplexStream) -> Vec<Value> {
        let mut reader = FrameReader::new(editor);
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = reader.read_frame().await {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn only_a_clean_exit_succeeds() {
        assert_eq!(ServeOutcome::Exited.exit_code(), 0);
        assert_eq!(ServeOutcome::ExitedWithoutShutdown.exit_code(), 1);
        assert_eq!(ServeOutcome::Disconnected.exit_code(), 1);
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let input = [
            frame(&json!({"jsonrpc": "2.0", "id": 1, "method": "textDocument/hover", "params": {}})),
            frame(&json!({"jsonrpc": "2.0", "method": "exit"})),
        ]
        .concat();
        let (outcome, replies) = replies(input).await;
        assert_eq!(outcome, ServeOutcome::ExitedWithoutShutdown);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["error"]["code"], SERVER_NOT_INITIALIZED);
    }

    #[tokio::test]
    async fn lifecycle_and_error_codes() {
        let input = [
            frame(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})),
            frame(&json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": {}})),
            frame(&json!({"jsonrpc": "2.0", "id": 3, "method": "tact/unknown"})),
            frame(&json!({"jsonrpc": "2.0", "id": 4, "method": "textDocument/hover", "params": {}})),
            frame(&json!({"jsonrpc": "2.0", "id": 5, "method": "shutdown"})),
            frame(&json!({"jsonrpc": "2.0", "id": 6, "method": "textDocument/hover", "params": {}})),
            frame(&json!({"jsonrpc": "2.0", "method": "exit"})),
        ]
        .concat();
        let (outcome, replies) = replies(input).await;
        assert_eq!(outcome, ServeOutcome::Exited);

        let codes: Vec<_> = replies.iter().map(|r| r["error"]["code"].clone()).collect();
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "tactls");
        assert_eq!(codes[1], INVALID_REQUEST);
        assert_eq!(codes[2], METHOD_NOT_FOUND);
        assert_eq!(codes[3], protocol::INVALID_PARAMS);
        assert_eq!(replies[4]["result"], Value::Null);
        assert_eq!(codes[5], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_gets_a_parse_error() {
        let mut input = b"Content-Length: 5\r\n\r\n{oops".to_vec();
        input.extend(frame(&json!({"jsonrpc": "2.0", "method": "exit"})));
        let (outcome, replies) = replies(input).await;
        assert_eq!(outcome, ServeOutcome::ExitedWithoutShutdown);
        assert_eq!(replies[0]["id"], Value::Null);
        assert_eq!(replies[0]["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn end_of_input_is_a_disconnect() {
        let (outcome, replies) = replies(Vec::new()).await;
        assert_eq!(outcome, ServeOutcome::Disconnected);
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn broken_framing_is_fatal() {
        let input = b"Content-Type: text/plain\r\n\r\n{}".to_vec();
        let (_editor, server_side) = tokio::io::duplex(1 << 16);
        let (_, write) = tokio::io::split(server_side);
        let err = server().serve(input.as_slice(), write).await.unwrap_err();
        assert!(err.to_string().contains("reading from the editor"), "{err:#}");
    }
}
