//! JSON-RPC envelopes and the LSP message shapes the server understands.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tactls_types::{SettingsError, ValidationSettings};
use url::Url;

use crate::types::{Diagnostic, Position};

pub(crate) const PARSE_ERROR: i64 = -32700;
pub(crate) const INVALID_REQUEST: i64 = -32600;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const INTERNAL_ERROR: i64 = -32603;
pub(crate) const SERVER_NOT_INITIALIZED: i64 = -32002;

/// `MessageType` for `window/logMessage`.
pub(crate) const LOG_INFO: u8 = 3;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

// ============================================================================
// Envelopes
// ============================================================================

/// A frame from the editor, classified by which JSON-RPC members it carries.
#[derive(Debug)]
pub(crate) enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// A reply to something the server sent. The server never waits on one.
    Response { id: Value },
    Invalid { id: Option<Value> },
}

impl Incoming {
    pub(crate) fn classify(mut frame: Value) -> Self {
        let Some(object) = frame.as_object_mut() else {
            return Incoming::Invalid { id: None };
        };
        let id = object.remove("id").filter(|id| !id.is_null());
        let method = object
            .remove("method")
            .and_then(|m| m.as_str().map(String::from));
        let params = object.remove("params").unwrap_or(Value::Null);
        let is_reply = object.contains_key("result") || object.contains_key("error");

        match (id, method) {
            (Some(id), Some(method)) => Incoming::Request { id, method, params },
            (None, Some(method)) => Incoming::Notification { method, params },
            (Some(id), None) if is_reply => Incoming::Response { id },
            (id, None) => Incoming::Invalid { id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl ResponseError {
    pub(crate) fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Result(Value),
    Error(ResponseError),
}

#[derive(Debug, Serialize)]
pub(crate) struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(flatten)]
    outcome: Outcome,
}

impl Response {
    pub(crate) fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub(crate) fn err(id: Value, error: ResponseError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: Outcome::Error(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification<P> {
    jsonrpc: &'static str,
    method: &'static str,
    params: P,
}

impl<P: Serialize> Notification<P> {
    pub(crate) fn new(method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Deserialize request or notification params, mapping failure to
/// `InvalidParams`.
pub(crate) fn params<T: DeserializeOwned>(params: Value) -> Result<T, ResponseError> {
    serde_json::from_value(params)
        .map_err(|e| ResponseError::new(INVALID_PARAMS, format!("invalid params: {e}")))
}

/// Serialize a request result.
pub(crate) fn result<T: Serialize>(value: T) -> Result<Value, ResponseError> {
    serde_json::to_value(value)
        .map_err(|e| ResponseError::new(INTERNAL_ERROR, format!("failed to encode result: {e}")))
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeParams {
    #[serde(default)]
    pub root_uri: Option<Url>,
    #[serde(default)]
    pub workspace_folders: Option<Vec<WorkspaceFolder>>,
    #[serde(default)]
    pub initialization_options: Option<Value>,
}

impl InitializeParams {
    /// First workspace folder, falling back to the deprecated `rootUri`.
    pub(crate) fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .map(|folder| &folder.uri)
            .or(self.root_uri.as_ref())
            .and_then(file_uri_to_path)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkspaceFolder {
    pub uri: Url,
}

pub(crate) fn initialize_result() -> Value {
    serde_json::json!({
        "capabilities": {
            "textDocumentSync": {
                "openClose": true,
                "change": 1,
                "save": { "includeText": true }
            },
            "completionProvider": {
                "resolveProvider": false,
                "triggerCharacters": ["."]
            },
            "hoverProvider": true,
            "definitionProvider": true
        },
        "serverInfo": {
            "name": "tactls",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct LogMessageParams<'a> {
    #[serde(rename = "type")]
    pub kind: u8,
    pub message: &'a str,
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct TextDocumentIdentifier {
    pub uri: Url,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextDocumentItem {
    pub uri: Url,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionedTextDocumentIdentifier {
    pub uri: Url,
    pub version: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidOpenParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentChange {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidChangeParams {
    pub text_document: VersionedTextDocumentIdentifier,
    pub content_changes: Vec<ContentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidSaveParams {
    pub text_document: TextDocumentIdentifier,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidCloseParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TextDocumentPositionParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishDiagnosticsParams<'a> {
    pub uri: &'a Url,
    pub diagnostics: &'a [Diagnostic],
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct DidChangeConfigurationParams {
    #[serde(default)]
    pub settings: Value,
}

/// The editor's `tact` settings section. Absent keys leave the current value
/// alone.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TactSettingsPatch {
    #[serde(default, alias = "enabledAsYouTypeCheck")]
    pub enabled_as_you_type_compilation_error_check: Option<bool>,
    #[serde(default, alias = "validationDelayMs")]
    pub validation_delay: Option<u64>,
    #[serde(default)]
    pub report_import_errors: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SettingsPatchError {
    #[error("malformed `tact` settings: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] SettingsError),
}

/// Apply the `tact` section of an editor settings object to `base`.
pub(crate) fn apply_settings(
    settings: &Value,
    base: ValidationSettings,
) -> Result<ValidationSettings, SettingsPatchError> {
    let patch = TactSettingsPatch::from_settings(settings)?;
    Ok(patch.apply(base)?)
}

impl TactSettingsPatch {
    /// Read the patch from a settings object, accepting both
    /// `{ "tact": { ... } }` and the bare section.
    pub(crate) fn from_settings(settings: &Value) -> Result<Self, serde_json::Error> {
        match settings.get("tact").unwrap_or(settings) {
            Value::Null => Ok(Self::default()),
            section => Self::deserialize(section),
        }
    }

    pub(crate) fn apply(
        &self,
        base: ValidationSettings,
    ) -> Result<ValidationSettings, SettingsError> {
        let mut settings = base;
        if let Some(enabled) = self.enabled_as_you_type_compilation_error_check {
            settings = settings.with_live_check(enabled);
        }
        if let Some(report) = self.report_import_errors {
            settings = settings.with_report_import_errors(report);
        }
        if let Some(delay_ms) = self.validation_delay {
            settings = settings.with_delay_ms(delay_ms)?;
        }
        Ok(settings)
    }
}

// ============================================================================
// URIs
// ============================================================================

pub fn path_to_file_uri(path: &Path) -> Result<Url, PathToUriError> {
    Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

/// Local path for a `file:` URI. Other schemes (`untitled:`, `git:`) have none.
#[must_use]
pub fn file_uri_to_path(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    uri.to_file_path().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn classify_request_notification_and_reply() {
        let request = Incoming::classify(serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "method": "shutdown"
        }));
        assert!(matches!(
            request,
            Incoming::Request { ref method, params: Value::Null, .. } if method == "shutdown"
        ));

        let notification = Incoming::classify(serde_json::json!({
            "jsonrpc": "2.0", "method": "initialized", "params": {}
        }));
        assert!(matches!(notification, Incoming::Notification { ref method, .. } if method == "initialized"));

        let reply = Incoming::classify(serde_json::json!({
            "jsonrpc": "2.0", "id": 9, "result": null
        }));
        assert!(matches!(reply, Incoming::Response { .. }));
    }

    #[test]
    fn classify_rejects_non_objects_and_methodless_frames() {
        assert!(matches!(
            Incoming::classify(serde_json::json!([1, 2])),
            Incoming::Invalid { id: None }
        ));
        assert!(matches!(
            Incoming::classify(serde_json::json!({ "id": 4 })),
            Incoming::Invalid { id: Some(_) }
        ));
    }

    #[test]
    fn response_shapes() {
        let ok = serde_json::to_value(Response::ok(serde_json::json!(1), Value::Null)).unwrap();
        assert_eq!(ok, serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": null }));

        let err = serde_json::to_value(Response::err(
            serde_json::json!("a"),
            ResponseError::new(METHOD_NOT_FOUND, "Method not found: foo"),
        ))
        .unwrap();
        assert_eq!(err["id"], "a");
        assert_eq!(err["error"]["code"], -32601);
        assert!(err.get("result").is_none());
    }

    #[test]
    fn initialize_result_advertises_full_sync_and_features() {
        let result = initialize_result();
        let caps = &result["capabilities"];
        assert_eq!(caps["textDocumentSync"]["change"], 1);
        assert_eq!(caps["textDocumentSync"]["save"]["includeText"], true);
        assert_eq!(caps["completionProvider"]["triggerCharacters"][0], ".");
        assert_eq!(caps["hoverProvider"], true);
        assert_eq!(caps["definitionProvider"], true);
    }

    #[test]
    fn settings_patch_reads_nested_section() {
        let settings = serde_json::json!({
            "tact": {
                "enabledAsYouTypeCompilationErrorCheck": true,
                "validationDelay": 250
            }
        });
        let patch = TactSettingsPatch::from_settings(&settings).unwrap();
        let applied = patch.apply(ValidationSettings::default()).unwrap();
        assert!(applied.live_check());
        assert_eq!(applied.delay(), Duration::from_millis(250));
        assert!(!applied.report_import_errors());
    }

    #[test]
    fn settings_patch_accepts_aliases_and_bare_section() {
        let settings = serde_json::json!({
            "enabledAsYouTypeCheck": false,
            "validationDelayMs": 0,
            "reportImportErrors": true
        });
        let patch = TactSettingsPatch::from_settings(&settings).unwrap();
        let base = ValidationSettings::default().with_live_check(true);
        let applied = patch.apply(base).unwrap();
        assert!(!applied.live_check());
        assert_eq!(applied.delay(), Duration::ZERO);
        assert!(applied.report_import_errors());
    }

    #[test]
    fn settings_patch_leaves_absent_keys_alone() {
        let patch = TactSettingsPatch::from_settings(&serde_json::json!({ "tact": {} })).unwrap();
        let base = ValidationSettings::default()
            .with_live_check(true)
            .with_delay_ms(10)
            .unwrap();
        assert_eq!(patch.apply(base.clone()).unwrap(), base);
        assert_eq!(
            TactSettingsPatch::from_settings(&Value::Null).unwrap(),
            TactSettingsPatch::default()
        );
    }

    #[test]
    fn settings_patch_rejects_bad_values() {
        let err = apply_settings(
            &serde_json::json!({ "tact": { "validationDelay": 999_999 } }),
            ValidationSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SettingsPatchError::Invalid(_)));

        let err = apply_settings(
            &serde_json::json!({ "tact": { "validationDelay": "soon" } }),
            ValidationSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SettingsPatchError::Malformed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn workspace_root_prefers_folders() {
        let params: InitializeParams = serde_json::from_value(serde_json::json!({
            "rootUri": "file:///old",
            "workspaceFolders": [{ "uri": "file:///new", "name": "new" }]
        }))
        .unwrap();
        assert_eq!(params.workspace_root(), Some(PathBuf::from("/new")));

        let params: InitializeParams =
            serde_json::from_value(serde_json::json!({ "rootUri": "file:///old" })).unwrap();
        assert_eq!(params.workspace_root(), Some(PathBuf::from("/old")));
    }

    #[cfg(unix)]
    #[test]
    fn uri_path_roundtrip_and_foreign_schemes() {
        let uri = path_to_file_uri(Path::new("/p/my contract.tact")).unwrap();
        assert_eq!(uri.as_str(), "file:///p/my%20contract.tact");
        assert_eq!(
            file_uri_to_path(&uri),
            Some(PathBuf::from("/p/my contract.tact"))
        );

        let untitled = Url::parse("untitled:Untitled-1").unwrap();
        assert!(file_uri_to_path(&untitled).is_none());
        assert!(path_to_file_uri(Path::new("relative.tact")).is_err());
    }
}
