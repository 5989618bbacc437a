//! Public types exchanged with the editor.
//!
//! Positions here are LSP positions: 0-based line and character. The
//! compiler-facing records in `tactls_types` are 1-based; [`crate::diagnostics`]
//! converts between the two.

use serde::{Deserialize, Serialize, Serializer};
use tactls_types::Severity;
use url::Url;

/// Value of `Diagnostic.source` for everything this server publishes.
pub const DIAGNOSTIC_SOURCE: &str = "tact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A range on one line covering `[start, end)`.
    #[must_use]
    pub const fn on_line(line: u32, start: u32, end: u32) -> Self {
        Self::new(Position::new(line, start), Position::new(line, end))
    }

    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: Url,
    pub range: Range,
}

fn serialize_severity<S: Serializer>(severity: &Severity, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(severity.lsp_code())
}

/// A diagnostic as published to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    range: Range,
    #[serde(serialize_with = "serialize_severity")]
    severity: Severity,
    source: &'static str,
    message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(range: Range, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            range,
            severity,
            source: DIAGNOSTIC_SOURCE,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn source(&self) -> &str {
        self.source
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// LSP `CompletionItemKind` values the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Keyword,
}

impl Serialize for CompletionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let code = match self {
            CompletionKind::Keyword => 14,
        };
        serializer.serialize_u8(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
}

impl CompletionItem {
    #[must_use]
    pub fn keyword(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: CompletionKind::Keyword,
        }
    }
}

/// Hover contents are always Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    pub markdown: String,
    pub range: Option<Range>,
}

impl Serialize for Hover {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Markup<'a> {
            kind: &'static str,
            value: &'a str,
        }

        #[derive(Serialize)]
        struct Wire<'a> {
            contents: Markup<'a>,
            #[serde(skip_serializing_if = "Option::is_none")]
            range: Option<Range>,
        }

        Wire {
            contents: Markup {
                kind: "markdown",
                value: &self.markdown,
            },
            range: self.range,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_wire_shape() {
        let diagnostic = Diagnostic::new(Range::on_line(2, 4, 6), Severity::Error, "boom");
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "range": {
                    "start": { "line": 2, "character": 4 },
                    "end": { "line": 2, "character": 6 }
                },
                "severity": 1,
                "source": "tact",
                "message": "boom"
            })
        );
    }

    #[test]
    fn range_contains_is_inclusive() {
        let range = Range::on_line(0, 7, 15);
        assert!(range.contains(Position::new(0, 7)));
        assert!(range.contains(Position::new(0, 15)));
        assert!(!range.contains(Position::new(0, 16)));
        assert!(!range.contains(Position::new(1, 8)));
    }

    #[test]
    fn hover_serializes_as_markup() {
        let hover = Hover {
            markdown: "`/p/lib.tact`".into(),
            range: None,
        };
        let json = serde_json::to_value(&hover).unwrap();
        assert_eq!(json["contents"]["kind"], "markdown");
        assert_eq!(json["contents"]["value"], "`/p/lib.tact`");
        assert!(json.get("range").is_none());
    }

    #[test]
    fn completion_kind_codes() {
        let json = serde_json::to_value(CompletionItem::keyword("contract")).unwrap();
        assert_eq!(json, serde_json::json!({ "label": "contract", "kind": 14 }));
    }
}
