//! Read-only editor queries: completion, hover and go-to-definition.
//!
//! The server only routes these requests; what they answer is up to the
//! [`LanguageFeatures`] implementation. [`TactFeatures`] is a small default
//! that knows the language keywords and understands import statements.

use std::path::Path;

use crate::collection::{ImportStatement, parse_imports, resolve_import};
use crate::protocol::path_to_file_uri;
use crate::types::{CompletionItem, Hover, Location, Position, Range};

pub trait LanguageFeatures: Send + Sync + 'static {
    fn completion(&self, text: &str, position: Position) -> Vec<CompletionItem>;

    fn hover(&self, path: &Path, text: &str, position: Position) -> Option<Hover>;

    fn definition(&self, path: &Path, text: &str, position: Position) -> Option<Location>;
}

const KEYWORDS: &[&str] = &[
    "abstract", "as", "asm", "bounced", "catch", "const", "contract", "do", "else", "extends",
    "external", "false", "foreach", "fun", "get", "if", "import", "in", "init", "inline", "let",
    "map", "message", "mutates", "native", "null", "override", "primitive", "receive", "repeat",
    "return", "self", "struct", "trait", "true", "try", "until", "virtual", "while", "with",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct TactFeatures;

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Text of line `position.line` before the cursor. The column counts UTF-16
/// code units, as LSP positions do, and a line past the last newline exists
/// but is empty.
fn line_prefix(text: &str, position: Position) -> Option<&str> {
    let line = text.split('\n').nth(usize::try_from(position.line).ok()?)?;
    let line = line.strip_suffix('\r').unwrap_or(line);
    let column = usize::try_from(position.character).ok()?;
    let mut units = 0;
    let end = line
        .char_indices()
        .find(|&(_, c)| {
            units += c.len_utf16();
            units > column
        })
        .map_or(line.len(), |(i, _)| i);
    Some(&line[..end])
}

fn import_at(text: &str, position: Position) -> Option<ImportStatement> {
    parse_imports(text)
        .into_iter()
        .find(|import| import.path_range().contains(position))
}

impl LanguageFeatures for TactFeatures {
    fn completion(&self, text: &str, position: Position) -> Vec<CompletionItem> {
        let Some(before) = line_prefix(text, position) else {
            return Vec::new();
        };
        let word_start = before
            .char_indices()
            .rev()
            .take_while(|&(_, c)| is_ident(c))
            .last()
            .map_or(before.len(), |(i, _)| i);
        let (head, word) = before.split_at(word_start);

        // Member access needs type information this provider does not have.
        if head.ends_with('.') {
            return Vec::new();
        }
        KEYWORDS
            .iter()
            .filter(|keyword| keyword.starts_with(word))
            .map(|keyword| CompletionItem::keyword(keyword))
            .collect()
    }

    fn hover(&self, path: &Path, text: &str, position: Position) -> Option<Hover> {
        let import = import_at(text, position)?;
        let markdown = match resolve_import(path, import.path()) {
            Ok(None) => format!("Compiler library `{}`", import.path()),
            Ok(Some(target)) if target.is_file() => format!("`{}`", target.display()),
            Ok(Some(target)) => format!("`{}` (not found)", target.display()),
            Err(e) => format!("Invalid import: {e}"),
        };
        Some(Hover {
            markdown,
            range: Some(import.path_range()),
        })
    }

    fn definition(&self, path: &Path, text: &str, position: Position) -> Option<Location> {
        let import = import_at(text, position)?;
        let target = resolve_import(path, import.path()).ok()??;
        if !target.is_file() {
            return None;
        }
        Some(Location {
            uri: path_to_file_uri(&target).ok()?,
            range: Range::on_line(0, 0, 0),
        })
    }
}
