//! Contract collection: the root document plus every file it transitively
//! imports.
//!
//! Imports are followed breadth-first with an explicit queue, so import depth
//! never grows the stack and each file is read at most once. Texts come from
//! the open-document overlay when the editor has the file open, otherwise from
//! disk.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tactls_types::{
    CompileRequest, ContractSource, ParsedError, SOURCE_EXTENSION, Severity, is_source_file,
    normalize_path,
};

use crate::types::Range;

/// Normalized path to text of every open document.
pub type Overlay = HashMap<PathBuf, String>;

/// Extension of FunC sources, which Tact code may import but which are not
/// scanned for imports of their own.
const FUNC_EXTENSION: &str = "fc";

/// Width of the `import` keyword, highlighted for unresolved imports.
const IMPORT_KEYWORD_LEN: u32 = 6;

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|;)\s*(import)\s+"([^"]*)""#).expect("valid import statement regex")
});

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("import path is empty")]
    EmptyImport,
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a file", path.display())]
    NotAFile { path: PathBuf },
}

/// One `import "...";` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    path: String,
    line: u32,
    column: u32,
    path_start: u32,
    path_end: u32,
}

impl ImportStatement {
    /// The import string as written, without quotes.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 1-based line of the statement.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column of the `import` keyword.
    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// 0-based editor range of the quoted path, quotes included.
    #[must_use]
    pub fn path_range(&self) -> Range {
        Range::on_line(self.line - 1, self.path_start, self.path_end)
    }

    /// Whether the import names a library bundled with the compiler
    /// (`@stdlib/...`).
    #[must_use]
    pub fn is_library(&self) -> bool {
        self.path.starts_with('@')
    }
}

/// An import that could not be followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveFailure {
    importer: PathBuf,
    line: u32,
    column: u32,
    import: String,
    reason: String,
}

impl ResolveFailure {
    #[must_use]
    pub fn importer(&self) -> &Path {
        &self.importer
    }

    #[must_use]
    pub fn import(&self) -> &str {
        &self.import
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The failure as a compiler-style error on the import statement.
    #[must_use]
    pub fn to_parsed_error(&self) -> ParsedError {
        ParsedError::new(
            &self.importer,
            Severity::Error,
            self.line,
            self.column,
            format!("Cannot resolve import \"{}\": {}", self.import, self.reason),
        )
        .with_length(IMPORT_KEYWORD_LEN)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Str,
    LineComment,
    BlockComment,
}

fn blank(out: &mut String, c: char) {
    out.extend(std::iter::repeat_n(' ', c.len_utf16()));
}

/// Blank out `//` and `/* */` comments, keeping every UTF-16 column and line
/// break where it was.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut state = Scan::Code;

    while let Some(c) = chars.next() {
        match state {
            Scan::Code => match (c, chars.peek()) {
                ('/', Some('/')) => {
                    chars.next();
                    out.push_str("  ");
                    state = Scan::LineComment;
                }
                ('/', Some('*')) => {
                    chars.next();
                    out.push_str("  ");
                    state = Scan::BlockComment;
                }
                ('"', _) => {
                    out.push(c);
                    state = Scan::Str;
                }
                _ => out.push(c),
            },
            Scan::Str => {
                out.push(c);
                match c {
                    '"' | '\n' => state = Scan::Code,
                    '\\' => {
                        if let Some(escaped) = chars.next_if(|&n| n != '\n') {
                            out.push(escaped);
                        }
                    }
                    _ => {}
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = Scan::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = Scan::Code;
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }
    out
}

/// Editor column of `byte_offset` in `line`, counted in UTF-16 code units.
fn utf16_column(line: &str, byte_offset: usize) -> u32 {
    u32::try_from(line[..byte_offset].encode_utf16().count()).unwrap_or(u32::MAX)
}

/// Every import statement in `text`, in source order. Commented-out imports
/// are ignored; several statements may share a line.
#[must_use]
pub fn parse_imports(text: &str) -> Vec<ImportStatement> {
    let stripped = strip_comments(text);
    let mut imports = Vec::new();
    for (index, line) in stripped.lines().enumerate() {
        let Ok(line_number) = u32::try_from(index + 1) else {
            break;
        };
        for captures in IMPORT.captures_iter(line) {
            let (Some(keyword), Some(path)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            imports.push(ImportStatement {
                path: path.as_str().to_string(),
                line: line_number,
                column: utf16_column(line, keyword.start()) + 1,
                path_start: utf16_column(line, path.start()) - 1,
                path_end: utf16_column(line, path.end()) + 1,
            });
        }
    }
    imports
}

/// Absolute path an import refers to, or `None` for compiler libraries.
///
/// Paths resolve against the importer's directory. Anything other than a
/// `.tact` or `.fc` file gets `.tact` appended, so `import "./messages"` and
/// `import "./messages.tact"` name the same file.
pub fn resolve_import(importer: &Path, import: &str) -> Result<Option<PathBuf>, CollectionError> {
    if import.starts_with('@') {
        return Ok(None);
    }
    if import.trim().is_empty() {
        return Err(CollectionError::EmptyImport);
    }

    let base = importer.parent().unwrap_or_else(|| Path::new(""));
    let target = base.join(import);
    let known = matches!(
        target.extension().and_then(|e| e.to_str()),
        Some(SOURCE_EXTENSION | FUNC_EXTENSION)
    );
    let target = if known {
        target
    } else {
        let mut name = OsString::from(target);
        name.push(".");
        name.push(SOURCE_EXTENSION);
        PathBuf::from(name)
    };
    Ok(Some(normalize_path(&target)))
}

async fn read_source(path: &Path, overlay: &Overlay) -> Result<String, CollectionError> {
    if let Some(text) = overlay.get(path) {
        return Ok(text.clone());
    }
    let read_err = |source| CollectionError::Read {
        path: path.to_path_buf(),
        source,
    };
    let metadata = tokio::fs::metadata(path).await.map_err(read_err)?;
    if !metadata.is_file() {
        return Err(CollectionError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    tokio::fs::read_to_string(path).await.map_err(read_err)
}

/// The root document and everything it pulls in.
#[derive(Debug, Clone)]
pub struct ContractCollection {
    root: PathBuf,
    sources: Vec<ContractSource>,
    /// For every non-root source, the import in the root it was reached through.
    via: HashMap<PathBuf, ImportStatement>,
    failures: Vec<ResolveFailure>,
}

impl ContractCollection {
    /// Follow the imports of `root` (whose current text is `root_text`).
    ///
    /// Unreadable imports are recorded as failures; their siblings are still
    /// followed. Never fails as a whole.
    pub async fn resolve(root: &Path, root_text: &str, overlay: &Overlay) -> Self {
        let root = normalize_path(root);
        let mut sources = Vec::new();
        let mut via = HashMap::new();
        let mut failures = Vec::new();
        let mut seen = HashSet::from([root.clone()]);
        let mut unreadable: HashMap<PathBuf, String> = HashMap::new();
        let mut queue = VecDeque::from([(root.clone(), root_text.to_string(), None)]);

        while let Some((path, text, reached_via)) = queue.pop_front() {
            if is_source_file(&path) {
                for import in parse_imports(&text) {
                    let target = match resolve_import(&path, import.path()) {
                        Ok(Some(target)) => target,
                        Ok(None) => continue,
                        Err(e) => {
                            failures.push(failure(&path, &import, e.to_string()));
                            continue;
                        }
                    };
                    if let Some(reason) = unreadable.get(&target) {
                        failures.push(failure(&path, &import, reason.clone()));
                        continue;
                    }
                    if !seen.insert(target.clone()) {
                        continue;
                    }
                    match read_source(&target, overlay).await {
                        Ok(imported) => {
                            let site = reached_via.clone().unwrap_or_else(|| import.clone());
                            via.insert(target.clone(), site.clone());
                            queue.push_back((target, imported, Some(site)));
                        }
                        Err(e) => {
                            tracing::debug!(
                                importer = %path.display(),
                                import = import.path(),
                                "Import not resolved: {e}"
                            );
                            let reason = e.to_string();
                            seen.remove(&target);
                            unreadable.insert(target, reason.clone());
                            failures.push(failure(&path, &import, reason));
                        }
                    }
                }
            }
            sources.push(ContractSource::new(path, text));
        }

        Self {
            root,
            sources,
            via,
            failures,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collected sources in discovery order; the root comes first.
    #[must_use]
    pub fn sources(&self) -> &[ContractSource] {
        &self.sources
    }

    #[must_use]
    pub fn failures(&self) -> &[ResolveFailure] {
        &self.failures
    }

    /// The import statement in the root through which `path` was first reached.
    #[must_use]
    pub fn import_site(&self, path: &Path) -> Option<&ImportStatement> {
        self.via.get(&normalize_path(path))
    }

    /// A compile request over every collected source, targeting the root.
    #[must_use]
    pub fn to_compile_request(&self) -> CompileRequest {
        CompileRequest::new(self.root.clone(), self.sources.iter().cloned())
    }
}

fn failure(importer: &Path, import: &ImportStatement, reason: String) -> ResolveFailure {
    ResolveFailure {
        importer: importer.to_path_buf(),
        line: import.line,
        column: import.column,
        import: import.path.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_imports_with_positions() {
        let text = "import \"@stdlib/deploy\";\n  import \"./messages\";\ncontract A {}\n";
        let imports = parse_imports(text);
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].path(), "@stdlib/deploy");
        assert!(imports[0].is_library());
        assert_eq!((imports[1].line(), imports[1].column()), (2, 3));
        assert_eq!(imports[1].path_range(), Range::on_line(1, 9, 21));
    }

    #[test]
    fn several_imports_on_one_line() {
        let imports = parse_imports("import \"./a\"; import \"./b\";\n");
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].path(), "./a");
        assert_eq!((imports[0].line(), imports[0].column()), (1, 1));
        assert_eq!(imports[1].path(), "./b");
        assert_eq!((imports[1].line(), imports[1].column()), (1, 15));
        assert_eq!(imports[1].path_range(), Range::on_line(0, 21, 26));
    }

    #[test]
    fn import_columns_count_utf16_units() {
        let imports = parse_imports("/* \u{1F600} */ import \"./a\";");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].column(), 10);
        assert_eq!(imports[0].path_range(), Range::on_line(0, 16, 21));
    }

    #[test]
    fn commented_imports_are_ignored() {
        let text = "// import \"./a\";\n/* import \"./b\";\nimport \"./c\"; */\nimport \"./d\"; // trailing\n";
        let imports = parse_imports(text);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].path(), "./d");
        assert_eq!(imports[0].line(), 4);
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let stripped = strip_comments("let s = \"a//b\"; // gone\n");
        assert_eq!(stripped, "let s = \"a//b\";        \n");
    }

    #[test]
    fn resolve_appends_extension_and_normalizes() {
        let importer = Path::new("/p/contracts/main.tact");
        assert_eq!(
            resolve_import(importer, "../lib/math").unwrap(),
            Some(PathBuf::from("/p/lib/math.tact"))
        );
        assert_eq!(
            resolve_import(importer, "./msg.tact").unwrap(),
            Some(PathBuf::from("/p/contracts/msg.tact"))
        );
        assert_eq!(
            resolve_import(importer, "./stdlib.fc").unwrap(),
            Some(PathBuf::from("/p/contracts/stdlib.fc"))
        );
        assert_eq!(
            resolve_import(importer, "./messages.v2").unwrap(),
            Some(PathBuf::from("/p/contracts/messages.v2.tact"))
        );
        assert_eq!(resolve_import(importer, "@stdlib/deploy").unwrap(), None);
        assert!(matches!(
            resolve_import(importer, ""),
            Err(CollectionError::EmptyImport)
        ));
    }

    #[tokio::test]
    async fn follows_imports_from_overlay_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("main.tact");
        std::fs::write(dir.path().join("lib.tact"), "import \"./deep\";\ntrait L {}").unwrap();
        std::fs::write(dir.path().join("deep.tact"), "on disk").unwrap();

        let mut overlay = Overlay::new();
        overlay.insert(normalize_path(&dir.path().join("deep.tact")), "unsaved".into());

        let collection = ContractCollection::resolve(
            &root,
            "import \"@stdlib/deploy\";\nimport \"./lib\";\ncontract A {}",
            &overlay,
        )
        .await;

        assert!(collection.failures().is_empty());
        let paths: Vec<_> = collection.sources().iter().map(ContractSource::path).collect();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], normalize_path(&root));

        let request = collection.to_compile_request();
        let deep = normalize_path(&dir.path().join("deep.tact"));
        assert_eq!(request.text(&deep), Some("unsaved"));
        assert_eq!(request.targets(), [normalize_path(&root)]);

        // deep.tact was reached through the root's second line.
        assert_eq!(collection.import_site(&deep).unwrap().line(), 2);
    }

    #[tokio::test]
    async fn cycles_visit_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a.tact");
        std::fs::write(&root, "import \"./b\";").unwrap();
        std::fs::write(dir.path().join("b.tact"), "import \"./a\";\nimport \"./b\";").unwrap();

        let collection = ContractCollection::resolve(&root, "import \"./b\";", &Overlay::new()).await;
        assert_eq!(collection.sources().len(), 2);
        assert!(collection.failures().is_empty());
    }

    #[tokio::test]
    async fn missing_import_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("main.tact");
        std::fs::write(dir.path().join("present.tact"), "trait P {}").unwrap();

        let collection = ContractCollection::resolve(
            &root,
            "import \"./missing\";\nimport \"./present\";",
            &Overlay::new(),
        )
        .await;

        assert_eq!(collection.sources().len(), 2);
        assert_eq!(collection.failures().len(), 1);
        let failure = &collection.failures()[0];
        assert_eq!(failure.import(), "./missing");
        assert_eq!(failure.importer(), normalize_path(&root));

        let error = failure.to_parsed_error();
        assert_eq!((error.line(), error.column()), (1, 1));
        assert!(error.message().starts_with("Cannot resolve import \"./missing\""));
    }

    #[tokio::test]
    async fn func_imports_are_collected_but_not_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("main.tact");
        std::fs::write(dir.path().join("util.fc"), "import \"./nowhere\";").unwrap();

        let collection =
            ContractCollection::resolve(&root, "import \"./util.fc\";", &Overlay::new()).await;
        assert_eq!(collection.sources().len(), 2);
        assert!(collection.failures().is_empty());
    }

    #[tokio::test]
    async fn directory_import_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("main.tact");
        std::fs::create_dir(dir.path().join("pkg.tact")).unwrap();

        let collection =
            ContractCollection::resolve(&root, "import \"./pkg\";", &Overlay::new()).await;
        assert_eq!(collection.failures().len(), 1);
        assert!(collection.failures()[0].reason().contains("is not a file"));
    }
}
