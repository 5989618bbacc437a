//! Open documents, as last synchronized by the editor.

use std::collections::HashMap;
use std::sync::Arc;

use tactls_types::normalize_path;
use tokio::sync::RwLock;
use url::Url;

use crate::collection::Overlay;
use crate::protocol::file_uri_to_path;

/// One open buffer. Cloning is cheap; the text is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    uri: Url,
    text: Arc<str>,
    version: i32,
}

impl Document {
    #[must_use]
    pub fn new(uri: Url, text: impl Into<Arc<str>>, version: i32) -> Self {
        Self {
            uri,
            text: text.into(),
            version,
        }
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<Url, Document>>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, uri: Url, text: String, version: i32) {
        let document = Document::new(uri.clone(), text, version);
        self.documents.write().await.insert(uri, document);
    }

    /// Replace the text of an open document. Returns `false` when the
    /// document is not open, in which case nothing is stored.
    ///
    /// A change carrying a version older than the stored one is dropped.
    pub async fn update(&self, uri: &Url, text: String, version: Option<i32>) -> bool {
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(uri) else {
            return false;
        };
        let version = version.unwrap_or(document.version);
        if version < document.version {
            tracing::debug!(%uri, version, current = document.version, "Ignoring stale change");
            return true;
        }
        *document = Document::new(uri.clone(), text, version);
        true
    }

    pub async fn close(&self, uri: &Url) -> Option<Document> {
        self.documents.write().await.remove(uri)
    }

    pub async fn get(&self, uri: &Url) -> Option<Document> {
        self.documents.read().await.get(uri).cloned()
    }

    pub async fn uris(&self) -> Vec<Url> {
        let mut uris: Vec<Url> = self.documents.read().await.keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Text of every open `file:` document keyed by normalized path, so import
    /// resolution sees unsaved edits instead of what is on disk.
    pub async fn overlay(&self) -> Overlay {
        self.documents
            .read()
            .await
            .values()
            .filter_map(|document| {
                let path = file_uri_to_path(document.uri())?;
                Some((normalize_path(&path), document.text.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn uri(path: &str) -> Url {
        Url::parse(&format!("file://{path}")).unwrap()
    }

    #[tokio::test]
    async fn open_update_close() {
        let store = DocumentStore::new();
        let main = uri("/p/main.tact");

        store.open(main.clone(), "contract A {}".into(), 1).await;
        assert!(store.update(&main, "contract B {}".into(), Some(2)).await);
        let doc = store.get(&main).await.unwrap();
        assert_eq!(doc.text(), "contract B {}");
        assert_eq!(doc.version(), 2);

        assert!(store.close(&main).await.is_some());
        assert!(store.get(&main).await.is_none());
        assert!(!store.update(&main, "x".into(), Some(3)).await);
        assert!(store.get(&main).await.is_none());
    }

    #[tokio::test]
    async fn stale_change_is_ignored() {
        let store = DocumentStore::new();
        let main = uri("/p/main.tact");
        store.open(main.clone(), "new".into(), 5).await;
        store.update(&main, "old".into(), Some(4)).await;
        assert_eq!(store.get(&main).await.unwrap().text(), "new");
    }

    #[tokio::test]
    async fn save_without_version_keeps_version() {
        let store = DocumentStore::new();
        let main = uri("/p/main.tact");
        store.open(main.clone(), "a".into(), 3).await;
        store.update(&main, "b".into(), None).await;
        let doc = store.get(&main).await.unwrap();
        assert_eq!((doc.text(), doc.version()), ("b", 3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn overlay_skips_non_file_documents() {
        let store = DocumentStore::new();
        store.open(uri("/p/lib.tact"), "trait T {}".into(), 1).await;
        store
            .open(Url::parse("untitled:Untitled-1").unwrap(), "x".into(), 1)
            .await;

        let overlay = store.overlay().await;
        assert_eq!(overlay.len(), 1);
        assert_eq!(
            overlay.get(Path::new("/p/lib.tact")).map(String::as_str),
            Some("trait T {}")
        );
        assert_eq!(store.uris().await.len(), 2);
    }
}
