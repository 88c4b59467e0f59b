//! Open-file table
//!
//! Reference-counted document state shared by every [`OpenFileHandle`] on
//! the same path. The backend sees one `didOpen` per entry and one
//! `didClose` when the last handle goes away.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::session::Session;
use crate::error::SessionResult;

#[derive(Debug)]
pub(crate) struct DocumentEntry {
    pub uri: String,
    pub text: String,
    pub version: i32,
    /// False for documents opened from given contents
    pub on_disk: bool,
    open_count: usize,
}

impl DocumentEntry {
    pub fn from_disk(uri: String, text: String) -> Self {
        Self::new(uri, text, true)
    }

    pub fn in_memory(uri: String, text: String) -> Self {
        Self::new(uri, text, false)
    }

    fn new(uri: String, text: String, on_disk: bool) -> Self {
        Self {
            uri,
            text,
            version: 1,
            on_disk,
            open_count: 1,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DocumentTable {
    entries: HashMap<PathBuf, DocumentEntry>,
}

impl DocumentTable {
    /// Bump the count of an existing entry; false when absent
    pub fn acquire(&mut self, key: &Path) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.open_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn insert(&mut self, key: PathBuf, entry: DocumentEntry) {
        self.entries.insert(key, entry);
    }

    /// Drop one claim; returns the entry once the last claim is gone
    pub fn release(&mut self, key: &Path) -> Option<DocumentEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.open_count = entry.open_count.saturating_sub(1);
        if entry.open_count == 0 {
            self.entries.remove(key)
        } else {
            None
        }
    }

    pub fn get(&self, key: &Path) -> Option<&DocumentEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &Path) -> Option<&mut DocumentEntry> {
        self.entries.get_mut(key)
    }

    /// Replace the buffered text, bumping the version when it differs.
    ///
    /// Returns the uri and new version, or `None` when nothing changed.
    pub fn update(&mut self, key: &Path, text: String) -> Option<(String, i32)> {
        let entry = self.entries.get_mut(key)?;
        if entry.text == text {
            return None;
        }
        entry.text = text;
        entry.version += 1;
        Some((entry.uri.clone(), entry.version))
    }

    pub fn open_count(&self, key: &Path) -> usize {
        self.entries.get(key).map(|e| e.open_count).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Scoped claim on an open document.
///
/// Dropping the handle releases the claim. Prefer [`OpenFileHandle::close`]
/// in async code so the `didClose` notification is awaited.
#[must_use = "dropping the handle closes the file"]
pub struct OpenFileHandle {
    session: Session,
    key: PathBuf,
    released: bool,
}

impl OpenFileHandle {
    pub(crate) fn new(session: Session, key: PathBuf) -> Self {
        Self {
            session,
            key,
            released: false,
        }
    }

    /// Workspace-relative path of the document
    pub fn path(&self) -> &Path {
        &self.key
    }

    /// Current buffered text of the document
    pub fn text(&self) -> SessionResult<String> {
        self.session.get_open_file_text(&self.key)
    }

    pub async fn close(mut self) -> SessionResult<()> {
        self.released = true;
        self.session.release_document(&self.key).await
    }
}

impl Drop for OpenFileHandle {
    fn drop(&mut self) {
        if !self.released {
            self.session.release_document_detached(&self.key);
        }
    }
}

impl std::fmt::Debug for OpenFileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFileHandle")
            .field("path", &self.key)
            .finish()
    }
}
