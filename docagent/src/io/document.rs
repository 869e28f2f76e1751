//! Store for the single managed document and its pre-task snapshot.

use std::cell::OnceCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

/// Root-relative path of the managed document.
pub const MANAGED_DOCUMENT_PATH: &str = "_dev/build/docs/README.md";

/// Content of the managed document when the task started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Absent,
    Present(String),
}

impl Snapshot {
    pub fn content(&self) -> Option<&str> {
        match self {
            Snapshot::Absent => None,
            Snapshot::Present(content) => Some(content),
        }
    }
}

/// The managed document. The snapshot is taken once and never changes.
#[derive(Debug)]
pub struct ManagedDocument {
    path: PathBuf,
    snapshot: OnceCell<Snapshot>,
}

impl ManagedDocument {
    pub fn new(root: &Path) -> Self {
        Self::at(root.join(MANAGED_DOCUMENT_PATH))
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            snapshot: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capture the current content (or its absence). Fails if called twice.
    pub fn backup(&self) -> Result<&Snapshot> {
        let snapshot = match self.read()? {
            Some(content) => {
                info!(chars = content.len(), "backed up original document");
                Snapshot::Present(content)
            }
            None => {
                info!("no existing document found, a new one will be created");
                Snapshot::Absent
            }
        };
        self.snapshot
            .set(snapshot)
            .map_err(|_| anyhow!("document {} was already backed up", self.path.display()))?;
        self.snapshot()
    }

    pub fn snapshot(&self) -> Result<&Snapshot> {
        self.snapshot
            .get()
            .ok_or_else(|| anyhow!("document {} has not been backed up", self.path.display()))
    }

    /// Current content, or `None` when the file does not exist.
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => Err(anyhow!(
                "{} is not valid UTF-8; convert or remove it before running the agent",
                self.path.display()
            )),
            Err(err) => Err(err).with_context(|| format!("read {}", self.path.display())),
        }
    }

    /// Overwrite the whole document, creating parent directories as needed.
    pub fn write(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&self.path, content).with_context(|| format!("write {}", self.path.display()))
    }

    /// Whether the document differs from the snapshot.
    ///
    /// With no prior document, any non-empty content counts as a change.
    pub fn has_changed(&self) -> Result<bool> {
        let current = self.read()?;
        let changed = match (self.snapshot()?, current) {
            (_, None) => matches!(self.snapshot()?, Snapshot::Present(_)),
            (Snapshot::Absent, Some(content)) => !content.is_empty(),
            (Snapshot::Present(original), Some(content)) => *original != content,
        };
        debug!(changed, "checked document for changes");
        Ok(changed)
    }

    /// Put the snapshot back: rewrite the original content, or delete the
    /// file if none existed. Safe to call repeatedly.
    pub fn restore(&self) -> Result<()> {
        match self.snapshot()? {
            Snapshot::Present(original) => {
                if self.read()?.as_deref() == Some(original.as_str()) {
                    return Ok(());
                }
                self.write(original)?;
                info!(chars = original.len(), "restored original document");
            }
            Snapshot::Absent => match fs::remove_file(&self.path) {
                Ok(()) => info!("removed created document, no original existed"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("remove {}", self.path.display()));
                }
            },
        }
        Ok(())
    }

    /// Back up the document and return a guard that restores it on drop
    /// unless [`RestoreGuard::keep`] is called.
    pub fn guard(&self) -> Result<RestoreGuard<'_>> {
        self.backup()?;
        Ok(RestoreGuard {
            document: self,
            armed: true,
        })
    }
}

/// Restores the managed document when dropped while armed.
#[derive(Debug)]
pub struct RestoreGuard<'a> {
    document: &'a ManagedDocument,
    armed: bool,
}

impl RestoreGuard<'_> {
    /// Restore now and disarm.
    pub fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.document.restore()
    }

    /// Keep the current document content and disarm.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.document.restore() {
            warn!(error = %format!("{err:#}"), "failed to restore original document");
        }
    }
}
