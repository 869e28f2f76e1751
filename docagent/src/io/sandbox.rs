//! Path sandbox for tool filesystem access.
//!
//! Reads are allowed anywhere under the project root except the excluded
//! generated-artifact subtrees. Writes are additionally confined to one
//! allowed-write directory. Symlinks are resolved on both the target and the
//! root before containment is checked.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Access intent for a sandboxed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("path '{0}' is outside package root")]
    OutsideRoot(String),
    #[error("path '{path}' is outside allowed directory ({allowed}/)")]
    OutsideWriteScope { path: String, allowed: String },
    #[error("cannot read generated artifacts in '{path}' (use {allowed}/ instead)")]
    Excluded { path: String, allowed: String },
    #[error("failed to resolve path '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

/// Layout of the sandbox relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    /// The only directory tools may write into.
    pub allowed_write_dir: PathBuf,
    /// Subtrees hidden from reads and listings.
    pub excluded_read: Vec<PathBuf>,
    /// Paths inside an excluded subtree that stay readable.
    pub read_whitelist: Vec<PathBuf>,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allowed_write_dir: PathBuf::from("_dev/build/docs"),
            excluded_read: vec![PathBuf::from("docs")],
            read_whitelist: vec![PathBuf::from("docs/knowledge_base")],
        }
    }
}

/// One visible directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub is_dir: bool,
    /// File size in bytes; `None` for directories or unreadable metadata.
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
    policy: SandboxPolicy,
}

impl PathSandbox {
    pub fn new(root: impl Into<PathBuf>, policy: SandboxPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the root and check it against the policy.
    ///
    /// Returns the resolved absolute path on success. An empty `relative`
    /// names the root itself.
    pub fn resolve(&self, relative: &str, mode: AccessMode) -> Result<PathBuf, SandboxError> {
        let resolved_root = canonical_root(&self.root, relative)?;
        let resolved = resolve_target(&self.root.join(relative), relative)?;
        let inside = resolved
            .strip_prefix(&resolved_root)
            .map_err(|_| SandboxError::OutsideRoot(relative.to_string()))?
            .to_path_buf();

        match mode {
            AccessMode::Read => {
                if !self.is_visible(&inside) {
                    return Err(SandboxError::Excluded {
                        path: relative.to_string(),
                        allowed: self.policy.allowed_write_dir.display().to_string(),
                    });
                }
            }
            AccessMode::Write => {
                let allowed = resolve_target(
                    &self.root.join(&self.policy.allowed_write_dir),
                    relative,
                )?;
                let within = resolved
                    .strip_prefix(&allowed)
                    .map(|rest| !rest.as_os_str().is_empty())
                    .unwrap_or(false);
                if !within {
                    return Err(SandboxError::OutsideWriteScope {
                        path: relative.to_string(),
                        allowed: self.policy.allowed_write_dir.display().to_string(),
                    });
                }
            }
        }

        debug!(relative, resolved = %resolved.display(), ?mode, "sandbox resolved path");
        Ok(resolved)
    }

    /// Whether a root-relative path may be read or listed.
    ///
    /// Ancestors of whitelisted paths stay visible so the whitelist can be
    /// reached by listing.
    pub fn is_visible(&self, inside_root: &Path) -> bool {
        let excluded = self
            .policy
            .excluded_read
            .iter()
            .any(|subtree| inside_root.starts_with(subtree));
        if !excluded {
            return true;
        }
        self.policy
            .read_whitelist
            .iter()
            .any(|allowed| inside_root.starts_with(allowed) || allowed.starts_with(inside_root))
    }

    /// Visible entries of a directory in read mode, sorted by name.
    pub fn list_dir(&self, relative: &str) -> Result<Vec<Listing>, String> {
        let path = self
            .resolve(relative, AccessMode::Read)
            .map_err(|err| format!("access denied: {err}"))?;
        let root =
            canonical_root(&self.root, relative).map_err(|err| format!("access denied: {err}"))?;
        let inside = path.strip_prefix(&root).unwrap_or(Path::new("")).to_path_buf();
        let entries =
            fs::read_dir(&path).map_err(|err| format!("failed to read directory: {err}"))?;

        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| format!("failed to read directory: {err}"))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_visible(&inside.join(&name)) {
                continue;
            }
            let metadata = entry.metadata().ok();
            listing.push(Listing {
                is_dir: metadata.as_ref().is_some_and(fs::Metadata::is_dir),
                size: metadata.filter(|meta| !meta.is_dir()).map(|meta| meta.len()),
                name,
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Read a file in read mode.
    pub fn read_to_string(&self, relative: &str) -> Result<String, String> {
        let path = self
            .resolve(relative, AccessMode::Read)
            .map_err(|err| format!("access denied: {err}"))?;
        fs::read_to_string(&path).map_err(|err| format!("failed to read file: {err}"))
    }

    /// Write a file in write mode, creating missing parent directories first.
    pub fn write(&self, relative: &str, content: &str) -> Result<PathBuf, String> {
        let path = self
            .resolve(relative, AccessMode::Write)
            .map_err(|err| format!("access denied: {err}"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create directory: {err}"))?;
        }
        fs::write(&path, content).map_err(|err| format!("failed to write file: {err}"))?;
        Ok(path)
    }
}

fn canonical_root(root: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    fs::canonicalize(root).map_err(|err| SandboxError::Unresolvable {
        path: relative.to_string(),
        reason: format!("failed to resolve package root: {err}"),
    })
}

/// Resolve symlinks on `full`; when it does not exist yet, resolve its
/// deepest existing ancestor and append the lexically cleaned remainder.
fn resolve_target(full: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    match fs::canonicalize(full) {
        Ok(resolved) => Ok(resolved),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            resolve_missing(&lexical_clean(full), relative)
        }
        Err(err) => Err(SandboxError::Unresolvable {
            path: relative.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn resolve_missing(cleaned: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    let mut existing = cleaned;
    let mut missing = Vec::new();
    loop {
        match fs::canonicalize(existing) {
            Ok(base) => {
                let mut resolved = base;
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Ok(cleaned.to_path_buf());
                };
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            Err(err) => {
                return Err(SandboxError::Unresolvable {
                    path: relative.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

/// Remove `.` segments and fold `..` segments without touching the filesystem.
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(cleaned.components().next_back(), Some(Component::Normal(_)))
                    && cleaned.pop();
                if !popped && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(root: &Path) -> PathSandbox {
        PathSandbox::new(root, SandboxPolicy::default())
    }

    fn package() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("manifest.yml"), "name: demo\n").expect("manifest");
        fs::create_dir_all(temp.path().join("_dev/build/docs")).expect("docs dir");
        fs::create_dir_all(temp.path().join("docs/knowledge_base")).expect("kb dir");
        fs::write(temp.path().join("docs/README.md"), "generated").expect("generated");
        fs::write(temp.path().join("docs/knowledge_base/service.md"), "kb").expect("kb");
        temp
    }

    #[test]
    fn lexical_clean_folds_parent_segments() {
        assert_eq!(lexical_clean(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(lexical_clean(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(lexical_clean(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn read_inside_root_resolves() {
        let temp = package();
        let resolved = sandbox(temp.path())
            .resolve("manifest.yml", AccessMode::Read)
            .expect("resolve");
        assert!(resolved.ends_with("manifest.yml"));
    }

    #[test]
    fn empty_path_names_the_root() {
        let temp = package();
        let resolved = sandbox(temp.path())
            .resolve("", AccessMode::Read)
            .expect("resolve");
        assert_eq!(resolved, fs::canonicalize(temp.path()).expect("canon"));
    }

    #[test]
    fn parent_traversal_is_denied_for_read_and_write() {
        let temp = package();
        let sandbox = sandbox(temp.path());
        for path in ["../outside.txt", "_dev/../../outside.txt", "_dev/build/docs/../../../../x"] {
            assert!(
                matches!(
                    sandbox.resolve(path, AccessMode::Read),
                    Err(SandboxError::OutsideRoot(_))
                ),
                "read {path}"
            );
            assert!(sandbox.resolve(path, AccessMode::Write).is_err(), "write {path}");
        }
    }

    #[test]
    fn absolute_path_outside_root_is_denied() {
        let temp = package();
        let err = sandbox(temp.path())
            .resolve("/etc/passwd", AccessMode::Read)
            .unwrap_err();
        assert!(matches!(err, SandboxError::OutsideRoot(_)));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_denied() {
        let temp = package();
        let outside = tempfile::tempdir().expect("outside");
        fs::write(outside.path().join("secret.txt"), "secret").expect("secret");
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");

        let sandbox = sandbox(temp.path());
        assert!(matches!(
            sandbox.resolve("link/secret.txt", AccessMode::Read),
            Err(SandboxError::OutsideRoot(_))
        ));
        assert!(sandbox.read_to_string("link/secret.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn write_through_symlinked_allowed_dir_is_denied() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("outside");
        fs::create_dir_all(temp.path().join("_dev/build")).expect("build dir");
        std::os::unix::fs::symlink(outside.path(), temp.path().join("_dev/build/docs"))
            .expect("symlink");

        let err = sandbox(temp.path())
            .write("_dev/build/docs/README.md", "pwned")
            .unwrap_err();
        assert!(err.contains("access denied"));
        assert!(!outside.path().join("README.md").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_root_is_resolved_before_comparison() {
        let temp = package();
        let holder = tempfile::tempdir().expect("holder");
        let link = holder.path().join("pkg");
        std::os::unix::fs::symlink(temp.path(), &link).expect("symlink");

        let resolved = sandbox(&link)
            .resolve("manifest.yml", AccessMode::Read)
            .expect("resolve through symlinked root");
        assert!(resolved.starts_with(fs::canonicalize(temp.path()).expect("canon")));
    }

    #[test]
    fn write_outside_allowed_dir_is_denied_even_inside_root() {
        let temp = package();
        let sandbox = sandbox(temp.path());
        for path in ["manifest.yml", "_dev/build/other.md", "docs/README.md", "_dev/build/docs"] {
            assert!(
                matches!(
                    sandbox.resolve(path, AccessMode::Write),
                    Err(SandboxError::OutsideWriteScope { .. })
                ),
                "write {path}"
            );
        }
    }

    #[test]
    fn write_creates_missing_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = sandbox(temp.path())
            .write("_dev/build/docs/nested/README.md", "hello")
            .expect("write");
        assert_eq!(fs::read_to_string(path).expect("read"), "hello");
    }

    #[test]
    fn relative_root_resolves_write_target_with_missing_ancestors() {
        // Cargo runs tests from the crate directory, which has no `_dev/`.
        assert!(!Path::new("_dev").exists());
        let resolved = sandbox(Path::new("."))
            .resolve("_dev/build/docs/README.md", AccessMode::Write)
            .expect("resolve under relative root");
        let cwd = fs::canonicalize(".").expect("cwd");
        assert_eq!(resolved, cwd.join("_dev/build/docs/README.md"));
        assert!(!Path::new("_dev").exists());
    }

    #[test]
    fn missing_ancestor_of_relative_path_resolves_against_cwd() {
        let resolved = resolve_missing(Path::new("no-such-dir/child.md"), "no-such-dir/child.md")
            .expect("resolve");
        assert!(resolved.is_absolute());
        assert_eq!(
            resolved,
            fs::canonicalize(".").expect("cwd").join("no-such-dir/child.md")
        );
    }

    #[test]
    fn generated_docs_are_excluded_except_knowledge_base() {
        let temp = package();
        let sandbox = sandbox(temp.path());
        assert!(matches!(
            sandbox.resolve("docs/README.md", AccessMode::Read),
            Err(SandboxError::Excluded { .. })
        ));
        assert!(matches!(
            sandbox.resolve("./docs/../docs/README.md", AccessMode::Read),
            Err(SandboxError::Excluded { .. })
        ));
        assert_eq!(
            sandbox
                .read_to_string("docs/knowledge_base/service.md")
                .expect("kb read"),
            "kb"
        );
        assert!(sandbox.resolve("docs", AccessMode::Read).is_ok());
    }

    #[test]
    fn listing_hides_generated_docs_but_keeps_knowledge_base() {
        let temp = package();
        let sandbox = sandbox(temp.path());

        let root: Vec<String> = sandbox
            .list_dir("")
            .expect("list root")
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(root, vec!["_dev", "docs", "manifest.yml"]);

        let docs = sandbox.list_dir("docs").expect("list docs");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "knowledge_base");
        assert!(docs[0].is_dir);
    }

    #[test]
    fn visibility_keeps_whitelist_ancestors() {
        let temp = package();
        let sandbox = sandbox(temp.path());
        assert!(sandbox.is_visible(Path::new("docs")));
        assert!(sandbox.is_visible(Path::new("docs/knowledge_base/a.md")));
        assert!(!sandbox.is_visible(Path::new("docs/README.md")));
        assert!(sandbox.is_visible(Path::new("_dev/build/docs/README.md")));
    }
}
