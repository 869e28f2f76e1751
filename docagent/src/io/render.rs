//! Preview rendering of the managed document.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior, context};

use crate::io::manifest::PackageManifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content: String,
    /// Whether the rendered form is meaningful to show.
    pub applicable: bool,
}

/// Produces the human-facing preview. Never consulted for outcome decisions.
pub trait DocumentRenderer {
    fn render(&self, content: &str) -> Result<Rendered>;
}

/// Renders the document as a minijinja template over package metadata.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    root: PathBuf,
    manifest: PackageManifest,
}

impl TemplateRenderer {
    pub fn new(root: &Path, manifest: PackageManifest) -> Self {
        Self {
            root: root.to_path_buf(),
            manifest,
        }
    }

    fn data_streams(&self) -> Result<Vec<String>> {
        let dir = self.root.join("data_stream");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("list {}", dir.display()))? {
            let entry = entry.with_context(|| format!("list {}", dir.display()))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl DocumentRenderer for TemplateRenderer {
    fn render(&self, content: &str) -> Result<Rendered> {
        if content.trim().is_empty() {
            return Ok(Rendered {
                content: String::new(),
                applicable: false,
            });
        }
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        let rendered = env
            .render_str(
                content,
                context! {
                    package => &self.manifest,
                    data_streams => self.data_streams()?,
                },
            )
            .context("render document preview")?;
        Ok(Rendered {
            content: rendered,
            applicable: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(root: &Path) -> TemplateRenderer {
        let manifest = PackageManifest {
            name: "nginx".to_string(),
            title: "Nginx".to_string(),
            ..PackageManifest::default()
        };
        TemplateRenderer::new(root, manifest)
    }

    #[test]
    fn renders_package_fields_and_data_streams() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("data_stream/error")).expect("ds");
        fs::create_dir_all(temp.path().join("data_stream/access")).expect("ds");

        let rendered = renderer(temp.path())
            .render("# {{ package.title }}\n{% for ds in data_streams %}- {{ ds }}\n{% endfor %}")
            .expect("render");
        assert!(rendered.applicable);
        assert_eq!(rendered.content, "# Nginx\n- access\n- error\n");
    }

    #[test]
    fn plain_markdown_renders_unchanged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let rendered = renderer(temp.path()).render("# Title\n\ntext\n").expect("render");
        assert_eq!(rendered.content, "# Title\n\ntext\n");
    }

    #[test]
    fn empty_document_is_not_applicable() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(!renderer(temp.path()).render("  \n").expect("render").applicable);
    }

    #[test]
    fn unknown_variable_is_a_render_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(renderer(temp.path()).render("{{ missing }}").is_err());
    }
}
