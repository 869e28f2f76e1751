//! Package manifest (`manifest.yml`) fields used to describe the package to the model.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "manifest.yml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageManifest {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub description: String,
}

/// Read `<root>/manifest.yml`. Unknown fields are ignored.
pub fn read_manifest(root: &Path) -> Result<PackageManifest> {
    let path = root.join(MANIFEST_FILE);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("read package manifest {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_known_fields_and_ignores_the_rest() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join(MANIFEST_FILE),
            "format_version: 3.0.0\nname: nginx\ntitle: Nginx\nversion: 1.2.0\n\
             description: Collect logs\ntype: integration\nowner:\n  github: elastic/obs\n",
        )
        .expect("manifest");

        let manifest = read_manifest(temp.path()).expect("read");
        assert_eq!(manifest.name, "nginx");
        assert_eq!(manifest.kind, "integration");
        assert_eq!(manifest.version, "1.2.0");
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = read_manifest(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("manifest.yml"));
    }
}
