//! Protected-region extraction and preservation checks.

use std::collections::BTreeMap;

use crate::core::types::PreservationWarning;

/// A recognized start/end delimiter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPair {
    pub name: &'static str,
    pub start: &'static str,
    pub end: &'static str,
}

/// Marker vocabularies recognized simultaneously.
pub const MARKERS: &[MarkerPair] = &[
    MarkerPair {
        name: "HUMAN-EDITED",
        start: "<!-- HUMAN-EDITED START -->",
        end: "<!-- HUMAN-EDITED END -->",
    },
    MarkerPair {
        name: "PRESERVE",
        start: "<!-- PRESERVE START -->",
        end: "<!-- PRESERVE END -->",
    },
];

/// Extract every protected region in `content`, markers included.
///
/// Each vocabulary is scanned left to right for non-overlapping pairs; keys
/// are `<NAME>-<n>` with `n` counting from 1 per vocabulary. A start marker
/// without a matching end marker ends the scan for that vocabulary.
pub fn extract_regions(content: &str) -> BTreeMap<String, String> {
    let mut regions = BTreeMap::new();
    for marker in MARKERS {
        let mut cursor = 0;
        let mut number = 1;
        while let Some(found) = content[cursor..].find(marker.start) {
            let start = cursor + found;
            let after_start = start + marker.start.len();
            let Some(found_end) = content[after_start..].find(marker.end) else {
                break;
            };
            let end = after_start + found_end + marker.end.len();
            regions.insert(
                format!("{}-{}", marker.name, number),
                content[start..end].to_string(),
            );
            cursor = end;
            number += 1;
        }
    }
    regions
}

/// Report protected regions of `original` that do not appear verbatim in `updated`.
///
/// Warnings are ordered by region key. The check is advisory.
pub fn validate_preservation(original: &str, updated: &str) -> Vec<PreservationWarning> {
    extract_regions(original)
        .into_iter()
        .filter(|(_, text)| !updated.contains(text.as_str()))
        .map(|(region, _)| PreservationWarning { region })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION: &str = "<!-- HUMAN-EDITED START -->\nKeep me.\n<!-- HUMAN-EDITED END -->";

    #[test]
    fn extracts_repeated_regions_with_sequential_keys() {
        let content = format!(
            "intro\n{REGION}\nmiddle\n<!-- HUMAN-EDITED START -->two<!-- HUMAN-EDITED END -->\n\
             <!-- PRESERVE START -->p<!-- PRESERVE END -->"
        );
        let regions = extract_regions(&content);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions["HUMAN-EDITED-1"], REGION);
        assert_eq!(
            regions["HUMAN-EDITED-2"],
            "<!-- HUMAN-EDITED START -->two<!-- HUMAN-EDITED END -->"
        );
        assert_eq!(
            regions["PRESERVE-1"],
            "<!-- PRESERVE START -->p<!-- PRESERVE END -->"
        );
    }

    #[test]
    fn unterminated_region_is_ignored() {
        let content = format!("{REGION}\n<!-- HUMAN-EDITED START -->dangling");
        let regions = extract_regions(&content);
        assert_eq!(regions.len(), 1);
        assert!(regions.contains_key("HUMAN-EDITED-1"));
    }

    #[test]
    fn preserved_region_anywhere_produces_no_warning() {
        let original = format!("# Title\n{REGION}\n");
        let updated = format!("# New title\n\n## Setup\n\nsteps\n\n{REGION}\n\nfooter");
        assert!(validate_preservation(&original, &updated).is_empty());
    }

    #[test]
    fn missing_region_produces_exactly_one_named_warning() {
        let original = format!("# Title\n{REGION}\n");
        let updated = "# Title\nKeep me.\n";
        let warnings = validate_preservation(&original, updated);
        assert_eq!(
            warnings,
            vec![PreservationWarning {
                region: "HUMAN-EDITED-1".to_string()
            }]
        );
        assert!(warnings[0].to_string().contains("HUMAN-EDITED-1"));
    }

    #[test]
    fn document_without_markers_never_warns() {
        assert!(validate_preservation("plain", "").is_empty());
    }
}
