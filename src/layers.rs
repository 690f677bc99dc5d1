//! Trait Repository - Layered Assets on Disk
//!
//! One directory per layer, one PNG per trait. Missing or empty layers are
//! not fatal; they contribute no attribute.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const TRAIT_EXTENSION: &str = "png";

/// One (trait_type, value) pair on an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

impl Attribute {
    pub fn new(trait_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
        }
    }
}

/// A selectable asset within one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trait {
    pub layer: String,
    pub file_stem: String,
    pub path: PathBuf,
}

impl Trait {
    /// Display value: underscores become spaces, then capitalized.
    pub fn value(&self) -> String {
        capitalize(&self.file_stem.replace('_', " "))
    }

    pub fn attribute(&self) -> Attribute {
        Attribute::new(capitalize(&self.layer), self.value())
    }
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Why a layer has no candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerGap {
    Missing,
    NotADirectory,
    NoAssets,
}

/// Trait repository - scans each layer directory once
pub struct TraitRepository {
    layers: BTreeMap<String, Vec<Trait>>,
    gaps: BTreeMap<String, LayerGap>,
}

impl TraitRepository {
    /// Scan `root/<layer>` for every layer name. Never fails; problems are
    /// logged and recorded as gaps.
    pub fn scan(root: &Path, layer_names: &[String]) -> Self {
        let mut repo = Self {
            layers: BTreeMap::new(),
            gaps: BTreeMap::new(),
        };

        for name in layer_names {
            match scan_layer(root, name) {
                Ok(traits) => {
                    debug!(layer = %name, count = traits.len(), "Scanned layer");
                    repo.layers.insert(name.clone(), traits);
                }
                Err(gap) => {
                    let dir = root.join(name);
                    match gap {
                        LayerGap::Missing => {
                            warn!(layer = %name, path = %dir.display(), "Layer directory not found")
                        }
                        LayerGap::NotADirectory => {
                            warn!(layer = %name, path = %dir.display(), "Layer path is not a directory")
                        }
                        LayerGap::NoAssets => {
                            warn!(layer = %name, path = %dir.display(), "Layer has no PNG traits")
                        }
                    }
                    repo.layers.insert(name.clone(), Vec::new());
                    repo.gaps.insert(name.clone(), gap);
                }
            }
        }

        repo
    }

    /// Candidates for a layer, sorted by file name. Empty for unknown layers.
    pub fn traits(&self, layer: &str) -> &[Trait] {
        self.layers.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn gap(&self, layer: &str) -> Option<LayerGap> {
        self.gaps.get(layer).copied()
    }

    /// True when no layer has a single candidate.
    pub fn is_empty(&self) -> bool {
        self.layers.values().all(|t| t.is_empty())
    }
}

fn scan_layer(root: &Path, layer: &str) -> Result<Vec<Trait>, LayerGap> {
    let dir = root.join(layer);
    if !dir.exists() {
        return Err(LayerGap::Missing);
    }
    if !dir.is_dir() {
        return Err(LayerGap::NotADirectory);
    }

    let entries = fs::read_dir(&dir).map_err(|_| LayerGap::Missing)?;
    let mut traits = vec![];
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !path.extension().map_or(false, |e| e == TRAIT_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            traits.push(Trait {
                layer: layer.to_string(),
                file_stem: stem.to_string(),
                path: path.clone(),
            });
        }
    }

    if traits.is_empty() {
        return Err(LayerGap::NoAssets);
    }
    traits.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(traits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("background"), "Background");
        assert_eq!(capitalize("LASER eyes"), "Laser eyes");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_trait_value_from_stem() {
        let t = Trait {
            layer: "eyes".into(),
            file_stem: "laser_EYES".into(),
            path: PathBuf::from("eyes/laser_EYES.png"),
        };
        assert_eq!(t.value(), "Laser eyes");
        assert_eq!(t.attribute(), Attribute::new("Eyes", "Laser eyes"));
    }

    #[test]
    fn test_scan_sorted_png_only() {
        let dir = TempDir::new().unwrap();
        let body = dir.path().join("body");
        fs::create_dir(&body).unwrap();
        fs::write(body.join("zombie.png"), b"x").unwrap();
        fs::write(body.join("alien.png"), b"x").unwrap();
        fs::write(body.join("notes.txt"), b"x").unwrap();

        let repo = TraitRepository::scan(dir.path(), &layers(&["body"]));
        let stems: Vec<_> = repo.traits("body").iter().map(|t| t.file_stem.as_str()).collect();
        assert_eq!(stems, vec!["alien", "zombie"]);
        assert_eq!(repo.gap("body"), None);
    }

    #[test]
    fn test_scan_records_gaps() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("eyes")).unwrap();
        fs::write(dir.path().join("mouth"), b"not a dir").unwrap();

        let repo = TraitRepository::scan(dir.path(), &layers(&["eyes", "mouth", "hats"]));
        assert_eq!(repo.gap("eyes"), Some(LayerGap::NoAssets));
        assert_eq!(repo.gap("mouth"), Some(LayerGap::NotADirectory));
        assert_eq!(repo.gap("hats"), Some(LayerGap::Missing));
        assert!(repo.traits("hats").is_empty());
        assert!(repo.is_empty());
    }
}
