//! Collection Generator
//!
//! Drives the compositor once per item and writes `{id}.png`.
//! Duplicate DNA is detected here; whether it is tolerated depends on the
//! configured uniqueness policy.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::compositor::Compositor;
use crate::config::{clear_artifacts, UniquenessPolicy};
use crate::hashing::derive_dna;
use crate::layers::Attribute;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Cannot prepare output directory {0}: {1}")]
    OutputDir(PathBuf, std::io::Error),
}

/// Image file name for an item ID. The join key between stages.
pub fn image_file_name(id: u32) -> String {
    format!("{}.png", id)
}

#[derive(Debug, Clone)]
pub struct Item {
    pub id: u32,
    pub attributes: Vec<Attribute>,
    pub dna: String,
    /// None when the image could not be written
    pub image_path: Option<PathBuf>,
    pub empty_layers: Vec<String>,
    /// Compositions tried for this item (1 unless rerolled)
    pub attempts: u32,
}

/// Items sharing one DNA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub dna: String,
    pub ids: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub items: Vec<Item>,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Groups of two or more items with identical DNA, ordered by DNA.
    pub fn duplicates(&self) -> Vec<DuplicateGroup> {
        let mut by_dna: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for item in &self.items {
            by_dna.entry(item.dna.as_str()).or_default().push(item.id);
        }
        by_dna
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(dna, ids)| DuplicateGroup { dna: dna.to_string(), ids })
            .collect()
    }
}

pub struct CollectionGenerator<'a> {
    compositor: Compositor<'a>,
    images_dir: PathBuf,
    uniqueness: UniquenessPolicy,
}

impl<'a> CollectionGenerator<'a> {
    pub fn new(compositor: Compositor<'a>, images_dir: &Path, uniqueness: UniquenessPolicy) -> Self {
        Self {
            compositor,
            images_dir: images_dir.to_path_buf(),
            uniqueness,
        }
    }

    /// Generate items `1..=count`.
    ///
    /// Always yields exactly `count` items. Images from an earlier run are
    /// removed first, so the folder holds this collection only. Only an
    /// unusable output directory is an error.
    pub fn generate<R: Rng + ?Sized>(&self, count: u32, rng: &mut R) -> Result<Collection, GenerateError> {
        let removed = clear_artifacts(&self.images_dir)
            .map_err(|e| GenerateError::OutputDir(self.images_dir.clone(), e))?;
        if removed > 0 {
            info!(path = %self.images_dir.display(), removed, "Cleared previous images");
        }

        let max_rerolls = match self.uniqueness {
            UniquenessPolicy::Allow => 0,
            UniquenessPolicy::Reroll { max_attempts } => max_attempts,
        };

        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut collection = Collection { items: Vec::with_capacity(count as usize) };

        for id in 1..=count {
            let _span = info_span!("item", id).entered();
            info!("Composing image");

            let mut attempts = 0;
            let (composition, dna) = loop {
                attempts += 1;
                let composition = self.compositor.compose(rng);
                let dna = derive_dna(&composition.attributes);
                match seen.get(&dna) {
                    Some(first) if attempts <= max_rerolls => {
                        debug!(dna = %dna, duplicate_of = first, attempt = attempts, "Rerolling duplicate");
                    }
                    Some(first) => {
                        warn!(dna = %dna, duplicate_of = first, "Duplicate trait combination");
                        break (composition, dna);
                    }
                    None => break (composition, dna),
                }
            };
            seen.entry(dna.clone()).or_insert(id);

            let path = self.images_dir.join(image_file_name(id));
            let image_path = match composition.image.save(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Image saved");
                    Some(path)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to save image");
                    // a partial file would still be published
                    if path.exists() {
                        let _ = fs::remove_file(&path);
                    }
                    None
                }
            };

            collection.items.push(Item {
                id,
                attributes: composition.attributes,
                dna,
                image_path,
                empty_layers: composition.empty_layers,
                attempts,
            });
        }

        info!(count = collection.len(), "Generation complete");
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::TraitRepository;
    use image::{Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn fixture(traits: &[(&str, &[&str])]) -> (TempDir, Vec<String>) {
        let dir = TempDir::new().unwrap();
        let mut order = vec![];
        for (layer, names) in traits {
            let layer_dir = dir.path().join("layers").join(layer);
            fs::create_dir_all(&layer_dir).unwrap();
            for name in names.iter() {
                RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]))
                    .save(layer_dir.join(format!("{}.png", name)))
                    .unwrap();
            }
            order.push(layer.to_string());
        }
        (dir, order)
    }

    #[test]
    fn test_ids_are_sequential_and_images_written() {
        let (dir, order) = fixture(&[("background", &["red", "blue"][..]), ("body", &["robot"][..])]);
        let repo = TraitRepository::scan(&dir.path().join("layers"), &order);
        let images = dir.path().join("out");
        let generator = CollectionGenerator::new(
            Compositor::new(&repo, &order, [2, 2]),
            &images,
            UniquenessPolicy::Allow,
        );

        let collection = generator.generate(4, &mut StdRng::seed_from_u64(5)).unwrap();
        let ids: Vec<u32> = collection.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        for item in &collection.items {
            assert!(images.join(image_file_name(item.id)).is_file());
            assert_eq!(item.dna, derive_dna(&item.attributes));
        }
    }

    #[test]
    fn test_stale_images_are_cleared() {
        let (dir, order) = fixture(&[("body", &["robot"][..])]);
        let repo = TraitRepository::scan(&dir.path().join("layers"), &order);
        let images = dir.path().join("out");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("9.png"), b"old").unwrap();
        fs::write(images.join("1.png"), b"old").unwrap();

        let generator = CollectionGenerator::new(
            Compositor::new(&repo, &order, [2, 2]),
            &images,
            UniquenessPolicy::Allow,
        );
        let collection = generator.generate(2, &mut StdRng::seed_from_u64(3)).unwrap();

        assert!(!images.join("9.png").exists());
        assert_ne!(fs::read(images.join("1.png")).unwrap(), b"old");
        assert_eq!(collection.get(1).unwrap().image_path.as_deref(), Some(images.join("1.png").as_path()));
        assert_eq!(fs::read_dir(&images).unwrap().count(), 2);
    }

    #[test]
    fn test_duplicates_allowed_and_reported() {
        let (dir, order) = fixture(&[("body", &["robot"][..])]);
        let repo = TraitRepository::scan(&dir.path().join("layers"), &order);
        let generator = CollectionGenerator::new(
            Compositor::new(&repo, &order, [2, 2]),
            &dir.path().join("out"),
            UniquenessPolicy::Allow,
        );

        let collection = generator.generate(3, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(collection.len(), 3);
        assert_eq!(
            collection.duplicates(),
            vec![DuplicateGroup { dna: "robot".into(), ids: vec![1, 2, 3] }]
        );
    }

    #[test]
    fn test_reroll_gives_up_after_max_attempts() {
        let (dir, order) = fixture(&[("body", &["robot"][..])]);
        let repo = TraitRepository::scan(&dir.path().join("layers"), &order);
        let generator = CollectionGenerator::new(
            Compositor::new(&repo, &order, [2, 2]),
            &dir.path().join("out"),
            UniquenessPolicy::Reroll { max_attempts: 2 },
        );

        let collection = generator.generate(2, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get(1).unwrap().attempts, 1);
        assert_eq!(collection.get(2).unwrap().attempts, 3);
    }

    #[test]
    fn test_reroll_finds_unique_combinations() {
        let (dir, order) = fixture(&[
            ("background", &["a", "b", "c"][..]),
            ("body", &["d", "e", "f"][..]),
        ]);
        let repo = TraitRepository::scan(&dir.path().join("layers"), &order);
        let generator = CollectionGenerator::new(
            Compositor::new(&repo, &order, [2, 2]),
            &dir.path().join("out"),
            UniquenessPolicy::Reroll { max_attempts: 500 },
        );

        let collection = generator.generate(6, &mut StdRng::seed_from_u64(11)).unwrap();
        assert!(collection.duplicates().is_empty());
    }
}
