//! Compositor - Layered Rendering
//!
//! Samples one trait per layer (uniformly, independently) and paints them
//! over a transparent canvas in layer order.

use image::{imageops, Rgba, RgbaImage};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::layers::{Attribute, TraitRepository};

#[derive(Debug, Error)]
pub enum TraitLoadError {
    #[error("Failed to load trait {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Output of one composition
#[derive(Debug, Clone)]
pub struct Composition {
    pub image: RgbaImage,
    /// Attributes in layer order
    pub attributes: Vec<Attribute>,
    /// Layers that contributed nothing to this composition
    pub empty_layers: Vec<String>,
}

pub struct Compositor<'a> {
    repo: &'a TraitRepository,
    layer_order: &'a [String],
    size: [u32; 2],
}

impl<'a> Compositor<'a> {
    pub fn new(repo: &'a TraitRepository, layer_order: &'a [String], size: [u32; 2]) -> Self {
        Self { repo, layer_order, size }
    }

    pub fn compose<R: Rng + ?Sized>(&self, rng: &mut R) -> Composition {
        let mut canvas = RgbaImage::from_pixel(self.size[0], self.size[1], Rgba([0, 0, 0, 0]));
        let mut attributes = Vec::with_capacity(self.layer_order.len());
        let mut empty_layers = vec![];

        for layer in self.layer_order {
            let Some(chosen) = self.repo.traits(layer).choose(rng) else {
                warn!(layer = %layer, "No trait found for layer, skipping");
                empty_layers.push(layer.clone());
                continue;
            };

            match load_trait(&chosen.path) {
                Ok(trait_image) => {
                    imageops::overlay(&mut canvas, &trait_image, 0, 0);
                    debug!(layer = %layer, value = %chosen.file_stem, "Layer applied");
                    attributes.push(chosen.attribute());
                }
                Err(e) => {
                    warn!(layer = %layer, error = %e, "Trait could not be applied, skipping");
                    empty_layers.push(layer.clone());
                }
            }
        }

        Composition { image: canvas, attributes, empty_layers }
    }
}

/// Decode a trait file into RGBA8.
pub fn load_trait(path: &Path) -> Result<RgbaImage, TraitLoadError> {
    let img = image::open(path).map_err(|source| TraitLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgba8())
}
