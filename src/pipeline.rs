//! Collection Pipeline - Single Entry Point
//!
//! Generate -> Publish Images -> Build Metadata -> Publish Metadata.
//! Each stage feeds the next, so an empty stage halts the run. Only the
//! final metadata publish is allowed to fail softly.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::compositor::Compositor;
use crate::config::CollectionConfig;
use crate::generator::{image_file_name, Collection, CollectionGenerator, GenerateError};
use crate::layers::TraitRepository;
use crate::metadata::{ipfs_uri, metadata_file_name, MetadataBuilder, MetadataError};
use crate::publisher::{PinningService, PublishError, PublishMode, PublishResult, Publisher};
use crate::report::{ItemRecord, PublishSummary, RunReport};
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    PublishImages,
    BuildMetadata,
    PublishMetadata,
    /// Sealing the run report after the four stages
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Generate => "generate",
            Self::PublishImages => "publish-images",
            Self::BuildMetadata => "build-metadata",
            Self::PublishMetadata => "publish-metadata",
            Self::Report => "report",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage generate failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("Stage generate produced no items")]
    NothingGenerated,

    #[error("Stage publish-images failed: {0}")]
    ImagePublish(PublishError),

    #[error("Stage publish-images uploaded no images")]
    NoImagesPublished,

    #[error("Stage build-metadata failed: {0}")]
    MetadataDir(MetadataError),

    #[error("Stage build-metadata produced no records")]
    NoMetadataBuilt,

    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Generate(_) | Self::NothingGenerated => Stage::Generate,
            Self::ImagePublish(_) | Self::NoImagesPublished => Stage::PublishImages,
            Self::MetadataDir(_) | Self::NoMetadataBuilt => Stage::BuildMetadata,
            Self::Report(_) => Stage::Report,
        }
    }
}

/// Metadata stage output, keyed by item ID
#[derive(Debug, Clone, Default)]
pub struct MetadataOutcome {
    pub built: BTreeMap<u32, PathBuf>,
    pub skipped: Vec<u32>,
}

/// Seeded when configured, otherwise from entropy.
pub fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// The collection pipeline
pub struct CollectionPipeline {
    config: CollectionConfig,
}

impl CollectionPipeline {
    pub fn new(config: CollectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Stage 1. Writes `{id}.png` for every item.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Collection, PipelineError> {
        let repo = TraitRepository::scan(&self.config.layers_dir, &self.config.layer_order);
        if repo.is_empty() {
            warn!(path = %self.config.layers_dir.display(), "No layer has any traits");
        }

        let compositor = Compositor::new(&repo, &self.config.layer_order, self.config.image_size);
        let generator = CollectionGenerator::new(
            compositor,
            &self.config.layout().images_dir(),
            self.config.uniqueness,
        );

        let collection = generator.generate(self.config.total_items, rng)?;
        if collection.is_empty() {
            return Err(PipelineError::NothingGenerated);
        }

        for group in collection.duplicates() {
            warn!(dna = %group.dna, ids = ?group.ids, "Items share the same DNA");
        }
        Ok(collection)
    }

    /// Stage 3. Builds metadata only for items whose image was written and
    /// pinned. Records from an earlier run are removed first.
    pub fn build_metadata(
        &self,
        collection: &Collection,
        images: &PublishResult,
    ) -> Result<MetadataOutcome, PipelineError> {
        let builder = MetadataBuilder::new(
            &self.config.name,
            &self.config.description,
            &self.config.layout().metadata_dir(),
        );
        builder.prepare().map_err(PipelineError::MetadataDir)?;

        let mut outcome = MetadataOutcome::default();
        for item in &collection.items {
            let image_name = image_file_name(item.id);
            if item.image_path.is_none() {
                warn!(id = item.id, "Image was never written, metadata skipped");
                outcome.skipped.push(item.id);
                continue;
            }
            let Some(cid) = images.get(&image_name) else {
                warn!(id = item.id, file = %image_name, "No content identifier for image, metadata skipped");
                outcome.skipped.push(item.id);
                continue;
            };

            match builder.build(item.id, &item.attributes, &ipfs_uri(cid)) {
                Ok((_, path)) => {
                    outcome.built.insert(item.id, path);
                }
                Err(e) => {
                    warn!(id = item.id, error = %e, "Metadata could not be written, skipped");
                    outcome.skipped.push(item.id);
                }
            }
        }
        Ok(outcome)
    }

    /// Run all four stages with the configured seed.
    pub fn run(&self, service: &dyn PinningService) -> Result<RunReport, PipelineError> {
        let mut rng = rng_for(self.config.seed);
        self.run_with_rng(service, &mut rng)
    }

    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        service: &dyn PinningService,
        rng: &mut R,
    ) -> Result<RunReport, PipelineError> {
        let layout = self.config.layout();
        let publisher = Publisher::new(service);

        info!(stage = %Stage::Generate, items = self.config.total_items, "Stage started");
        let collection = self.generate(rng)?;

        info!(stage = %Stage::PublishImages, service = service.name(), "Stage started");
        let images = publisher
            .publish_folder(&layout.images_dir(), PublishMode::Files)
            .map_err(PipelineError::ImagePublish)?;
        if images.is_empty() {
            return Err(PipelineError::NoImagesPublished);
        }

        info!(stage = %Stage::BuildMetadata, "Stage started");
        let metadata = self.build_metadata(&collection, &images)?;
        if metadata.built.is_empty() {
            return Err(PipelineError::NoMetadataBuilt);
        }

        info!(stage = %Stage::PublishMetadata, service = service.name(), "Stage started");
        let (metadata_cids, metadata_publish_error) =
            match publisher.publish_folder(&layout.metadata_dir(), PublishMode::Documents) {
                Ok(result) => {
                    if result.is_empty() {
                        warn!("Metadata documents could not be published");
                    }
                    (Some(result), None)
                }
                Err(e) => {
                    warn!(error = %e, "Metadata documents could not be published");
                    (None, Some(e.to_string()))
                }
            };

        let items = collection
            .items
            .iter()
            .map(|item| ItemRecord {
                id: item.id,
                dna: item.dna.clone(),
                image_cid: images.get(&image_file_name(item.id)).cloned(),
                metadata_cid: metadata
                    .built
                    .get(&item.id)
                    .and(metadata_cids.as_ref())
                    .and_then(|r| r.get(&metadata_file_name(item.id)))
                    .cloned(),
            })
            .collect();

        let mut report = RunReport {
            run_id: Uuid::new_v4().to_string(),
            generator_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
            collection: self.config.name.clone(),
            backend: service.name().to_string(),
            generated: collection.len(),
            images: PublishSummary::from(&images),
            metadata_built: metadata.built.len(),
            metadata: metadata_cids.as_ref().map(PublishSummary::from),
            metadata_publish_error,
            skipped_ids: metadata.skipped,
            duplicates: collection.duplicates(),
            items,
            images_dir: layout.images_dir().display().to_string(),
            metadata_dir: layout.metadata_dir().display().to_string(),
            manifest_hash: String::new(),
        };
        report.seal()?;

        if let Err(e) = report.write(&layout.report_path()) {
            warn!(path = %layout.report_path().display(), error = %e, "Report could not be written");
        }

        info!(
            generated = report.generated,
            images_published = %report.images,
            metadata_built = report.metadata_built,
            metadata_published = %report
                .metadata
                .map_or_else(|| "none".to_string(), |m| m.to_string()),
            "Pipeline complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_stage() {
        assert_eq!(PipelineError::NothingGenerated.stage(), Stage::Generate);
        assert_eq!(PipelineError::NoImagesPublished.stage(), Stage::PublishImages);
        assert_eq!(PipelineError::NoMetadataBuilt.stage(), Stage::BuildMetadata);
        assert!(PipelineError::NoImagesPublished.to_string().contains("publish-images"));
    }

    #[test]
    fn test_report_failure_is_not_a_metadata_stage() {
        let err = PipelineError::from(serde_json::from_str::<u32>("x").unwrap_err());
        assert_eq!(err.stage(), Stage::Report);
        assert_ne!(err.stage(), Stage::PublishMetadata);
        assert_eq!(Stage::Report.to_string(), "report");
    }

    #[test]
    fn test_seeded_rng_repeats() {
        let a: u64 = rng_for(Some(4)).gen();
        let b: u64 = rng_for(Some(4)).gen();
        assert_eq!(a, b);
    }
}
