//! NFTForge Core - Layered Collection Generator
//!
//! # Pipeline
//! 1. Generate: one trait per layer, composited in layer order
//! 2. Publish Images: pin `{id}.png` to IPFS
//! 3. Build Metadata: `{id}.json` pointing at `ipfs://{cid}`
//! 4. Publish Metadata: pin the documents (failure here is a warning)
//!
//! Stages join on file names only. A missing image CID skips that item.

pub mod config;
pub mod layers;
pub mod compositor;
pub mod generator;
pub mod hashing;
pub mod metadata;
pub mod publisher;
pub mod backends;
pub mod report;
pub mod pipeline;

pub use config::{BackendKind, CollectionConfig, Credentials, OutputLayout, UniquenessPolicy};
pub use layers::{Attribute, Trait, TraitRepository};
pub use compositor::{Composition, Compositor};
pub use generator::{Collection, CollectionGenerator, DuplicateGroup, Item};
pub use hashing::{derive_dna, compute_manifest_hash, canonical_json};
pub use metadata::{MetadataBuilder, MetadataRecord};
pub use publisher::{ContentId, PinningService, PublishError, PublishMode, PublishResult, Publisher, UploadError};
pub use backends::{service_for, PinataService, Web3StorageService};
pub use report::RunReport;
pub use pipeline::{CollectionPipeline, PipelineError, Stage};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
