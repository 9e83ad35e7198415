pub mod classifier;
pub mod config;
pub mod downloader;
pub mod merge;
pub mod pipeline;
pub mod request_store;

pub use classifier::{classify, ClassificationError, ClassifiedRequest, ContentKind, Platform};
pub use config::{ConfigError, PipelineConfig};
pub use downloader::{Acquisition, DownloadError, MediaItem, MediaKind, Orchestrator, TargetQuality};
pub use merge::{MergeEngine, MergeError, MergeResult};
pub use pipeline::{DeliveryPayload, Pipeline, PipelineError, PipelineOutput, ProcessOptions, QualityProposal};
pub use request_store::{RequestStore, RequesterId, TokenRedemptionError};
