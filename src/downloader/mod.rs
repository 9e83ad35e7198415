// Downloader module - strategy orchestration over capability ports

pub mod backends;
pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{DownloadError, TranscodeError};
pub use format_selector::{build_quality_options, FormatChain, QualityOption};
pub use models::{Acquisition, MediaItem, MediaKind, PageMedia, Strategy, TargetQuality};
pub use orchestrator::Orchestrator;
pub use pool::WorkerPool;
pub use progress::{ProgressCallback, ProgressStatus, ProgressUpdate};
pub use tools::{ToolInfo, ToolManager, ToolType};
pub use traits::{
    BrowserPort, FileFetcher, MetadataPort, MirrorPort, PlatformApiPort, PostResolver, TranscoderPort,
};
