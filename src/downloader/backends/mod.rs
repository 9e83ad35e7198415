// Capability adapters over external tools and services

pub mod chromium;
pub mod ffmpeg;
pub mod http;
pub mod instagram;
pub mod nitter;
pub mod vk;
pub mod ytdlp;

pub use chromium::ChromiumBackend;
pub use ffmpeg::FfmpegBackend;
pub use http::HttpFetcher;
pub use instagram::InstagramApiBackend;
pub use nitter::NitterBackend;
pub use vk::VkWallResolver;
pub use ytdlp::YtDlpBackend;
