//! Local adapters: external CLI tools, the download directory and the HTTP API.

pub mod cmd;
pub mod ffmpeg;
pub mod fs;
pub mod http;
pub mod process;
pub mod ytdlp;

pub use ffmpeg::FfmpegTranscoder;
pub use fs::LocalFileStore;
pub use ytdlp::YtDlpFetcher;
