pub mod plugin;
pub mod pool;
pub mod ytdlp;

pub use plugin::TrackResolver;
pub use pool::WorkerPool;
pub use ytdlp::YtDlpResolver;
