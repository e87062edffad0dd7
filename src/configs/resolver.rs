use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolverConfig {
    /// Extraction utility invoked for metadata and stream URLs.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Upper bound on concurrently running extractor processes.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Search prefix applied to free-text queries.
    #[serde(default = "default_search")]
    pub default_search: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            max_workers: default_max_workers(),
            default_search: default_search(),
        }
    }
}

fn default_binary() -> String {
    "yt-dlp".to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_search() -> String {
    "ytsearch1".to_string()
}
