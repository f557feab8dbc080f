use std::path::PathBuf;

/// Problems with the campaign configuration. All of these are fatal and are
/// raised before any job is launched or any output is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("neither a tier nor an explicit --set was given")]
    NoSelection,
    #[error("unknown tier {0} (expected 0, 1, 2 or 3)")]
    UnknownTier(u8),
    #[error("malformed --set entry '{0}': expected \"cpu attr triple\"")]
    MalformedSetEntry(String),
    #[error("invalid duration '{0}': expected <number><s|m|h|d|w>")]
    InvalidDuration(String),
    #[error("repeat index for {0} does not fit in u32; lower --offset or --repeat")]
    RepeatIndexOverflow(String),
    #[error("failed to load campaign tables from {path}: {source}")]
    TablesFile {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
