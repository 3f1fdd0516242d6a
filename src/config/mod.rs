// Configuration management module
// TOML configuration file, enumerated environment overrides and display

pub mod display;
pub mod settings;


pub use display::{init_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, EmbeddingProviderKind, HnswConfig, IndexingConfig,
    RetrievalConfig, StoreBackend, VectorStoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
