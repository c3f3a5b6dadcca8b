mod settings;

pub use settings::{
    ApiConfig, DatabaseConfig, LoggingConfig, OtelConfig, ProviderConfig, RenderingConfig,
    ServerConfig, Settings, StorageConfig,
};
