mod app_config;
mod config;
mod markets;
mod products;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use markets::{
    load_markets, GraphQlMarket, GraphQlOperations, MarketApi, MarketConfig, MarketsFile,
    OperationConfig, RestMarket,
};
pub use products::{CategoryLevel, CategoryNode, CategoryPath, Price, ProductIds, ProductRecord};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read markets file at {path}: {source}")]
    MarketsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse markets file: {0}")]
    MarketsFileParse(#[from] serde_yaml::Error),

    #[error("failed to read GraphQL query file at {path}: {source}")]
    QueryFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("markets validation error: {0}")]
    Validation(String),
}
