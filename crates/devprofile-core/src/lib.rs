pub mod app_config;
pub mod config;
pub mod error;
pub mod merge;
pub mod profile;

pub use app_config::AppConfig;
pub use config::load_app_config;
pub use error::ConfigError;
pub use merge::merge_profiles;
pub use profile::{ProfileRecord, Provider, ProviderProfiles, RepositoryCount};
