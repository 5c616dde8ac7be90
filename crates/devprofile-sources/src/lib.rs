//! Provider clients that fetch and normalize developer profiles.

pub mod bitbucket;
pub mod error;
pub mod github;
pub mod http;
pub mod lookup;
pub mod pagination;
pub mod source;

pub use bitbucket::BitbucketClient;
pub use error::{SourceError, SourceErrorKind};
pub use github::GithubClient;
pub use http::{build_http_client, http_client_from_config};
pub use lookup::{collect_profiles, ProfileQuery};
pub use source::{BitbucketOptions, ProfileSource};
