use std::future::Future;

use devprofile_core::{ProfileRecord, Provider};

use crate::error::SourceError;

/// A provider that can produce one normalized [`ProfileRecord`] per account.
pub trait ProfileSource {
    /// Provider-specific lookup options.
    type Options: Sync;

    fn provider(&self) -> Provider;

    /// Fetches and normalizes the named profile.
    ///
    /// Fails with [`SourceError::UnknownProfile`] when the provider has no
    /// such account, [`SourceError::RateLimited`] when throttled, and
    /// [`SourceError::InvalidCredentials`] when authentication is rejected.
    fn fetch_profile(
        &self,
        profile_name: &str,
        options: &Self::Options,
    ) -> impl Future<Output = Result<ProfileRecord, SourceError>> + Send;
}

/// Bitbucket lookup options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitbucketOptions {
    /// Look the name up as a team (the default) rather than an individual user.
    pub is_team: bool,
}

impl Default for BitbucketOptions {
    fn default() -> Self {
        Self { is_team: true }
    }
}
