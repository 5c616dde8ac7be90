//! Provider-ordered profile collection.

use devprofile_core::{ProfileRecord, ProviderProfiles};

use crate::error::SourceError;
use crate::source::{BitbucketOptions, ProfileSource};

/// The names to look up for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileQuery {
    /// Default name, used for any provider without an override.
    pub username: String,
    pub github_username: Option<String>,
    pub bitbucket_username: Option<String>,
    /// Look the Bitbucket name up as a team (`true`) or a user.
    pub bitbucket_team: bool,
}

impl ProfileQuery {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            github_username: None,
            bitbucket_username: None,
            bitbucket_team: true,
        }
    }

    #[must_use]
    pub fn github_name(&self) -> &str {
        self.github_username.as_deref().unwrap_or(&self.username)
    }

    #[must_use]
    pub fn bitbucket_name(&self) -> &str {
        self.bitbucket_username.as_deref().unwrap_or(&self.username)
    }
}

/// Fetches the GitHub profile, then the Bitbucket profile.
///
/// An unknown account on either provider becomes `None`. Any other failure
/// is returned as soon as it happens, so a GitHub error means Bitbucket is
/// never contacted.
///
/// # Errors
///
/// Returns the first [`SourceError`] other than
/// [`SourceError::UnknownProfile`].
pub async fn collect_profiles<G, B>(
    github: &G,
    bitbucket: &B,
    query: &ProfileQuery,
) -> Result<ProviderProfiles, SourceError>
where
    G: ProfileSource<Options = ()> + Sync,
    B: ProfileSource<Options = BitbucketOptions> + Sync,
{
    let github_profile = fetch_or_absent(github, query.github_name(), &()).await?;

    let options = BitbucketOptions {
        is_team: query.bitbucket_team,
    };
    let bitbucket_profile = fetch_or_absent(bitbucket, query.bitbucket_name(), &options).await?;

    tracing::debug!(
        github_found = github_profile.is_some(),
        bitbucket_found = bitbucket_profile.is_some(),
        "profile lookup finished"
    );
    Ok(ProviderProfiles {
        github: github_profile,
        bitbucket: bitbucket_profile,
    })
}

async fn fetch_or_absent<S: ProfileSource + Sync>(
    source: &S,
    profile_name: &str,
    options: &S::Options,
) -> Result<Option<ProfileRecord>, SourceError> {
    match source.fetch_profile(profile_name, options).await {
        Ok(profile) => Ok(Some(profile)),
        Err(SourceError::UnknownProfile { message }) => {
            tracing::warn!(provider = %source.provider(), profile_name, "{message}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
