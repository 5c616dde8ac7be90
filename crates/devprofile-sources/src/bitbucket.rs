//! HTTP client for the Bitbucket Cloud 2.0 API.
//!
//! Bitbucket exposes counts through a `size` field and collections through
//! `{ "values": [...], "next": URL }` pages. The account resource links to
//! every other resource used here, so only the commits listing is built
//! from the base URL.

use std::collections::BTreeSet;

use devprofile_core::{AppConfig, ProfileRecord, Provider, RepositoryCount};
use futures::stream::{BoxStream, TryStreamExt};
use reqwest::{Client, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;

use crate::error::SourceError;
use crate::http::{endpoint, fetch_json, has_status, parse_base_url};
use crate::pagination::{paginate, Page, MAX_PAGES};
use crate::source::{BitbucketOptions, ProfileSource};

const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org/2.0";

/// Largest page size Bitbucket accepts on commit listings.
const COMMIT_PAGE_LEN: &str = "100";

/// Page bound for one repository's commit walk.
const COMMIT_MAX_PAGES: usize = 10_000;

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct AccountLinks {
    followers: Href,
    following: Href,
    repositories: Href,
}

#[derive(Debug, Deserialize)]
struct Account {
    username: Option<String>,
    links: AccountLinks,
}

#[derive(Debug, Deserialize)]
struct RepoLinks {
    watchers: Href,
    issues: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    slug: String,
    #[serde(default)]
    has_issues: bool,
    language: Option<String>,
    links: RepoLinks,
}

#[derive(Debug, Deserialize)]
struct SizeResponse {
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ValuesPage<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RepoStats {
    watchers: u64,
    commits: u64,
    issues: u64,
    language: Option<String>,
}

#[derive(Debug, Default)]
struct RepoTotals {
    repositories: u64,
    watchers: u64,
    commits: u64,
    issues: u64,
    languages: BTreeSet<String>,
}

impl RepoTotals {
    fn add(&mut self, stats: RepoStats) {
        self.repositories += 1;
        self.watchers = self.watchers.saturating_add(stats.watchers);
        self.commits = self.commits.saturating_add(stats.commits);
        self.issues = self.issues.saturating_add(stats.issues);
        if let Some(language) = stats.language {
            self.languages.insert(language);
        }
    }
}

/// Client for the Bitbucket Cloud 2.0 API.
///
/// Requests are unauthenticated. Use [`BitbucketClient::with_base_url`] to
/// point at a mock server in tests.
pub struct BitbucketClient {
    client: Client,
    base_url: Url,
    max_concurrent: usize,
}

impl BitbucketClient {
    /// Creates a client pointed at the public Bitbucket API.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in base URL; the `Result` mirrors
    /// [`BitbucketClient::with_base_url`].
    pub fn new(client: Client) -> Result<Self, SourceError> {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidBaseUrl`] if `base_url` is not an
    /// absolute URL.
    pub fn with_base_url(client: Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            max_concurrent: 1,
        })
    }

    /// Creates a client from application config, sharing `client`'s connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidBaseUrl`] if `BITBUCKET_BASE_URL` is invalid.
    pub fn from_config(client: Client, config: &AppConfig) -> Result<Self, SourceError> {
        Ok(Self::with_base_url(client, &config.bitbucket_base_url)?
            .with_max_concurrent(config.max_concurrent_requests))
    }

    /// Sets how many repositories may be processed concurrently.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Fetches and normalizes the Bitbucket profile for `profile_name`.
    ///
    /// The name is looked up as a team or as an individual user according
    /// to `options`. Repositories are reported as a flat total alongside the
    /// summed watcher count.
    ///
    /// # Errors
    ///
    /// - [`SourceError::UnknownProfile`] if the account does not exist.
    /// - [`SourceError::RateLimited`] on HTTP 429.
    /// - Any other [`SourceError`] on transport, status or decoding failures.
    pub async fn get_profile(
        &self,
        profile_name: &str,
        options: BitbucketOptions,
    ) -> Result<ProfileRecord, SourceError> {
        if profile_name.trim().is_empty() {
            return Err(unknown_profile(profile_name));
        }

        let kind = if options.is_team { "teams" } else { "users" };
        let url = endpoint(&self.base_url, &[kind, profile_name]);
        let account: Account = match self.get(url.as_str()).await {
            Ok(account) => account,
            Err(e) if has_status(&e, StatusCode::NOT_FOUND) => {
                return Err(unknown_profile(profile_name))
            }
            Err(e) => return Err(e),
        };
        let username = account
            .username
            .as_deref()
            .unwrap_or(profile_name)
            .to_owned();

        let followers = self.response_size(&account.links.followers.href).await?;
        let following = self.response_size(&account.links.following.href).await?;
        let totals = self
            .repo_totals(&username, &account.links.repositories.href)
            .await?;

        tracing::info!(
            username = %username,
            repositories = totals.repositories,
            commits = totals.commits,
            "BitBucket profile collected"
        );

        Ok(ProfileRecord {
            repositories: RepositoryCount::Total(totals.repositories),
            issues: totals.issues,
            followers,
            following,
            commits: totals.commits,
            languages: totals.languages,
            watchers: Some(totals.watchers),
            ..ProfileRecord::default()
        })
    }

    /// Reads the `size` field of a count-style resource.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the request fails or the body does not decode.
    pub async fn response_size(&self, url: &str) -> Result<u64, SourceError> {
        let response: SizeResponse = self.get(url).await?;
        Ok(response.size)
    }

    /// Streams the `values` of every page of a paginated collection,
    /// following `next` until it is absent.
    ///
    /// The stream is lazy: no request is sent until it is polled.
    pub fn values<'a, T>(&'a self, url: &str) -> BoxStream<'a, Result<T, SourceError>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        self.values_within(url, MAX_PAGES)
    }

    fn values_within<'a, T>(
        &'a self,
        url: &str,
        max_pages: usize,
    ) -> BoxStream<'a, Result<T, SourceError>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        paginate(url.to_owned(), max_pages, move |next| async move {
            let page: ValuesPage<T> = self.get(&next).await?;
            Ok::<_, SourceError>(Page {
                items: page.values,
                next: page.next,
            })
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let (body, _) = fetch_json(self.client.get(url), url, Provider::Bitbucket).await?;
        Ok(body)
    }

    async fn repo_stats(&self, username: &str, repo: Repository) -> Result<RepoStats, SourceError> {
        let watchers = self.response_size(&repo.links.watchers.href).await?;

        let mut commits_url = endpoint(
            &self.base_url,
            &["repositories", username, &repo.slug, "commits"],
        );
        commits_url
            .query_pairs_mut()
            .append_pair("pagelen", COMMIT_PAGE_LEN);
        let commits = self
            .values_within::<IgnoredAny>(commits_url.as_str(), COMMIT_MAX_PAGES)
            .try_fold(0_u64, |count, _| async move {
                Ok::<_, SourceError>(count + 1)
            })
            .await?;

        let issues = match (repo.has_issues, &repo.links.issues) {
            (true, Some(link)) => self.response_size(&link.href).await?,
            _ => 0,
        };

        Ok(RepoStats {
            watchers,
            commits,
            issues,
            language: repo.language.filter(|l| !l.is_empty()),
        })
    }

    async fn repo_totals(
        &self,
        username: &str,
        repositories_url: &str,
    ) -> Result<RepoTotals, SourceError> {
        self.values::<Repository>(repositories_url)
            .map_ok(|repo| self.repo_stats(username, repo))
            .try_buffered(self.max_concurrent)
            .try_fold(RepoTotals::default(), |mut totals, stats| async move {
                totals.add(stats);
                Ok::<_, SourceError>(totals)
            })
            .await
    }
}

impl ProfileSource for BitbucketClient {
    type Options = BitbucketOptions;

    fn provider(&self) -> Provider {
        Provider::Bitbucket
    }

    fn fetch_profile(
        &self,
        profile_name: &str,
        options: &BitbucketOptions,
    ) -> impl std::future::Future<Output = Result<ProfileRecord, SourceError>> + Send {
        self.get_profile(profile_name, *options)
    }
}

fn unknown_profile(profile_name: &str) -> SourceError {
    SourceError::UnknownProfile {
        message: format!("No such {} account: {profile_name}", Provider::Bitbucket),
    }
}
