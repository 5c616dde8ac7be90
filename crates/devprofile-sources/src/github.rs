//! HTTP client for the GitHub REST API.
//!
//! A profile is assembled from the account itself, the starred-repository
//! listing, and every repository the account owns. Commit counts are read
//! per non-fork repository and restricted to commits authored by the account.

use std::collections::BTreeSet;

use devprofile_core::{AppConfig, ProfileRecord, Provider, RepositoryCount};
use futures::stream::{BoxStream, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::error::SourceError;
use crate::http::{endpoint, fetch_json, has_status, parse_base_url};
use crate::pagination::{last_page_number, next_link, paginate, Page, MAX_PAGES};
use crate::source::ProfileSource;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const REPOS_PER_PAGE: &str = "100";

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
    #[serde(default)]
    followers: u64,
    #[serde(default)]
    following: u64,
}

#[derive(Debug, Deserialize)]
struct GithubOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    name: String,
    owner: GithubOwner,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    has_issues: bool,
    #[serde(default)]
    open_issues_count: u64,
    language: Option<String>,
    topics: Option<Vec<String>>,
}

/// One owned repository plus the commits the account authored in it.
struct RepoStats {
    repo: GithubRepo,
    commits: u64,
}

#[derive(Debug, Default)]
struct RepoTotals {
    original: u64,
    forked: u64,
    stars: u64,
    issues: u64,
    commits: u64,
    languages: BTreeSet<String>,
    topics: BTreeSet<String>,
}

impl RepoTotals {
    fn add(&mut self, stats: RepoStats) {
        let RepoStats { repo, commits } = stats;
        if repo.fork {
            self.forked += 1;
        } else {
            self.original += 1;
        }
        self.stars = self.stars.saturating_add(repo.stargazers_count);
        self.commits = self.commits.saturating_add(commits);
        if repo.has_issues {
            self.issues = self.issues.saturating_add(repo.open_issues_count);
        }
        if let Some(language) = repo.language.filter(|l| !l.is_empty()) {
            self.languages.insert(language);
        }
        self.topics.extend(repo.topics.unwrap_or_default());
    }
}

/// Client for the GitHub REST API.
///
/// Use [`GithubClient::new`] for production or [`GithubClient::with_base_url`]
/// to point at a mock server in tests. Requests are authenticated with a
/// bearer token when one is configured.
pub struct GithubClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    max_concurrent: usize,
}

impl GithubClient {
    /// Creates a client pointed at the public GitHub API.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in base URL; the `Result` mirrors
    /// [`GithubClient::with_base_url`].
    pub fn new(client: Client, token: Option<&str>) -> Result<Self, SourceError> {
        Self::with_base_url(client, token, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidBaseUrl`] if `base_url` is not an
    /// absolute URL.
    pub fn with_base_url(
        client: Client,
        token: Option<&str>,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            token: token.map(str::to_owned),
            max_concurrent: 1,
        })
    }

    /// Creates a client from application config, sharing `client`'s connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidBaseUrl`] if `GITHUB_BASE_URL` is invalid.
    pub fn from_config(client: Client, config: &AppConfig) -> Result<Self, SourceError> {
        Ok(Self::with_base_url(
            client,
            config.github_token.as_deref(),
            &config.github_base_url,
        )?
        .with_max_concurrent(config.max_concurrent_requests))
    }

    /// Sets how many per-repository commit lookups may be in flight at once.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Fetches and normalizes the GitHub profile for `profile_name`.
    ///
    /// Repositories are reported split into originals and forks; GitHub
    /// profiles carry no watcher count.
    ///
    /// # Errors
    ///
    /// - [`SourceError::UnknownProfile`] if the account does not exist.
    /// - [`SourceError::RateLimited`] when the API quota is exhausted.
    /// - [`SourceError::InvalidCredentials`] if the token is rejected.
    /// - Any other [`SourceError`] on transport or decoding failures.
    pub async fn get_profile(&self, profile_name: &str) -> Result<ProfileRecord, SourceError> {
        if profile_name.trim().is_empty() {
            return Err(unknown_profile(profile_name));
        }

        let url = endpoint(&self.base_url, &["users", profile_name]);
        let user: GithubUser = match self.get(url.as_str()).await {
            Ok((user, _)) => user,
            Err(e) if has_status(&e, StatusCode::NOT_FOUND) => {
                return Err(unknown_profile(profile_name))
            }
            Err(e) => return Err(e),
        };

        let starred = self.starred_count(&user.login).await?;
        let totals = self.repo_totals(&user.login).await?;

        tracing::info!(
            login = %user.login,
            original = totals.original,
            forked = totals.forked,
            commits = totals.commits,
            "GitHub profile collected"
        );

        Ok(ProfileRecord {
            repositories: RepositoryCount::Split {
                original: totals.original,
                forked: totals.forked,
            },
            stars: totals.stars,
            starred,
            issues: totals.issues,
            followers: user.followers,
            following: user.following,
            commits: totals.commits,
            languages: totals.languages,
            topics: totals.topics,
            watchers: None,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, Option<String>), SourceError> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_GITHUB_JSON)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        fetch_json(request, url, Provider::Github).await
    }

    /// Counts the items of a `per_page=1` listing without downloading it.
    async fn count_listing(&self, url: &str) -> Result<u64, SourceError> {
        let (items, link): (Vec<IgnoredAny>, _) = self.get(url).await?;
        Ok(last_page_number(link.as_deref())
            .unwrap_or_else(|| u64::try_from(items.len()).unwrap_or(u64::MAX)))
    }

    async fn starred_count(&self, login: &str) -> Result<u64, SourceError> {
        let mut url = endpoint(&self.base_url, &["users", login, "starred"]);
        url.query_pairs_mut().append_pair("per_page", "1");
        self.count_listing(url.as_str()).await
    }

    /// Commits in `owner/repo` authored by `author`. An empty repository
    /// answers 409 and counts as zero.
    async fn commit_count(&self, owner: &str, repo: &str, author: &str) -> Result<u64, SourceError> {
        let mut url = endpoint(&self.base_url, &["repos", owner, repo, "commits"]);
        url.query_pairs_mut()
            .append_pair("author", author)
            .append_pair("per_page", "1");
        match self.count_listing(url.as_str()).await {
            Err(e) if has_status(&e, StatusCode::CONFLICT) => {
                tracing::debug!(owner, repo, "empty repository, counting zero commits");
                Ok(0)
            }
            other => other,
        }
    }

    fn repositories<'a>(&'a self, login: &str) -> BoxStream<'a, Result<GithubRepo, SourceError>> {
        let mut url = endpoint(&self.base_url, &["users", login, "repos"]);
        url.query_pairs_mut()
            .append_pair("type", "owner")
            .append_pair("per_page", REPOS_PER_PAGE);
        paginate(url.into(), MAX_PAGES, move |next| async move {
            let (items, link): (Vec<GithubRepo>, Option<String>) = self.get(&next).await?;
            Ok::<_, SourceError>(Page {
                items,
                next: next_link(link.as_deref()),
            })
        })
    }

    async fn repo_stats(&self, login: &str, repo: GithubRepo) -> Result<RepoStats, SourceError> {
        let commits = if repo.fork {
            0
        } else {
            self.commit_count(&repo.owner.login, &repo.name, login)
                .await?
        };
        Ok(RepoStats { repo, commits })
    }

    async fn repo_totals(&self, login: &str) -> Result<RepoTotals, SourceError> {
        self.repositories(login)
            .map_ok(|repo| self.repo_stats(login, repo))
            .try_buffered(self.max_concurrent)
            .try_fold(RepoTotals::default(), |mut totals, stats| async move {
                totals.add(stats);
                Ok::<_, SourceError>(totals)
            })
            .await
    }
}

impl ProfileSource for GithubClient {
    type Options = ();

    fn provider(&self) -> Provider {
        Provider::Github
    }

    fn fetch_profile(
        &self,
        profile_name: &str,
        _options: &(),
    ) -> impl std::future::Future<Output = Result<ProfileRecord, SourceError>> + Send {
        self.get_profile(profile_name)
    }
}

fn unknown_profile(profile_name: &str) -> SourceError {
    SourceError::UnknownProfile {
        message: format!("No such {} account: {profile_name}", Provider::Github),
    }
}
