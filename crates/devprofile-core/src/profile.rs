//! Normalized profile statistics shared by every source client and the merger.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Repository count as reported by a provider.
///
/// GitHub distinguishes original repositories from forks; Bitbucket only
/// reports a flat total. On the wire a flat total is a bare integer and a
/// split is an `{ "original": n, "forked": m }` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepositoryCount {
    Total(u64),
    Split { original: u64, forked: u64 },
}

impl Default for RepositoryCount {
    fn default() -> Self {
        Self::Split {
            original: 0,
            forked: 0,
        }
    }
}

/// Statistics for one account on one provider, or the merge of several.
///
/// Count fields missing from a JSON document deserialize as `0`. The
/// absence of an account is modelled as `Option::<ProfileRecord>::None`,
/// never as a zeroed record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileRecord {
    pub repositories: RepositoryCount,
    pub stars: u64,
    pub starred: u64,
    pub issues: u64,
    pub followers: u64,
    pub following: u64,
    pub commits: u64,
    pub languages: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchers: Option<u64>,
}

/// The upstream services a profile can be fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Github,
    Bitbucket,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Github => write!(f, "GitHub"),
            Provider::Bitbucket => write!(f, "BitBucket"),
        }
    }
}

/// One profile per provider; `None` when the provider has no such account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfiles {
    pub github: Option<ProfileRecord>,
    pub bitbucket: Option<ProfileRecord>,
}

impl ProviderProfiles {
    /// Combines both provider profiles into one aggregate record.
    #[must_use]
    pub fn merged(&self) -> ProfileRecord {
        crate::merge::merge_profiles([self.github.as_ref(), self.bitbucket.as_ref()])
    }
}
