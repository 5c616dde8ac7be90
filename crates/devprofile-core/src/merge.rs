//! Reduction of several provider profiles into one aggregate record.

use crate::profile::{ProfileRecord, RepositoryCount};

/// Merges any number of profiles, skipping absent ones.
///
/// Counts are summed and `languages`/`topics` are unioned. A flat
/// [`RepositoryCount::Total`] carries no fork breakdown and is attributed
/// entirely to `original`. The result always reports
/// [`RepositoryCount::Split`] and never carries `watchers`, which has no
/// GitHub counterpart.
///
/// The reduction is pure and order-independent; an input with no present
/// profiles yields the zeroed record.
#[must_use]
pub fn merge_profiles<'a, I>(profiles: I) -> ProfileRecord
where
    I: IntoIterator<Item = Option<&'a ProfileRecord>>,
{
    let mut original = 0u64;
    let mut forked = 0u64;
    let mut merged = ProfileRecord::default();

    for profile in profiles.into_iter().flatten() {
        match profile.repositories {
            RepositoryCount::Total(n) => original = original.saturating_add(n),
            RepositoryCount::Split {
                original: o,
                forked: f,
            } => {
                original = original.saturating_add(o);
                forked = forked.saturating_add(f);
            }
        }

        merged.stars = merged.stars.saturating_add(profile.stars);
        merged.starred = merged.starred.saturating_add(profile.starred);
        merged.issues = merged.issues.saturating_add(profile.issues);
        merged.followers = merged.followers.saturating_add(profile.followers);
        merged.following = merged.following.saturating_add(profile.following);
        merged.commits = merged.commits.saturating_add(profile.commits);

        merged.languages.extend(profile.languages.iter().cloned());
        merged.topics.extend(profile.topics.iter().cloned());
    }

    merged.repositories = RepositoryCount::Split { original, forked };
    merged
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
