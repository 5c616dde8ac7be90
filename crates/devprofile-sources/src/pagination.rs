//! Cursor-based pagination shared by both providers.
//!
//! Each page carries a batch of items and an optional pointer to the next
//! page. Bitbucket puts that pointer in the body (`"next": URL`); GitHub puts
//! it in the `Link` response header:
//!
//! ```text
//! <https://api.github.com/user/1/repos?per_page=100&page=2>; rel="next",
//! <https://api.github.com/user/1/repos?per_page=100&page=5>; rel="last"
//! ```
//!
//! [`paginate`] turns a page-fetching function into one lazy stream of items.

use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::SourceError;

/// Maximum number of pages followed for a single sequence before returning
/// an error. Prevents infinite loops on cycling cursors.
pub const MAX_PAGES: usize = 200;

/// One page of a paginated collection.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// Flattens a cursor-paginated collection into a single lazy stream.
///
/// Nothing is requested until the stream is polled. Pages are then fetched
/// one at a time, following `next` until it is absent, and items are
/// yielded in page order. The stream is consumed by value and cannot be
/// restarted. The first error ends the stream.
///
/// Yields [`SourceError::PaginationLimit`] if more than `max_pages` pages
/// would be requested.
pub fn paginate<'a, T, F, Fut>(
    first_url: String,
    max_pages: usize,
    fetch_page: F,
) -> BoxStream<'a, Result<T, SourceError>>
where
    T: Send + 'a,
    F: FnMut(String) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>, SourceError>> + Send + 'a,
{
    struct Cursor<F> {
        next: Option<String>,
        pages: usize,
        fetch_page: F,
    }

    let cursor = Cursor {
        next: Some(first_url),
        pages: 0,
        fetch_page,
    };

    stream::try_unfold(cursor, move |mut cursor| async move {
        let Some(url) = cursor.next.take() else {
            return Ok(None);
        };

        cursor.pages += 1;
        if cursor.pages > max_pages {
            return Err(SourceError::PaginationLimit { url, max_pages });
        }

        let page = (cursor.fetch_page)(url).await?;
        cursor.next = page.next;

        let items = stream::iter(page.items.into_iter().map(Ok::<T, SourceError>));
        Ok::<_, SourceError>(Some((items, cursor)))
    })
    .try_flatten()
    .boxed()
}

/// Extracts the URL of the `rel="next"` link from a `Link` header.
///
/// Returns `None` if there is no header or no `next` relation (last page).
#[must_use]
pub fn next_link(link_header: Option<&str>) -> Option<String> {
    find_relation(link_header?, "next").map(str::to_owned)
}

/// Reads the total item count of a `per_page=1` listing from the `page`
/// query parameter of its `rel="last"` link.
///
/// Returns `None` when there is no `last` relation, which happens when the
/// listing fits on a single page.
#[must_use]
pub fn last_page_number(link_header: Option<&str>) -> Option<u64> {
    let url = find_relation(link_header?, "last")?;
    extract_query_param(url, "page")?.parse().ok()
}

fn find_relation<'h>(header: &'h str, rel: &str) -> Option<&'h str> {
    let wanted = format!(r#"rel="{rel}""#);

    // Each segment looks like: `<URL>; rel="next"` (possibly with leading whitespace).
    header
        .split(',')
        .map(str::trim)
        .find(|segment| segment.contains(wanted.as_str()))
        .and_then(extract_angle_bracket_url)
}

/// Extracts the URL between `<` and `>` in a link directive segment.
fn extract_angle_bracket_url(segment: &str) -> Option<&str> {
    let start = segment.find('<')? + 1;
    let end = segment.find('>')?;
    if start >= end {
        return None;
    }
    Some(&segment[start..end])
}

/// Extracts the value of a named query parameter from a URL string.
fn extract_query_param(url: &str, param: &str) -> Option<String> {
    let query_start = url.find('?')? + 1;
    let query = &url[query_start..];

    let needle = format!("{param}=");
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix(needle.as_str()) {
            // Trim any fragment anchor that might trail the value.
            let value = value.split('#').next().unwrap_or(value);
            if !value.is_empty() {
                return Some(value.to_owned());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    const GITHUB_LINK: &str = concat!(
        r#"<https://api.github.com/user/583231/starred?per_page=1&page=2>; rel="next", "#,
        r#"<https://api.github.com/user/583231/starred?per_page=1&page=37>; rel="last""#
    );

    #[test]
    fn next_link_returns_none_without_header() {
        assert!(next_link(None).is_none());
        assert!(next_link(Some("")).is_none());
    }

    #[test]
    fn next_link_extracts_full_url() {
        assert_eq!(
            next_link(Some(GITHUB_LINK)).as_deref(),
            Some("https://api.github.com/user/583231/starred?per_page=1&page=2")
        );
    }

    #[test]
    fn next_link_ignores_previous_relation() {
        let header = r#"<https://api.github.com/user/1/repos?page=1>; rel="prev", <https://api.github.com/user/1/repos?page=1>; rel="first""#;
        assert!(next_link(Some(header)).is_none());
    }

    #[test]
    fn last_page_number_reads_page_param() {
        assert_eq!(last_page_number(Some(GITHUB_LINK)), Some(37));
    }

    #[test]
    fn last_page_number_is_none_on_single_page() {
        assert!(last_page_number(None).is_none());
        let header = r#"<https://api.github.com/user/1/repos?page=1>; rel="prev""#;
        assert!(last_page_number(Some(header)).is_none());
    }

    #[test]
    fn extract_query_param_second_param() {
        assert_eq!(
            extract_query_param("https://x.com/p?per_page=1&page=9", "page"),
            Some("9".to_owned())
        );
    }

    #[test]
    fn extract_query_param_does_not_match_suffix() {
        assert!(extract_query_param("https://x.com/p?per_page=1", "page").is_none());
    }

    #[test]
    fn extract_angle_bracket_url_no_brackets_returns_none() {
        assert!(extract_angle_bracket_url("no brackets here").is_none());
    }

    fn two_pages(url: &str) -> Page<u32> {
        if url == "page-1" {
            Page {
                items: vec![1, 2, 3],
                next: Some("page-2".to_owned()),
            }
        } else {
            Page {
                items: vec![4, 5, 6],
                next: None,
            }
        }
    }

    #[tokio::test]
    async fn paginate_flattens_pages_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let items: Vec<u32> = paginate("page-1".to_owned(), MAX_PAGES, move |url| {
            c.fetch_add(1, Ordering::SeqCst);
            async move { Ok(two_pages(&url)) }
        })
        .try_collect()
        .await
        .expect("pages should flatten");

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn paginate_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let mut stream = paginate("page-1".to_owned(), MAX_PAGES, move |url| {
            c.fetch_add(1, Ordering::SeqCst);
            async move { Ok(two_pages(&url)) }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0, "nothing fetched before polling");

        let first = stream.try_next().await.expect("first item");
        assert_eq!(first, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "only the first page fetched");
    }

    #[tokio::test]
    async fn paginate_stops_at_page_limit() {
        let result: Result<Vec<u32>, _> = paginate("loop".to_owned(), 3, |url| async move {
            Ok(Page {
                items: vec![0],
                next: Some(url),
            })
        })
        .try_collect()
        .await;

        assert!(
            matches!(result, Err(SourceError::PaginationLimit { max_pages: 3, .. })),
            "expected PaginationLimit, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn paginate_propagates_page_errors() {
        let result: Result<Vec<u32>, _> = paginate("page-1".to_owned(), MAX_PAGES, |_| async {
            Err::<Page<u32>, SourceError>(SourceError::RateLimited {
                message: "Exceeded BitBucket rate limit".to_owned(),
            })
        })
        .try_collect()
        .await;

        assert!(matches!(result, Err(SourceError::RateLimited { .. })));
    }
}
