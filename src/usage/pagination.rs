//! Sequential aggregation of cursor-paginated usage results.

use crate::fetch::{FetchRequest, Fetcher, RetryPolicy};

use super::{AggregatedUsage, UsageError, UsagePage};

/// Hard cap on pages fetched in one aggregation call, protecting against
/// unbounded upstream pagination.
pub const MAX_PAGES: u32 = 10;

/// Fetch every page reachable from `start_cursor` and merge the results.
///
/// `build_request` maps a cursor (`None` for page 1) to a concrete request;
/// pages are fetched strictly sequentially since each request depends on the
/// previous response's cursor. Page 1 failure is fatal. A failed continuation
/// is soft degradation: the pages accumulated so far are returned with
/// `has_more` reflecting the last known cursor, because partial usage data is
/// still a usable report.
pub async fn fetch_all_pages<F>(
    fetcher: &Fetcher,
    build_request: F,
    start_cursor: Option<String>,
) -> Result<AggregatedUsage, UsageError>
where
    F: Fn(Option<&str>) -> FetchRequest,
{
    let mut data: Vec<serde_json::Value> = Vec::new();
    let mut cursor = start_cursor;

    for page_index in 0..MAX_PAGES {
        let first_page = page_index == 0;
        let policy = if first_page {
            RetryPolicy::strict()
        } else {
            RetryPolicy::continuation()
        };

        let request = build_request(cursor.as_deref());
        let outcome = match fetcher.fetch_with_retry(&request, &policy).await {
            Ok(outcome) => outcome,
            Err(e) if first_page => return Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    page = page_index + 1,
                    error = %e,
                    "continuation fetch failed, returning partial result"
                );
                return Ok(truncated(data, cursor));
            }
        };

        if !outcome.is_success() {
            if first_page {
                return Err(UsageError::Upstream {
                    status: outcome.status,
                    body: outcome.body,
                });
            }
            tracing::warn!(
                page = page_index + 1,
                status = outcome.status,
                "continuation returned error status, returning partial result"
            );
            return Ok(truncated(data, cursor));
        }

        let page: UsagePage = match serde_json::from_str(&outcome.body) {
            Ok(page) => page,
            Err(e) if first_page => return Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    page = page_index + 1,
                    error = %e,
                    "continuation page failed to decode, returning partial result"
                );
                return Ok(truncated(data, cursor));
            }
        };

        tracing::debug!(
            page = page_index + 1,
            records = page.data.len(),
            has_cursor = page.next_page.is_some(),
            "fetched usage page"
        );

        data.extend(page.data);
        cursor = page.next_page;

        if cursor.is_none() {
            return Ok(AggregatedUsage {
                data,
                has_more: false,
                next_page: None,
            });
        }
    }

    // Ceiling reached with a cursor still outstanding.
    Ok(truncated(data, cursor))
}

fn truncated(data: Vec<serde_json::Value>, cursor: Option<String>) -> AggregatedUsage {
    AggregatedUsage {
        has_more: cursor.is_some(),
        next_page: cursor,
        data,
    }
}
