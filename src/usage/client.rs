//! Client for the upstream organization usage API.

use url::Url;

use crate::fetch::{FetchRequest, Fetcher};

use super::{fetch_all_pages, AggregatedUsage, UsageError, UsageQuery};

/// Default upstream endpoint for completion usage buckets.
pub const DEFAULT_USAGE_API_URL: &str =
    "https://api.openai.com/v1/organization/usage/completions";

/// Authenticated client over the cursor-paginated usage endpoint.
pub struct UsageClient {
    fetcher: Fetcher,
    base_url: Url,
    admin_key: String,
}

impl UsageClient {
    /// Client against the default upstream endpoint.
    pub fn new(fetcher: Fetcher, admin_key: impl Into<String>) -> Self {
        Self::with_base_url(fetcher, admin_key, DEFAULT_USAGE_API_URL)
            .expect("default usage endpoint URL is well-formed")
    }

    /// Client against a custom endpoint (tests, self-hosted proxies).
    ///
    /// A base URL that does not parse is a configuration error and is
    /// rejected here, not deferred to the first page fetch.
    pub fn with_base_url(
        fetcher: Fetcher,
        admin_key: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            fetcher,
            base_url: Url::parse(base_url)?,
            admin_key: admin_key.into(),
        })
    }

    /// Fetch and merge every page of usage for `query`.
    pub async fn fetch_usage(&self, query: &UsageQuery) -> Result<AggregatedUsage, UsageError> {
        fetch_all_pages(
            &self.fetcher,
            |cursor| self.build_request(query, cursor),
            None,
        )
        .await
    }

    /// Build the request for one page. Continuations repeat the full query
    /// and add the `page` cursor.
    fn build_request(&self, query: &UsageQuery, cursor: Option<&str>) -> FetchRequest {
        FetchRequest::get(self.build_url(query, cursor))
            .bearer_auth(&self.admin_key)
            .header("Content-Type", "application/json")
    }

    fn build_url(&self, query: &UsageQuery, cursor: Option<&str>) -> String {
        let mut url = self.base_url.clone();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("start_time", &query.start_time.to_string());
            pairs.append_pair("limit", &query.effective_limit().to_string());
            pairs.append_pair("bucket_width", query.bucket_width.as_str());

            // Absent grouping defaults to per-key buckets; `none` omits the
            // parameter entirely.
            if let Some(group_by) = query.effective_group_by() {
                pairs.append_pair("group_by", group_by);
            }

            if let Some(end_time) = query.end_time {
                pairs.append_pair("end_time", &end_time.to_string());
            }

            if let Some(cursor) = cursor {
                pairs.append_pair("page", cursor);
            }
        }

        url.into()
    }
}
