//! Usage reporting against the upstream metering API.
//!
//! The upstream serves cursor-paginated usage buckets; this module owns the
//! typed page model, the query parameters, and the aggregation of multiple
//! pages into a single dataset. Individual records stay opaque JSON — the
//! dashboard renders them as-is and this layer never inspects their shape.

mod client;
mod pagination;

pub use client::UsageClient;
pub use pagination::{fetch_all_pages, MAX_PAGES};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::FetchError;

/// One page of usage results as decoded from the upstream response body.
///
/// Absent fields default to empty rather than failing the decode; an upstream
/// page with no `data` array is an empty page, not an error.
#[derive(Debug, Clone, Deserialize)]
pub struct UsagePage {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// The merged result of one aggregation call.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedUsage {
    /// All fetched records, concatenated in page-arrival order.
    pub data: Vec<serde_json::Value>,
    /// Whether a continuation cursor remained when aggregation stopped.
    pub has_more: bool,
    /// The last known cursor, present only when truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
}

/// Time resolution of usage buckets. Bounds the default page size so one page
/// covers the widest range the upstream allows at that resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketWidth {
    #[serde(rename = "1m")]
    Minute,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "1d")]
    Day,
}

impl BucketWidth {
    /// Default `limit` for this resolution: 1440 minutes, 168 hours, or
    /// 31 days per page.
    pub fn default_limit(self) -> u32 {
        match self {
            BucketWidth::Minute => 1440,
            BucketWidth::Hour => 168,
            BucketWidth::Day => 31,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketWidth::Minute => "1m",
            BucketWidth::Hour => "1h",
            BucketWidth::Day => "1d",
        }
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        BucketWidth::Day
    }
}

/// Default grouping dimension: per-key buckets, which the dashboard joins
/// with mapping names.
pub const DEFAULT_GROUP_BY: &str = "api_key_id";

/// Grouping value that suppresses grouping entirely.
const GROUP_BY_NONE: &str = "none";

/// Parameters for one usage report.
#[derive(Debug, Clone)]
pub struct UsageQuery {
    /// Start of the reporting window, epoch seconds.
    pub start_time: i64,
    /// Optional end of the window, epoch seconds.
    pub end_time: Option<i64>,
    pub bucket_width: BucketWidth,
    /// Grouping dimension; absent defaults to per-key grouping, `"none"`
    /// suppresses grouping entirely.
    pub group_by: Option<String>,
    /// Page size override; defaults per [`BucketWidth::default_limit`].
    pub limit: Option<u32>,
}

impl UsageQuery {
    pub fn new(start_time: i64) -> Self {
        Self {
            start_time,
            end_time: None,
            bucket_width: BucketWidth::default(),
            group_by: None,
            limit: None,
        }
    }

    /// Effective page size for this query.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or_else(|| self.bucket_width.default_limit())
    }

    /// Grouping dimension to send upstream, if any. An absent value means
    /// the default per-key grouping; `"none"` (or empty) means no `group_by`
    /// parameter at all.
    pub fn effective_group_by(&self) -> Option<&str> {
        match self.group_by.as_deref() {
            None => Some(DEFAULT_GROUP_BY),
            Some(GROUP_BY_NONE) | Some("") => None,
            Some(group_by) => Some(group_by),
        }
    }
}

/// Errors surfaced by the usage layer.
#[derive(Debug, Error)]
pub enum UsageError {
    /// The fetch layer exhausted its retries.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The upstream answered the first page with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The first page's body did not decode as a usage page.
    #[error("failed to decode usage page: {0}")]
    Decode(#[from] serde_json::Error),
}
