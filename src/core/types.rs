use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Base used to turn a container `data-urn` into a direct post link.
pub const POST_LINK_BASE: &str = "https://www.linkedin.com/feed/update/";

/// Canonical post identifier: the direct link built from the container URN.
///
/// e.g. `urn:li:activity:7212` → `https://www.linkedin.com/feed/update/urn:li:activity:7212/`
pub fn post_link_from_urn(urn: &str) -> String {
    format!("{}{}/", POST_LINK_BASE, urn.trim())
}

/// A candidate post extracted from a search results page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Unique per post (canonical link, see [`post_link_from_urn`]).
    pub id: String,
    pub author: String,
    pub text: String,
    /// Relative date label as rendered by the site ("3h", "1d", "2w").
    #[serde(default)]
    pub posted: Option<String>,
    /// Search query that surfaced this post.
    pub query: String,
}

/// One batch of posts returned by the browser driver.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<Post>,
    /// `false` once the result list stopped growing.
    pub has_more: bool,
}

/// Qualifier verdict for a single post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub is_qualified: bool,
    pub rationale: String,
}

impl Decision {
    pub fn qualified(rationale: impl Into<String>) -> Self {
        Self {
            is_qualified: true,
            rationale: rationale.into(),
        }
    }

    pub fn not_qualified(rationale: impl Into<String>) -> Self {
        Self {
            is_qualified: false,
            rationale: rationale.into(),
        }
    }
}

/// A row of the lead output file. Field order is the CSV column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeadRecord {
    pub post_id: String,
    pub author: String,
    pub excerpt: String,
    pub query: String,
    pub rationale: String,
    pub timestamp: String,
}

impl LeadRecord {
    pub fn from_post(post: &Post, decision: &Decision, excerpt_max_chars: usize) -> Self {
        Self::from_post_at(post, decision, excerpt_max_chars, Utc::now())
    }

    pub fn from_post_at(
        post: &Post,
        decision: &Decision,
        excerpt_max_chars: usize,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            post_id: post.id.clone(),
            author: post.author.clone(),
            excerpt: excerpt(&post.text, excerpt_max_chars),
            query: post.query.clone(),
            rationale: decision.rationale.clone(),
            timestamp: at.to_rfc3339(),
        }
    }
}

/// Truncate to `max_chars` characters (not bytes), appending `…` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// "Date posted" search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateFilter {
    #[default]
    Past24h,
    PastWeek,
    PastMonth,
    Any,
}

impl DateFilter {
    /// Slug used by the site's filter option ids (`date-posted-{slug}`).
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFilter::Past24h => "past-24h",
            DateFilter::PastWeek => "past-week",
            DateFilter::PastMonth => "past-month",
            DateFilter::Any => "any",
        }
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid date filter '{0}' (expected past-24h, past-week, past-month or any)")]
pub struct InvalidDateFilter(pub String);

impl FromStr for DateFilter {
    type Err = InvalidDateFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "past-24h" | "last-24h" | "24h" => Ok(DateFilter::Past24h),
            "past-week" | "last-week" | "week" => Ok(DateFilter::PastWeek),
            "past-month" | "last-month" | "month" => Ok(DateFilter::PastMonth),
            "any" | "" => Ok(DateFilter::Any),
            other => Err(InvalidDateFilter(other.to_string())),
        }
    }
}

impl TryFrom<String> for DateFilter {
    type Error = InvalidDateFilter;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateFilter> for String {
    fn from(value: DateFilter) -> Self {
        value.as_str().to_string()
    }
}

/// Account secrets. `Debug` never prints them.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-query counters reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct QuerySummary {
    pub query: String,
    pub pages: usize,
    pub posts_received: usize,
    pub skipped_seen: usize,
    pub skipped_empty: usize,
    pub classified: usize,
    pub qualifier_failures: usize,
    pub leads: usize,
    /// Adapter failure that ended this query early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QuerySummary {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    GoalReached,
    QueriesExhausted,
    Interrupted,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub queries: Vec<QuerySummary>,
    /// Leads found in the output file before this run started.
    pub prior_leads: usize,
    /// Includes `prior_leads`.
    pub total_leads: usize,
    pub lead_goal: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub outcome: RunOutcome,
}

impl RunSummary {
    pub fn total_classified(&self) -> usize {
        self.queries.iter().map(|q| q.classified).sum()
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
