use crate::core::types::{Credentials, DateFilter, PostPage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("{what} not found (selector `{selector}`)")]
    ElementNotFound { what: String, selector: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("no search is active; call search() first")]
    NoActiveSearch,

    #[error("browser session is closed")]
    Closed,

    #[error("browser protocol error: {0}")]
    Cdp(String),
}

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        DriverError::Cdp(e.to_string())
    }
}

/// Site automation used by the agent controller.
///
/// The adapter owns its browser session. Results for a query come back as a
/// finite sequence of pages; calling `search` again restarts the sequence and
/// may return posts already seen.
#[async_trait::async_trait]
pub trait BrowserDriver: Send {
    /// Navigate to the login page.
    async fn open_login(&mut self) -> Result<(), DriverError>;

    /// Fill in and submit the login form on the current page.
    async fn submit_credentials(&mut self, credentials: &Credentials) -> Result<(), DriverError>;

    /// Wait until the site shows the signed-in landing page.
    async fn await_authenticated(&mut self) -> Result<(), DriverError>;

    /// Issue a search and apply the posts + date filters.
    async fn search(&mut self, query: &str, date_filter: DateFilter) -> Result<(), DriverError>;

    /// Next batch of not-yet-returned posts for the active search.
    async fn next_page(&mut self) -> Result<PostPage, DriverError>;

    /// `true` when the current page is a verification/CAPTCHA interruption.
    async fn detect_anomaly(&mut self) -> Result<bool, DriverError>;

    async fn close(&mut self);
}
