//! LinkedIn post-search automation on top of a visible Chromium session.
//!
//! Flow per run: login page → credentials → (operator may solve a challenge
//! before and after submitting) → feed; then for
//! every query: global search bar → "Posts" tab → "Date posted" filter →
//! scroll through results, one [`PostPage`] per scroll.

use crate::core::types::{post_link_from_urn, Credentials, DateFilter, Post, PostPage};
use crate::features::antibot::Pacing;
use crate::scraping::browser_manager::{
    current_url, is_displayed, page_title, scroll_by_viewport_fraction, scroll_height,
    wait_for_element, wait_for_element_with_text, wait_for_url_containing, BrowserSession,
    BrowserSettings,
};
use crate::scraping::driver::{BrowserDriver, DriverError};
use aho_corasick::AhoCorasick;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const LOGIN_URL: &str = "https://www.linkedin.com/login";
pub const FEED_URL: &str = "https://www.linkedin.com/feed/";

/// URL fragments that mark page transitions.
const FEED_MARKER: &str = "feed";
const SEARCH_MARKER: &str = "search";
const POSTS_TAB_MARKER: &str = "results/content";
const DATE_FILTER_MARKER: &str = "datePosted";

const UNKNOWN_AUTHOR: &str = "Unknown";

/// CSS selectors for every element the driver touches.
///
/// Buttons that are identified by their label (`Posts`, `Date posted`) are
/// matched by `filter_button` plus the visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorConfig {
    pub username_field: String,
    pub password_field: String,
    pub submit_button: String,
    pub search_bar: String,
    pub filter_button: String,
    pub posts_filter_text: String,
    pub date_filter_text: String,
    /// `{filter}` is replaced by the date filter slug, e.g. `past-24h`.
    pub date_option_template: String,
    pub date_apply_button: String,
    pub post_container: String,
    pub post_text: String,
    pub see_more_button: String,
    pub author_name: String,
    pub posted_label: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            username_field: "#username".into(),
            password_field: "#password".into(),
            submit_button: "button[type='submit']".into(),
            search_bar: "input.search-global-typeahead__input".into(),
            filter_button: "button".into(),
            posts_filter_text: "Posts".into(),
            date_filter_text: "Date posted".into(),
            date_option_template: "label[for*='date-posted-{filter}']".into(),
            date_apply_button:
                "div.reusables-filters-modal-artdeco-modal__action-bar button.artdeco-button--primary"
                    .into(),
            post_container: "div.feed-shared-update-v2".into(),
            post_text: "div.update-components-text span[dir='ltr']".into(),
            see_more_button: "button.feed-shared-inline-show-more-text__see-more-less-toggle".into(),
            author_name: "span.feed-shared-actor__name span[aria-hidden='true']".into(),
            posted_label: "span.update-components-actor__sub-description span[aria-hidden='true']"
                .into(),
        }
    }
}

impl SelectorConfig {
    pub fn date_option(&self, filter: DateFilter) -> String {
        self.date_option_template.replace("{filter}", filter.as_str())
    }
}

/// What an interruption (CAPTCHA, checkpoint, security check) looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnomalyMarkers {
    /// Present on the page → anomaly.
    pub selectors: Vec<String>,
    /// Case-insensitive substrings of the current URL.
    pub url_markers: Vec<String>,
    /// Case-insensitive substrings of the document title.
    pub title_markers: Vec<String>,
}

impl Default for AnomalyMarkers {
    fn default() -> Self {
        Self {
            selectors: vec!["#captcha-internal".into()],
            url_markers: vec!["checkpoint/challenge".into(), "/captcha".into()],
            title_markers: vec!["security verification".into(), "security check".into()],
        }
    }
}

/// Compiled URL/title markers.
#[derive(Debug, Clone)]
pub struct AnomalyMatcher {
    url: AhoCorasick,
    title: AhoCorasick,
}

impl AnomalyMatcher {
    pub fn new(markers: &AnomalyMarkers) -> Result<Self, aho_corasick::BuildError> {
        let build = |patterns: &[String]| {
            AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(patterns.iter().filter(|p| !p.trim().is_empty()))
        };
        Ok(Self {
            url: build(&markers.url_markers)?,
            title: build(&markers.title_markers)?,
        })
    }

    pub fn matches(&self, url: &str, title: &str) -> bool {
        self.url.is_match(url) || self.title.is_match(title)
    }
}

/// Everything needed to launch a [`LinkedInDriver`].
#[derive(Debug, Clone, Default)]
pub struct LinkedInSettings {
    pub browser: BrowserSettings,
    pub selectors: SelectorConfig,
    pub anomaly: AnomalyMarkers,
    pub pacing: Pacing,
}

/// Per-query scroll position.
#[derive(Debug)]
struct SearchCursor {
    query: String,
    emitted: HashSet<String>,
    last_height: u64,
    pages: usize,
}

impl SearchCursor {
    fn already_emitted(&self, id: &str) -> bool {
        self.emitted.contains(id)
    }

    /// A post counts as returned only once it was read successfully, so a
    /// failed read is retried on the next page.
    fn accept(&mut self, id: &str, read: Result<Post, DriverError>) -> Option<Post> {
        match read {
            Ok(post) => {
                self.emitted.insert(id.to_string());
                Some(post)
            }
            Err(e) => {
                warn!("could not read post {}; skipping: {}", id, e);
                None
            }
        }
    }
}

pub struct LinkedInDriver {
    session: Option<BrowserSession>,
    selectors: SelectorConfig,
    anomaly_selectors: Vec<String>,
    matcher: AnomalyMatcher,
    pacing: Pacing,
    timeout: Duration,
    search: Option<SearchCursor>,
}

impl LinkedInDriver {
    pub async fn launch(settings: LinkedInSettings) -> Result<Self, DriverError> {
        let matcher = AnomalyMatcher::new(&settings.anomaly)
            .map_err(|e| DriverError::Launch(format!("invalid anomaly markers: {}", e)))?;
        let session = BrowserSession::launch(&settings.browser).await?;
        Ok(Self {
            session: Some(session),
            selectors: settings.selectors,
            anomaly_selectors: settings.anomaly.selectors,
            matcher,
            pacing: settings.pacing,
            timeout: settings.browser.element_timeout,
            search: None,
        })
    }

    /// Handle to the working tab. Cloning a `Page` is cheap.
    fn page(&self) -> Result<Page, DriverError> {
        match self.session.as_ref() {
            Some(s) if !s.is_closed() => Ok(s.page.clone()),
            _ => Err(DriverError::Closed),
        }
    }

    async fn human_click(&self, el: &Element) -> Result<(), DriverError> {
        el.scroll_into_view().await?;
        el.hover().await?;
        self.pacing.hover_delay.wait("hover").await;
        el.click().await?;
        Ok(())
    }

    /// Type one character at a time. Never logs the text.
    async fn human_type(&self, el: &Element, text: &str) -> Result<(), DriverError> {
        el.focus().await?;
        for ch in text.chars() {
            el.type_str(ch.to_string()).await?;
            self.pacing.typing_delay.wait("keystroke").await;
        }
        Ok(())
    }

    async fn run_search(&mut self, query: &str, date_filter: DateFilter) -> Result<(), DriverError> {
        let page = self.page()?;

        let bar = wait_for_element(&page, &self.selectors.search_bar, "search bar", self.timeout).await?;
        self.human_click(&bar).await?;
        bar.call_js_fn("function() { this.value = ''; }", false).await?;
        self.human_type(&bar, query).await?;
        bar.press_key("Enter").await?;
        wait_for_url_containing(&page, SEARCH_MARKER, self.timeout).await?;
        info!("🔎 search for '{}' executed", query);

        let posts_tab = wait_for_element_with_text(
            &page,
            &self.selectors.filter_button,
            &self.selectors.posts_filter_text,
            self.timeout,
        )
        .await?;
        self.human_click(&posts_tab).await?;
        wait_for_url_containing(&page, POSTS_TAB_MARKER, self.timeout).await?;
        self.pacing.action_delay.wait("posts filter").await;
        info!("filtered by '{}'", self.selectors.posts_filter_text);

        if date_filter == DateFilter::Any {
            debug!("date filter 'any'; skipping");
        } else if let Err(e) = self.apply_date_filter(&page, date_filter).await {
            warn!(
                "could not apply date filter '{}', continuing without it: {}",
                date_filter, e
            );
        } else {
            info!("applied date filter '{}'", date_filter);
        }

        Ok(())
    }

    async fn apply_date_filter(&self, page: &Page, filter: DateFilter) -> Result<(), DriverError> {
        let button = wait_for_element_with_text(
            page,
            &self.selectors.filter_button,
            &self.selectors.date_filter_text,
            self.timeout,
        )
        .await?;
        self.human_click(&button).await?;
        self.pacing.action_delay.wait("date filter menu").await;

        let option_sel = self.selectors.date_option(filter);
        let option = wait_for_element(page, &option_sel, "date filter option", self.timeout).await?;
        self.human_click(&option).await?;
        self.pacing.action_delay.wait("date filter option").await;

        let apply = page.find_element(self.selectors.date_apply_button.as_str()).await.map_err(|_| {
            DriverError::ElementNotFound {
                what: "date filter apply button".into(),
                selector: self.selectors.date_apply_button.clone(),
            }
        })?;
        self.human_click(&apply).await?;
        wait_for_url_containing(page, DATE_FILTER_MARKER, self.timeout).await?;
        self.pacing.action_delay.wait("date filter applied").await;
        Ok(())
    }

    /// Read one post container. `id` is already derived from its URN.
    async fn extract_post(&self, container: &Element, id: String, query: &str) -> Result<Post, DriverError> {
        if let Ok(see_more) = container.find_element(self.selectors.see_more_button.as_str()).await {
            if is_displayed(&see_more).await {
                self.human_click(&see_more).await?;
                self.pacing.action_delay.wait("see more").await;
            }
        }

        let text = match container.find_element(self.selectors.post_text.as_str()).await {
            Ok(el) => collapse_newlines(&el.inner_text().await?.unwrap_or_default()),
            Err(_) => {
                warn!("could not find text for post {}", id);
                String::new()
            }
        };

        let author = match container.find_element(self.selectors.author_name.as_str()).await {
            Ok(el) => el
                .inner_text()
                .await?
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            Err(_) => {
                warn!("could not find author for post {}", id);
                UNKNOWN_AUTHOR.to_string()
            }
        };

        let posted = match container.find_element(self.selectors.posted_label.as_str()).await {
            Ok(el) => el.inner_text().await?.as_deref().and_then(relative_date_label),
            Err(_) => None,
        };

        Ok(Post {
            id,
            author,
            text,
            posted,
            query: query.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl BrowserDriver for LinkedInDriver {
    async fn open_login(&mut self) -> Result<(), DriverError> {
        let page = self.page()?;
        info!("navigating to login page");
        page.goto(LOGIN_URL)
            .await
            .map_err(|e| DriverError::Navigation(format!("{}: {}", LOGIN_URL, e)))?;
        self.pacing.page_delay.wait("login page").await;
        Ok(())
    }

    async fn submit_credentials(&mut self, credentials: &Credentials) -> Result<(), DriverError> {
        let page = self.page()?;
        let user = wait_for_element(&page, &self.selectors.username_field, "username field", self.timeout).await?;
        info!("entering credentials");
        self.human_click(&user).await?;
        self.human_type(&user, &credentials.email).await?;

        let pass = wait_for_element(&page, &self.selectors.password_field, "password field", self.timeout).await?;
        self.human_click(&pass).await?;
        self.human_type(&pass, &credentials.password).await?;

        let submit = wait_for_element(&page, &self.selectors.submit_button, "submit button", self.timeout).await?;
        self.pacing.action_delay.wait("before submit").await;
        info!("submitting login form");
        self.human_click(&submit).await?;
        Ok(())
    }

    async fn await_authenticated(&mut self) -> Result<(), DriverError> {
        let page = self.page()?;
        wait_for_url_containing(&page, FEED_MARKER, self.timeout * 2).await?;
        info!("✅ login successful");
        Ok(())
    }

    async fn search(&mut self, query: &str, date_filter: DateFilter) -> Result<(), DriverError> {
        self.search = None;
        if let Err(e) = self.run_search(query, date_filter).await {
            // Get back to a page that has the global search bar.
            if let Ok(page) = self.page() {
                if let Err(nav) = page.goto(FEED_URL).await {
                    warn!("could not return to feed after failed search: {}", nav);
                }
                self.pacing.page_delay.wait("recover to feed").await;
            }
            return Err(e);
        }

        let page = self.page()?;
        self.search = Some(SearchCursor {
            query: query.to_string(),
            emitted: HashSet::new(),
            last_height: scroll_height(&page).await,
            pages: 0,
        });
        Ok(())
    }

    async fn next_page(&mut self) -> Result<PostPage, DriverError> {
        let page = self.page()?;
        let mut cursor = self.search.take().ok_or(DriverError::NoActiveSearch)?;
        let result = self.collect_page(&page, &mut cursor).await;
        self.search = Some(cursor);
        result
    }

    async fn detect_anomaly(&mut self) -> Result<bool, DriverError> {
        let page = self.page()?;
        for sel in &self.anomaly_selectors {
            if page.find_element(sel.as_str()).await.is_ok() {
                debug!("anomaly selector present: {}", sel);
                return Ok(true);
            }
        }
        let url = current_url(&page).await;
        let title = page_title(&page).await;
        Ok(self.matcher.matches(&url, &title))
    }

    async fn close(&mut self) {
        self.search = None;
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}

impl LinkedInDriver {
    async fn collect_page(&self, page: &Page, cursor: &mut SearchCursor) -> Result<PostPage, DriverError> {
        if cursor.pages > 0 {
            let fraction = self.pacing.scroll.random_fraction();
            debug!("scrolling {:.2} viewports", fraction);
            scroll_by_viewport_fraction(page, fraction).await?;
            self.pacing.page_delay.wait("after scroll").await;
        }
        cursor.pages += 1;

        let containers = page.find_elements(self.selectors.post_container.as_str()).await?;
        info!(
            "page {} of '{}': {} post containers on screen",
            cursor.pages,
            cursor.query,
            containers.len()
        );

        let mut posts = Vec::new();
        for container in containers {
            let urn = match container.attribute("data-urn").await {
                Ok(Some(urn)) if !urn.trim().is_empty() => urn,
                _ => {
                    warn!("post container without a 'data-urn'; skipping");
                    continue;
                }
            };
            let id = post_link_from_urn(&urn);
            if cursor.already_emitted(&id) {
                continue;
            }
            let read = self.extract_post(&container, id.clone(), &cursor.query).await;
            posts.extend(cursor.accept(&id, read));
        }

        let height = scroll_height(page).await;
        let has_more = has_more_results(cursor.last_height, height, posts.len());
        cursor.last_height = height;

        Ok(PostPage { posts, has_more })
    }
}

/// Results end once a scroll neither grew the document nor surfaced posts.
pub fn has_more_results(last_height: u64, height: u64, new_posts: usize) -> bool {
    height > last_height || new_posts > 0
}

/// Post text as a single line.
pub fn collapse_newlines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"3h • Edited • "` → `"3h"`.
pub fn relative_date_label(raw: &str) -> Option<String> {
    raw.split('•')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
