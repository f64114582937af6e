//! Native browser management using `chromiumoxide`.
//!
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Launching a **visible** browser with a persistent profile so the
//!   operator can solve CAPTCHAs and the site's login cookies survive runs.
//! * Small page primitives the site driver builds on: polling waits,
//!   stealth script injection, scroll metrics.
//!
//! Stealth model:
//! - Process level: `--disable-blink-features=AutomationControlled`, a
//!   realistic desktop user-agent.
//! - JS level: `navigator.webdriver` and friends are patched before any
//!   document script runs (see [`STEALTH_SCRIPT`]).

use crate::scraping::driver::DriverError;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

// ── User-Agent pool ──────────────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Returns a randomly-chosen realistic Chromium desktop User-Agent string.
///
/// Only Chromium UAs: the engine is Chromium and a Firefox UA on top of it
/// is itself a fingerprint.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `explicit` (config file / `CHROME_EXECUTABLE`), when it exists
/// 2. PATH scan
/// 3. OS-specific well-known install paths
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    if let Some(p) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
        warn!("browser: configured executable {} does not exist; auto-discovering", p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch settings ──────────────────────────────────────────────────────────

/// Browser knobs from the run configuration.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Headless makes CAPTCHA resolution impossible; off by default.
    pub headless: bool,
    pub chrome_executable: Option<String>,
    /// Persistent profile directory (cookies survive between runs).
    pub user_data_dir: Option<PathBuf>,
    /// Upper bound for element/URL waits.
    pub element_timeout: Duration,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_executable: None,
            user_data_dir: default_profile_dir(),
            element_timeout: Duration::from_secs(20),
            window_width: 1366,
            window_height: 900,
        }
    }
}

/// `~/.lead-scout/browser-profile`
pub fn default_profile_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".lead-scout").join("browser-profile"))
}

pub fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Build a `BrowserConfig` with stealth defaults.
pub fn build_browser_config(exe: &str, settings: &BrowserSettings) -> Result<BrowserConfig, DriverError> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: settings.window_width,
            height: settings.window_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(settings.window_width, settings.window_height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-infobars")
        // Stealth: suppress CDP automation fingerprint
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !settings.headless {
        builder = builder.with_head();
    }

    if let Some(dir) = settings.user_data_dir.as_ref() {
        std::fs::create_dir_all(dir)
            .map_err(|e| DriverError::Launch(format!("profile dir {}: {}", dir.display(), e)))?;
        builder = builder.user_data_dir(dir);
    }

    builder.build().map_err(DriverError::Launch)
}

// ── Session ──────────────────────────────────────────────────────────────────

/// JS patched into every new document before site scripts run.
pub const STEALTH_SCRIPT: &str = r#"
(() => {
    try {
        const proto = Navigator.prototype;
        Object.defineProperty(proto, 'webdriver', { get: () => undefined, configurable: true });
        Object.defineProperty(proto, 'languages', { get: () => ['en-US', 'en'], configurable: true });
        Object.defineProperty(proto, 'plugins', { get: () => [1, 2, 3, 4, 5], configurable: true });
    } catch (e) {}
    if (!window.chrome) { window.chrome = {}; }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: function() { return { onDisconnect: { addListener: function() {} } }; },
            sendMessage: function() {},
        };
    }
    delete window.__playwright;
    delete window.__puppeteer;
    delete window.__selenium;
})();
"#;

/// One browser process with one working tab.
pub struct BrowserSession {
    browser: Browser,
    pub page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, DriverError> {
        let exe = find_chrome_executable(settings.chrome_executable.as_deref()).ok_or_else(|| {
            DriverError::Launch(
                "No browser found. Install Chrome, Chromium or Brave, or set CHROME_EXECUTABLE."
                    .to_string(),
            )
        })?;

        info!(
            "🚀 browser: launching {} ({})",
            exe,
            if settings.headless { "headless" } else { "visible" }
        );
        let config = build_browser_config(&exe, settings)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(format!("{}: {}", exe, e)))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = browser.new_page("about:blank").await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await?;

        Ok(Self {
            browser,
            page,
            handler_task,
            closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close error (non-fatal): {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        info!("🛑 browser: session closed");
    }
}

fn spawn_handler_task(
    mut handler: chromiumoxide::Handler,
    closed: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromiumoxide handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

// ── Page primitives ──────────────────────────────────────────────────────────

/// Poll until `selector` matches, or fail after `timeout`.
pub async fn wait_for_element(
    page: &Page,
    selector: &str,
    what: &str,
    timeout: Duration,
) -> Result<Element, DriverError> {
    let start = Instant::now();
    loop {
        if let Ok(el) = page.find_element(selector).await {
            return Ok(el);
        }
        if start.elapsed() >= timeout {
            return Err(DriverError::ElementNotFound {
                what: what.to_string(),
                selector: selector.to_string(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll until an element matching `selector` has visible text `text`.
pub async fn wait_for_element_with_text(
    page: &Page,
    selector: &str,
    text: &str,
    timeout: Duration,
) -> Result<Element, DriverError> {
    let start = Instant::now();
    loop {
        if let Ok(candidates) = page.find_elements(selector).await {
            for el in candidates {
                let label = el.inner_text().await.ok().flatten().unwrap_or_default();
                if label.trim().eq_ignore_ascii_case(text) {
                    return Ok(el);
                }
            }
        }
        if start.elapsed() >= timeout {
            return Err(DriverError::ElementNotFound {
                what: format!("'{}' button", text),
                selector: selector.to_string(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll until the current URL contains `needle`.
pub async fn wait_for_url_containing(
    page: &Page,
    needle: &str,
    timeout: Duration,
) -> Result<String, DriverError> {
    let start = Instant::now();
    loop {
        let url = current_url(page).await;
        if url.contains(needle) {
            return Ok(url);
        }
        if start.elapsed() >= timeout {
            return Err(DriverError::Timeout(format!(
                "URL containing '{}' (last: {})",
                needle, url
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn current_url(page: &Page) -> String {
    page.url().await.ok().flatten().unwrap_or_default()
}

pub async fn page_title(page: &Page) -> String {
    page.get_title().await.ok().flatten().unwrap_or_default()
}

/// `document.body.scrollHeight`, 0 when unavailable.
pub async fn scroll_height(page: &Page) -> u64 {
    page.evaluate("Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)")
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_f64())
        .map(|h| h.max(0.0) as u64)
        .unwrap_or(0)
}

/// Scroll down by `fraction` of the viewport height.
pub async fn scroll_by_viewport_fraction(page: &Page, fraction: f64) -> Result<(), DriverError> {
    page.evaluate(format!(
        "window.scrollBy({{top: Math.round(window.innerHeight * {:.3}), behavior: 'smooth'}});",
        fraction
    ))
    .await?;
    Ok(())
}

/// Whether an element takes up layout space (`offsetParent` set).
pub async fn is_displayed(el: &Element) -> bool {
    el.call_js_fn("function() { return this.offsetParent !== null; }", false)
        .await
        .ok()
        .and_then(|r| r.result.value)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
