//! Fetch capability (§9 Design Notes, "Dynamic dispatch and inheritance"):
//! a small capability record `{send, close}` with two concrete
//! implementations — plain HTTP and headless-browser — selected once at
//! construction rather than switched on per request.
//!
//! Grounded on `original_source/src/saim/culture_link/private/cached_session.py`
//! (`RequestsAdapter`) and `browser_pw_adapter.py` (`BrowserPWAdapter`) for the
//! contract; `reqwest` stands in for `requests`/`aiohttp` as the teacher
//! (`crawn`) already uses it, and `chromiumoxide` (used elsewhere in this
//! retrieval pack for the same purpose) stands in for Playwright.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use futures::StreamExt;
use tokio::sync::Mutex;

/// One fetched response, before any cache condensation.
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum FetchError {
    Timeout,
    Other(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// URL glob patterns approximating the resource-type blocklist of §4.5
/// (`{image,media,font,ping,manifest,prefetch}`). CDP's `Network.setBlockedURLs`
/// only accepts URL patterns, not resource-type tags, so extension globs are
/// the closest faithful approximation without a full `Fetch`-domain handshake.
const BLOCKED_URL_GLOBS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico",
    "*.mp4", "*.webm", "*.mp3", "*.wav", "*.ogg",
    "*.woff", "*.woff2", "*.ttf", "*.otf", "*.eot",
    "*manifest.json", "*/ping*",
];

/// Plain HTTP fetcher: a thin `reqwest::Client` wrapper.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| FetchError::Other(e.to_string()))?;
        Ok(HttpFetcher { client })
    }

    async fn send(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Other(e.to_string())
                }
            })?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?
            .to_vec();
        Ok(FetchResponse { status, body })
    }
}

/// Headless-browser fallback: mounts a Chromium instance, blocks non-content
/// resource types, waits for `networkidle` (capped at 60s) then pads to a 6s
/// total wait floor, and retries with exponential-in-budget backoff. Open
/// Question 2 (SPEC_FULL §C) — the numeric contract is preserved verbatim.
pub struct BrowserFetcher {
    browser: Mutex<Browser>,
    max_attempts: u32,
}

const NAV_TIMEOUT_SECS: u64 = 30;
const NETWORKIDLE_TIMEOUT_SECS: u64 = 60;
const MIN_TOTAL_WAIT_SECS: u64 = 6;

impl BrowserFetcher {
    pub async fn launch(max_attempts: u32) -> Result<Self, FetchError> {
        let config = BrowserConfig::builder()
            .request_intercept(true)
            .build()
            .map_err(FetchError::Other)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;

        // The handler drives the websocket connection to the browser process;
        // it must be polled for the browser handle to make progress.
        tokio::task::spawn(async move { while handler.next().await.is_some() {} });

        Ok(BrowserFetcher {
            browser: Mutex::new(browser),
            max_attempts: max_attempts.max(1),
        })
    }

    async fn send(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let mut last_err = FetchError::Other("browser fetch never attempted".into());
        for attempt in 0..self.max_attempts {
            // "Retries are exponential only in budget: attempt 2 halves the
            // per-attempt timeout" (§4.5).
            let attempt_timeout = if attempt == 0 {
                timeout.min(Duration::from_secs(NAV_TIMEOUT_SECS))
            } else {
                (timeout.min(Duration::from_secs(NAV_TIMEOUT_SECS))) / 2u32.pow(attempt.min(4))
            };
            match self.attempt_once(url, attempt_timeout).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    last_err = e;
                    let jitter = 0.5 - rand::random::<f64>();
                    let backoff = (1.0 + jitter).max(0.1);
                    tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                }
            }
        }
        Err(last_err)
    }

    async fn attempt_once(&self, url: &str, nav_timeout: Duration) -> Result<FetchResponse, FetchError> {
        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;

        page.execute(SetBlockedUrLsParams::new(
            BLOCKED_URL_GLOBS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        ))
        .await
        .map_err(|e| FetchError::Other(e.to_string()))?;

        let navigated = tokio::time::timeout(nav_timeout, page.goto(url)).await;
        match navigated {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(FetchError::Other(e.to_string())),
            Err(_) => return Err(FetchError::Timeout),
        }

        let idle = tokio::time::timeout(
            Duration::from_secs(NETWORKIDLE_TIMEOUT_SECS),
            page.wait_for_navigation(),
        )
        .await;
        if idle.is_err() {
            // Network never settled; fall through and take whatever rendered.
        }

        let waited = NETWORKIDLE_TIMEOUT_SECS.min(MIN_TOTAL_WAIT_SECS);
        if waited < MIN_TOTAL_WAIT_SECS {
            tokio::time::sleep(Duration::from_secs(MIN_TOTAL_WAIT_SECS - waited)).await;
        }

        let content = page
            .content()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;

        let _ = page.close().await;

        Ok(FetchResponse {
            status: 200,
            body: content.into_bytes(),
        })
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        let _ = browser.close().await;
    }
}

/// The capability record itself: one concrete backend, chosen at
/// construction (§9 — "no runtime subtype checks in hot paths").
pub enum Fetcher {
    Http(HttpFetcher),
    Browser(BrowserFetcher),
}

impl Fetcher {
    pub async fn send(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        match self {
            Fetcher::Http(f) => f.send(url, timeout).await,
            Fetcher::Browser(f) => f.send(url, timeout).await,
        }
    }

    pub async fn close(&self) {
        if let Fetcher::Browser(f) = self {
            f.close().await;
        }
    }
}
