//! Robots policy (RP, §4.4): per-host `robots.txt` state with TTL-based
//! refetch and fail-open semantics.
//!
//! Grounded on `original_source/src/saim/culture_link/private/robots_txt.py`.
//! Uses the `robotstxt` crate (as other repos in this retrieval pack do for
//! the same concern) in place of Python's `urllib.robotparser`, and
//! `reqwest` for the fetch itself, matching the teacher's HTTP client.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

pub const ROB_EXP_SEC: f64 = 86_400.0;
const FETCH_TIMEOUT_SECS: u64 = 10;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

struct RobotsState {
    active: bool,
    modified_at: f64,
    body: Vec<u8>,
}

/// One host's robots.txt policy, behind a lock (§4.4: "State ... under a
/// lock"). `active == false` means "allow all" — set on first-call fetch
/// failure or any non-200.
pub struct RobotsPolicy {
    base_url: String,
    user_agent: String,
    state: Mutex<Option<RobotsState>>,
}

impl RobotsPolicy {
    pub fn new(scheme_and_host: impl Into<String>, user_agent: impl Into<String>) -> Self {
        RobotsPolicy {
            base_url: scheme_and_host.into(),
            user_agent: user_agent.into(),
            state: Mutex::new(None),
        }
    }

    /// Refetches if this is the first call or `now - modified_at >
    /// ROB_EXP_SEC`.
    pub async fn update(&self, client: &reqwest::Client) {
        let needs_fetch = {
            let guard = self.state.lock().await;
            match &*guard {
                None => true,
                Some(s) => now_secs() - s.modified_at > ROB_EXP_SEC,
            }
        };
        if !needs_fetch {
            return;
        }

        let url = format!("{}/robots.txt", self.base_url.trim_end_matches('/'));
        let fetched = client
            .get(&url)
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .send()
            .await;

        let mut guard = self.state.lock().await;
        *guard = Some(match fetched {
            Ok(resp) if resp.status().is_success() => {
                let body = resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
                RobotsState {
                    active: true,
                    modified_at: now_secs(),
                    body,
                }
            }
            _ => RobotsState {
                active: false,
                modified_at: now_secs(),
                body: Vec::new(),
            },
        });
    }

    pub async fn can_fetch(&self, url: &str) -> bool {
        let guard = self.state.lock().await;
        let Some(state) = &*guard else { return true };
        if !state.active {
            return true;
        }
        let Ok(body) = std::str::from_utf8(&state.body) else {
            return true;
        };
        robotstxt::DefaultMatcher::default().one_agent_allowed_by_robots(body, &self.user_agent, url)
    }

    pub async fn crawl_delay(&self) -> f64 {
        let guard = self.state.lock().await;
        let Some(state) = &*guard else { return 0.0 };
        if !state.active {
            return 0.0;
        }
        let Ok(body) = std::str::from_utf8(&state.body) else {
            return 0.0;
        };
        parse_crawl_delay(body, &self.user_agent)
    }
}

/// Best-effort `Crawl-delay`/`Request-rate` extraction, scoped to the
/// user-agent's own block (falling back to `*`). `robotstxt` doesn't expose
/// these directives directly, so this is a small line-oriented parser
/// mirroring the original's reliance on `urllib.robotparser`'s
/// `crawl_delay`/`request_rate`.
fn parse_crawl_delay(body: &str, user_agent: &str) -> f64 {
    let mut in_relevant_block = false;
    let mut saw_specific_ua = false;
    let mut fallback_delay = 0.0f64;
    let mut specific_delay = 0.0f64;

    for raw_line in body.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();
        match directive.as_str() {
            "user-agent" => {
                let ua = value.trim();
                in_relevant_block = ua == "*" || user_agent.to_ascii_lowercase().contains(&ua.to_ascii_lowercase());
                if ua != "*" && in_relevant_block {
                    saw_specific_ua = true;
                }
            }
            "crawl-delay" if in_relevant_block => {
                if let Ok(v) = value.parse::<f64>() {
                    if saw_specific_ua {
                        specific_delay = v;
                    } else {
                        fallback_delay = v;
                    }
                }
            }
            "request-rate" if in_relevant_block => {
                if let Some((reqs, secs)) = value.split_once('/') {
                    if let (Ok(reqs), Ok(secs)) = (reqs.trim().parse::<f64>(), secs.trim().parse::<f64>()) {
                        if reqs > 0.0 {
                            let delay = (secs / reqs).ceil();
                            if saw_specific_ua {
                                specific_delay = delay;
                            } else {
                                fallback_delay = delay;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if specific_delay > 0.0 {
        specific_delay
    } else {
        fallback_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crawl_delay_directive() {
        let body = "User-agent: *\nCrawl-delay: 7\n";
        assert_eq!(parse_crawl_delay(body, "saim-bot/1"), 7.0);
    }

    #[test]
    fn parses_request_rate_as_ceil_seconds_per_request() {
        let body = "User-agent: *\nRequest-rate: 1/10\n";
        assert_eq!(parse_crawl_delay(body, "saim-bot/1"), 10.0);
    }

    #[test]
    fn missing_directive_yields_zero() {
        let body = "User-agent: *\nDisallow: /private\n";
        assert_eq!(parse_crawl_delay(body, "saim-bot/1"), 0.0);
    }

    #[tokio::test]
    async fn fresh_policy_allows_all_before_first_update() {
        let rp = RobotsPolicy::new("https://example.invalid", "saim-bot/1");
        assert!(rp.can_fetch("https://example.invalid/anything").await);
    }
}
