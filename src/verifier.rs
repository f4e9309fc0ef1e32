//! Verifier worker (VW, §4.7): walks one `TaskPackage`'s candidate URLs in
//! order, consulting the per-host cool-down/robots handles and the
//! cache-class-appropriate `HttpCache`, and returns exactly one
//! `VerifiedUrl` — first matching URL wins, and nothing here ever escapes
//! the task boundary as an error.
//!
//! Grounded on `original_source/src/saim/culture_link/private/verify_ccno.py`
//! (`verify_ccno_list`) for the try-order/first-success contract.

use std::time::Duration;

use dashmap::DashMap;
use reqwest::StatusCode;
use std::sync::Arc;
use url::Url;

use crate::cooldown::CoolDown;
use crate::error::{Log, Res};
use crate::fetcher::Fetcher;
use crate::http_cache::{self, HttpCache};
use crate::models::{
    CacheClass, LinkResult, LinkStatus, LinkLevel, TaskPackage, VerStatus, VerifiedUrl,
};
use crate::robots::RobotsPolicy;
use crate::search;

pub const FETCH_TIMEOUT_SECS: u64 = 180;

/// The shared per-host state VW consults (§3: `CoolDown(host)`/`Robots(host)`,
/// "process-wide ... for the process lifetime"). `RequestManager` owns the
/// registry these live in and attaches entries before a package is queued.
pub struct HostState {
    pub cooldown: CoolDown,
    pub robots: RobotsPolicy,
}

/// The three cache-class stores a worker owns (§5: "owned per worker (per
/// cache class × work dir)").
pub struct WorkerCaches {
    pub homepage: HttpCache,
    pub catalogue: HttpCache,
    pub catalogue_detailed: HttpCache,
}

impl WorkerCaches {
    pub fn open(work_dir: &std::path::Path, db_size_gb: u64) -> Res<Self> {
        Ok(WorkerCaches {
            homepage: HttpCache::open(work_dir, CacheClass::Homepage, db_size_gb)?,
            catalogue: HttpCache::open(work_dir, CacheClass::Catalogue, db_size_gb)?,
            catalogue_detailed: HttpCache::open(work_dir, CacheClass::CatalogueDetailed, db_size_gb)?,
        })
    }

    fn get(&self, class: CacheClass) -> &HttpCache {
        match class {
            CacheClass::Homepage => &self.homepage,
            CacheClass::Catalogue => &self.catalogue,
            CacheClass::CatalogueDetailed => &self.catalogue_detailed,
        }
    }
}

fn classify(status: u16, found: bool, skip_search: bool) -> VerStatus {
    if status == 404 {
        VerStatus::Fail404
    } else if status == 403 {
        VerStatus::Fail403
    } else if !(200..400).contains(&status) {
        VerStatus::FailStatus
    } else if skip_search || found {
        VerStatus::Ok
    } else {
        VerStatus::MisEle
    }
}

/// Never returns an `Err` to its caller — a fatal condition inside the loop
/// degrades to a single `err` status (§4.7, §7: "the verifier never
/// re-throws over a task boundary").
pub async fn verify_package(
    pkg: &TaskPackage,
    hosts: &DashMap<String, Arc<HostState>>,
    caches: &WorkerCaches,
    fetcher: &Fetcher,
    robots_client: &reqwest::Client,
) -> VerifiedUrl {
    match verify_package_inner(pkg, hosts, caches, fetcher, robots_client).await {
        Ok(v) => v,
        Err(e) => {
            let _ = format!("verify_package failed for task {}: {e}", pkg.task_id)
                .log("[WARN]")
                .await;
            VerifiedUrl {
                task_id: pkg.task_id,
                result: None,
                status: vec![LinkStatus {
                    link: String::new(),
                    link_type: LinkLevel::Emp.as_str().to_string(),
                    status: VerStatus::Err,
                }],
            }
        }
    }
}

async fn verify_package_inner(
    pkg: &TaskPackage,
    hosts: &DashMap<String, Arc<HostState>>,
    caches: &WorkerCaches,
    fetcher: &Fetcher,
    robots_client: &reqwest::Client,
) -> Res<VerifiedUrl> {
    let tasks_in_package = pkg.urls.len().max(1);
    let mut statuses = Vec::new();

    for candidate in &pkg.urls {
        if candidate.url.is_empty() {
            continue;
        }
        let Ok(parsed) = Url::parse(&candidate.url) else {
            continue;
        };
        let Some(domain) = parsed.host_str().map(str::to_owned) else {
            continue;
        };
        let Some(host) = hosts.get(&domain).map(|h| Arc::clone(&h)) else {
            continue;
        };

        host.robots.update(robots_client).await;
        if !host.robots.can_fetch(&candidate.url).await {
            statuses.push(LinkStatus {
                link: candidate.url.clone(),
                link_type: candidate.level.as_str().to_string(),
                status: VerStatus::Prohibited,
            });
            continue;
        }

        if host.cooldown.skip_request().await {
            statuses.push(LinkStatus {
                link: candidate.url.clone(),
                link_type: candidate.level.as_str().to_string(),
                status: VerStatus::Prohibited,
            });
            continue;
        }

        host.cooldown.await_cool_down(host.robots.crawl_delay().await).await;

        let skip_search = candidate.cache_class.skips_search();
        let search_task_key = if skip_search { None } else { Some(&pkg.search_task) };
        let key = http_cache::cache_key(&candidate.url, search_task_key);
        let cache = caches.get(candidate.cache_class);

        let (status_code, found, ver_status) = if let Some(entry) = cache.get(&key)? {
            let found = http_cache::cached_hit_matches(skip_search, &entry.body, &pkg.search_task);
            (entry.status, found, classify(entry.status, found, skip_search))
        } else {
            match fetcher.send(&candidate.url, Duration::from_secs(FETCH_TIMEOUT_SECS)).await {
                Ok(resp) => {
                    host.cooldown.finished_request(false, tasks_in_package).await;
                    let body_text = String::from_utf8_lossy(&resp.body);
                    let found = skip_search || search::contains_task(&body_text, &pkg.search_task);
                    let condensed = http_cache::condense_body(skip_search, &pkg.search_task, found);
                    let cacheable_status =
                        StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    // The fetcher only ever issues GET requests, but the
                    // cache-write decision still asserts that contract
                    // explicitly per §4.5's "allowable methods: GET".
                    if http_cache::is_cacheable_status(cacheable_status)
                        && http_cache::is_cacheable_method(&reqwest::Method::GET)
                    {
                        cache.put(&key, resp.status, &condensed, candidate.cache_class.ttl_days())?;
                    }
                    (resp.status, found, classify(resp.status, found, skip_search))
                }
                Err(_) => {
                    host.cooldown.finished_request(true, tasks_in_package).await;
                    statuses.push(LinkStatus {
                        link: candidate.url.clone(),
                        link_type: candidate.level.as_str().to_string(),
                        status: VerStatus::Timeout,
                    });
                    continue;
                }
            }
        };
        let _ = status_code;

        statuses.push(LinkStatus {
            link: candidate.url.clone(),
            link_type: candidate.level.as_str().to_string(),
            status: ver_status,
        });

        if found && ver_status == VerStatus::Ok {
            return Ok(VerifiedUrl {
                task_id: pkg.task_id,
                result: Some(LinkResult {
                    link: candidate.url.clone(),
                    brc_id: pkg.search_task.brc_id,
                    found_ccno: pkg.search_task.find_ccno.clone(),
                }),
                status: statuses,
            });
        }
    }

    if statuses.is_empty() {
        statuses.push(LinkStatus {
            link: String::new(),
            link_type: LinkLevel::Emp.as_str().to_string(),
            status: VerStatus::NoUrl,
        });
    }

    Ok(VerifiedUrl {
        task_id: pkg.task_id,
        result: None,
        status: statuses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateLink, CcNoDes, CcNoId, SearchTask};

    fn task_package(url: &str) -> TaskPackage {
        TaskPackage {
            task_id: 1,
            search_task: SearchTask {
                brc_id: 1,
                find_ccno: CcNoDes {
                    acr: "DSM".into(),
                    id: CcNoId {
                        full: "1234".into(),
                        pre: "".into(),
                        core: "1234".into(),
                        suf: "".into(),
                    },
                    designation: "DSM 1234".into(),
                },
                find_extra: vec![],
            },
            urls: vec![CandidateLink {
                level: LinkLevel::Cat,
                url: url.to_string(),
                cache_class: CacheClass::Catalogue,
            }],
        }
    }

    #[tokio::test]
    async fn unregistered_host_is_skipped_and_no_url_is_synthesised() {
        let pkg = task_package("https://unregistered.invalid/culture/DSM-1234");
        let hosts: DashMap<String, Arc<HostState>> = DashMap::new();
        let dir = tempfile::tempdir().unwrap();
        let caches = WorkerCaches::open(dir.path(), 10).unwrap();
        let fetcher = Fetcher::Http(crate::fetcher::HttpFetcher::new("saim-bot/test").unwrap());
        let client = reqwest::Client::new();
        let verified = verify_package(&pkg, &hosts, &caches, &fetcher, &client).await;
        assert!(verified.result.is_none());
        assert_eq!(verified.status.len(), 1);
        assert_eq!(verified.status[0].status, VerStatus::NoUrl);
    }

    #[tokio::test]
    async fn empty_package_synthesises_no_url() {
        let mut pkg = task_package("");
        pkg.urls.clear();
        let hosts: DashMap<String, Arc<HostState>> = DashMap::new();
        let dir = tempfile::tempdir().unwrap();
        let caches = WorkerCaches::open(dir.path(), 10).unwrap();
        let fetcher = Fetcher::Http(crate::fetcher::HttpFetcher::new("saim-bot/test").unwrap());
        let client = reqwest::Client::new();
        let verified = verify_package(&pkg, &hosts, &caches, &fetcher, &client).await;
        assert!(verified.result.is_none());
        assert_eq!(verified.status[0].status, VerStatus::NoUrl);
    }
}
