//! Request manager (RM, §4.8): owns the worker pool, the bounded task
//! queue, the unbounded result stream, the shared `finish` flag, and the
//! lazily-populated per-domain `{CoolDown, Robots}` registry.
//!
//! Grounded on `original_source/src/saim/culture_link/private/
//! request_manager.py` for the queue/worker/finish contract; the process
//! pool of the original is replaced by a `tokio::task::spawn` pool per
//! SPEC_FULL §C ("Process model → task/channel model" — the spec's own
//! Design Notes recommend a bounded channel pair for implementers without
//! a generator-with-feedback primitive).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use url::Url;

use crate::cooldown::CoolDown;
use crate::error::Res;
use crate::fetcher::{BrowserFetcher, Fetcher, HttpFetcher};
use crate::models::{RunConfig, TaskPackage, VerifiedUrl};
use crate::robots::RobotsPolicy;
use crate::verifier::{self, HostState, WorkerCaches};

const QUEUE_POLL_MILLIS: u64 = 500;
/// Browser-fetcher retry budget (§4.5: "retries `max_attempts` times").
const BROWSER_MAX_ATTEMPTS: u32 = 3;

fn build_user_agent(contact: &str) -> String {
    if contact.is_empty() {
        format!("saim-bot/{} (rust library)", env!("CARGO_PKG_VERSION"))
    } else {
        format!("saim-bot/{} (rust library; {contact})", env!("CARGO_PKG_VERSION"))
    }
}

pub struct RequestManager {
    task_tx: mpsc::Sender<TaskPackage>,
    finish_tx: watch::Sender<bool>,
    hosts: Arc<DashMap<String, Arc<HostState>>>,
    user_agent: String,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl RequestManager {
    /// Spawns `config.worker_count` workers, each owning its own fetcher
    /// (plain HTTP, or headless-browser when `cafi` is set) and its own
    /// trio of `HttpCache` stores opened against `config.work_dir`.
    pub async fn spawn(config: RunConfig, cafi: bool) -> Res<(Self, UnboundedReceiver<VerifiedUrl>)> {
        let worker_count = config.worker_count.max(1);
        let (task_tx, task_rx) = mpsc::channel(4 * worker_count);
        let task_rx = Arc::new(TokioMutex::new(task_rx));
        let (result_tx, result_rx) = unbounded();
        let (finish_tx, finish_rx) = watch::channel(false);
        let hosts: Arc<DashMap<String, Arc<HostState>>> = Arc::new(DashMap::new());
        let user_agent = build_user_agent(&config.contact);

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let fetcher = if cafi {
                Fetcher::Browser(
                    BrowserFetcher::launch(BROWSER_MAX_ATTEMPTS)
                        .await
                        .map_err(|e| crate::error::VerifyLinkError::SessionCreation(e.to_string()))?,
                )
            } else {
                Fetcher::Http(
                    HttpFetcher::new(&user_agent)
                        .map_err(|e| crate::error::VerifyLinkError::SessionCreation(e.to_string()))?,
                )
            };
            let caches = WorkerCaches::open(&config.work_dir, config.db_size_gb)?;
            let robots_client = reqwest::Client::builder()
                .user_agent(user_agent.clone())
                .build()
                .map_err(|e| crate::error::VerifyLinkError::SessionCreation(e.to_string()))?;

            let task_rx = Arc::clone(&task_rx);
            let result_tx = result_tx.clone();
            let finish_rx = finish_rx.clone();
            let hosts = Arc::clone(&hosts);

            workers.push(tokio::task::spawn(worker_loop(
                task_rx,
                result_tx,
                finish_rx,
                hosts,
                caches,
                fetcher,
                robots_client,
            )));
        }

        Ok((
            RequestManager {
                task_tx,
                finish_tx,
                hosts,
                user_agent,
                workers,
            },
            result_rx,
        ))
    }

    /// Ensures every candidate URL's host has a `{CoolDown, Robots}` entry
    /// (§4.8: RM "attaches per-domain CG/RP singletons to each task"), then
    /// pushes non-blockingly. Returns `false` if the queue is full — the
    /// caller owns retry/back-pressure policy (§9, "Generator control
    /// flow").
    pub fn try_put(&self, pkg: TaskPackage) -> bool {
        for candidate in &pkg.urls {
            let Ok(parsed) = Url::parse(&candidate.url) else { continue };
            let Some(domain) = parsed.host_str().map(str::to_owned) else { continue };
            if !self.hosts.contains_key(&domain) {
                let base = format!("{}://{}", parsed.scheme(), domain);
                self.hosts.entry(domain).or_insert_with(|| {
                    Arc::new(HostState {
                        cooldown: CoolDown::new(),
                        robots: RobotsPolicy::new(base, self.user_agent.clone()),
                    })
                });
            }
        }
        self.task_tx.try_send(pkg).is_ok()
    }

    /// Sets `finish=true`, closes the task queue, and joins every worker
    /// (§4.8 Shutdown).
    pub async fn close(self) {
        let _ = self.finish_tx.send(true);
        drop(self.task_tx);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    task_rx: Arc<TokioMutex<mpsc::Receiver<TaskPackage>>>,
    result_tx: UnboundedSender<VerifiedUrl>,
    mut finish_rx: watch::Receiver<bool>,
    hosts: Arc<DashMap<String, Arc<HostState>>>,
    caches: WorkerCaches,
    fetcher: Fetcher,
    robots_client: reqwest::Client,
) {
    loop {
        if *finish_rx.borrow() {
            break;
        }

        let pkg = {
            let mut rx = task_rx.lock().await;
            match tokio::time::timeout(Duration::from_millis(QUEUE_POLL_MILLIS), rx.recv()).await {
                Ok(Some(pkg)) => pkg,
                Ok(None) => break,
                Err(_) => continue,
            }
        };

        let verified = verifier::verify_package(&pkg, &hosts, &caches, &fetcher, &robots_client).await;
        if result_tx.unbounded_send(verified).is_err() {
            break;
        }
    }
    fetcher.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheClass, CandidateLink, CcNoDes, LinkLevel, SearchTask};
    use futures::StreamExt;

    fn package(task_id: i64) -> TaskPackage {
        TaskPackage {
            task_id,
            search_task: SearchTask {
                brc_id: 1,
                find_ccno: CcNoDes::failed("x"),
                find_extra: vec![],
            },
            urls: vec![CandidateLink {
                level: LinkLevel::Cat,
                url: "https://unreachable.invalid/culture/1".into(),
                cache_class: CacheClass::Catalogue,
            }],
        }
    }

    #[tokio::test]
    async fn submits_and_drains_one_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            worker_count: 1,
            db_size_gb: 10,
            work_dir: dir.path().to_path_buf(),
            contact: String::new(),
        };
        let (rm, mut results) = RequestManager::spawn(config, false).await.unwrap();
        assert!(rm.try_put(package(1)));
        let verified = results.next().await.unwrap();
        assert_eq!(verified.task_id, 1);
        rm.close().await;
    }
}
