/*!
**verify-links** - resolves culture-collection catalogue numbers to verified BRC catalogue links

## Usage

```sh
verify-links --input links.csv --brc-catalogue brc.json
```

- With a worker pool:
```sh
verify-links --worker 8 --input links.csv --brc-catalogue brc.json
```

- With the headless-browser fallback for JS-rendered catalogues:
```sh
verify-links --cafi --input links.csv --brc-catalogue brc.json
```

---

## How It Works

1. Reads the input CSV (`task_id,brc_id,ccno,comma_list_of_extras,fallback_link`, no header).
2. Decomposes each `ccno` against the BRC catalogue (acronym manager + designation parser),
   builds an ordered list of candidate catalogue links per task (templates, then fallback,
   then homepage), and buckets tasks round-robin across domains.
3. Feeds the worker pool (request manager), which politely fetches each candidate through a
   persistent HTTP cache — honouring `robots.txt` and a per-host cool-down — and searches the
   page body for the expected token, stopping at the first match.
4. Writes `<input-stem>.res.json` (successes) and `<input-stem>.fail.json` (failures).

## Logging

Same `Log` trait as the rest of this crate: `INFO` (verbose only), `WARN` (always), `FATAL`
(unrecoverable), written to `--log-file` or stderr, colored via `owo-colors`.

## License

brc-link-verify is licensed under the **MIT** license.
*/

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use owo_colors::OwoColorize;

mod acronym_manager;
mod brc;
mod cli;
mod cooldown;
mod designation;
mod error;
mod fetcher;
mod http_cache;
mod link_generator;
mod match_cache;
mod models;
mod output;
mod radix;
mod request_manager;
mod robots;
mod search;
mod text;
mod verifier;

use crate::acronym_manager::AcronymManager;
use crate::error::{Log, Res, ResExt};
use crate::models::{RunConfig, SearchRequest, VerifiedUrl};
use crate::request_manager::RequestManager;

pub(crate) static ARGS: LazyLock<cli::Args> = LazyLock::new(cli::Args::parse);

const RESULT_POLL_MILLIS: u64 = 200;

/// Reads the `task_id,brc_id,ccno,comma_list_of_extras,fallback_link` CSV
/// (no header, §6). `brc_id` blank or non-numeric degrades to `-1` ("any
/// BRC") rather than erroring the whole row.
fn read_requests(path: &Path) -> Res<Vec<SearchRequest>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open input CSV: {}", path.display()))?;

    let mut requests = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read a CSV row from {}", path.display()))?;
        let task_id: i64 = record.get(0).unwrap_or("").trim().parse().unwrap_or(-1);
        let brc_id: i64 = record.get(1).unwrap_or("").trim().parse().unwrap_or(-1);
        let find_ccno = record.get(2).unwrap_or("").trim().to_string();
        let find_extra = record
            .get(3)
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let fallback_link = record.get(4).unwrap_or("").trim().to_string();

        requests.push(SearchRequest {
            task_id,
            brc_id,
            find_ccno,
            find_extra,
            fallback_link,
            exclude: Vec::new(),
        });
    }
    Ok(requests)
}

async fn run() -> Res<()> {
    let args = &*ARGS;

    let requests = read_requests(&args.input)?;
    let mut am = AcronymManager::new(&args.brc_catalogue)?;

    let mut packages = Vec::new();
    for req in &requests {
        match link_generator::build_package(req, &mut am)? {
            Some(pkg) => packages.push(pkg),
            None if args.verbose => {
                format!(
                    "Task {}: designation `{}` did not resolve to a known BRC",
                    req.task_id, req.find_ccno
                )
                .log("[INFO]")
                .await?;
            }
            None => {}
        }
    }
    let packages = link_generator::bucket_round_robin(packages);
    let submitted: HashSet<i64> = packages.iter().map(|p| p.task_id).collect();

    let config = RunConfig {
        worker_count: args.worker,
        db_size_gb: args.db_size,
        work_dir: args.work_dir.clone(),
        contact: args.contact.clone(),
    };
    let (rm, mut result_rx) = RequestManager::spawn(config, args.cafi).await?;

    let mut pending = VecDeque::from(packages);
    let mut results: BTreeMap<i64, VerifiedUrl> = BTreeMap::new();

    while results.len() < submitted.len() {
        while let Some(pkg) = pending.pop_front() {
            if !rm.try_put(pkg.clone()) {
                pending.push_front(pkg);
                break;
            }
        }
        match tokio::time::timeout(Duration::from_millis(RESULT_POLL_MILLIS), result_rx.next()).await {
            Ok(Some(verified)) => {
                results.insert(verified.task_id, verified);
            }
            Ok(None) => break,
            Err(_) => continue,
        }
    }
    rm.close().await;

    output::write_results(&results, &args.input, args.output.as_deref()).await
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = &*ARGS;
    if let Err(e) = std::fs::metadata(&args.input) {
        eprintln!(
            "{} Could not read input file {}: {}",
            "WARN:".yellow().bold(),
            args.input.display(),
            e
        );
        return std::process::ExitCode::FAILURE;
    }

    match run().await {
        Ok(_) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "FATAL:".red().bold(), e);
            std::process::ExitCode::FAILURE
        }
    }
}
