//! Output writer (§6): splits a batch of `VerifiedUrl`s into the two
//! task-id-keyed JSON files (`<stem>.res.json`, `<stem>.fail.json`). Kept in
//! the same place `crawn::output` lived, following the teacher's habit of
//! colocating the output module's own tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{Res, ResExt};
use crate::models::VerifiedUrl;

#[derive(Debug, Serialize)]
struct SuccessStatus {
    link: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct SuccessEntry {
    brc_id: i64,
    link: String,
    link_type: String,
    status: Vec<SuccessStatus>,
}

#[derive(Debug, Serialize)]
struct FailureStatus {
    link: String,
    #[serde(rename = "type")]
    kind: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct FailureEntry {
    result: Option<()>,
    status: Vec<FailureStatus>,
}

/// `<input>.res.json`/`<input>.fail.json` (or, with `--output DIR`, the
/// same stem inside `DIR`).
pub fn result_paths(input: &Path, output_dir: Option<&Path>) -> (PathBuf, PathBuf) {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.parent().map(Path::to_path_buf).unwrap_or_default());
    (dir.join(format!("{stem}.res.json")), dir.join(format!("{stem}.fail.json")))
}

/// Splits `results` into the success/failure maps and writes both files,
/// keyed by `task_id` rendered as a string (§6 output shape).
pub async fn write_results(
    results: &BTreeMap<i64, VerifiedUrl>,
    input: &Path,
    output_dir: Option<&Path>,
) -> Res<()> {
    let (res_path, fail_path) = result_paths(input, output_dir);
    if let Some(parent) = res_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let mut success: BTreeMap<String, SuccessEntry> = BTreeMap::new();
    let mut failure: BTreeMap<String, FailureEntry> = BTreeMap::new();

    for (task_id, verified) in results {
        let key = task_id.to_string();
        match &verified.result {
            Some(result) => {
                let matched = verified
                    .status
                    .iter()
                    .find(|s| s.link == result.link)
                    .map(|s| s.link_type.clone())
                    .unwrap_or_default();
                success.insert(
                    key,
                    SuccessEntry {
                        brc_id: result.brc_id,
                        link: result.link.clone(),
                        link_type: matched,
                        status: verified
                            .status
                            .iter()
                            .map(|s| SuccessStatus {
                                link: s.link.clone(),
                                reason: s.status.as_str().to_string(),
                            })
                            .collect(),
                    },
                );
            }
            None => {
                failure.insert(
                    key,
                    FailureEntry {
                        result: None,
                        status: verified
                            .status
                            .iter()
                            .map(|s| FailureStatus {
                                link: s.link.clone(),
                                kind: s.link_type.clone(),
                                reason: s.status.as_str().to_string(),
                            })
                            .collect(),
                    },
                );
            }
        }
    }

    write_json(&res_path, &success).await?;
    write_json(&fail_path, &failure).await
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Res<()> {
    let body = serde_json::to_string_pretty(value).context("Failed to serialize output JSON")?;
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    file.write_all(body.as_bytes())
        .await
        .with_context(|| format!("Failed to write output file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CcNoDes, LinkResult, LinkStatus, VerStatus};

    #[test]
    fn result_paths_use_input_stem() {
        let (res, fail) = result_paths(Path::new("./data/test_links.csv"), None);
        assert_eq!(res, PathBuf::from("./data/test_links.res.json"));
        assert_eq!(fail, PathBuf::from("./data/test_links.fail.json"));
    }

    #[test]
    fn result_paths_honour_output_dir() {
        let (res, _) = result_paths(Path::new("./data/test_links.csv"), Some(Path::new("/tmp/out")));
        assert_eq!(res, PathBuf::from("/tmp/out/test_links.res.json"));
    }

    #[tokio::test]
    async fn writes_success_and_failure_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let mut results = BTreeMap::new();
        results.insert(
            1,
            VerifiedUrl {
                task_id: 1,
                result: Some(LinkResult {
                    link: "https://host/culture/DSM-1".into(),
                    brc_id: 1,
                    found_ccno: CcNoDes::failed("DSM 1"),
                }),
                status: vec![LinkStatus {
                    link: "https://host/culture/DSM-1".into(),
                    link_type: "cat".into(),
                    status: VerStatus::Ok,
                }],
            },
        );
        results.insert(
            2,
            VerifiedUrl {
                task_id: 2,
                result: None,
                status: vec![LinkStatus {
                    link: String::new(),
                    link_type: "emp".into(),
                    status: VerStatus::NoUrl,
                }],
            },
        );

        write_results(&results, &input, None).await.unwrap();
        let (res_path, fail_path) = result_paths(&input, None);
        let res_body = tokio::fs::read_to_string(&res_path).await.unwrap();
        let fail_body = tokio::fs::read_to_string(&fail_path).await.unwrap();
        assert!(res_body.contains("\"brc_id\""));
        assert!(res_body.contains("DSM-1"));
        assert!(fail_body.contains("\"no_url\""));
    }
}
