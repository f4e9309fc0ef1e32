//! Link-generator façade (LG, §4.8): turns `SearchRequest`s into
//! `TaskPackage`s via the acronym manager and BRC catalogue, then buckets
//! them by domain and drains round-robin so one worker-count-sized batch
//! spreads across as many distinct hosts as possible.
//!
//! Grounded on `original_source/src/saim/culture_link/private/link_gen.py`
//! (`build_task_package`, template substitution) for the try-order and
//! placeholder convention.

use std::collections::{HashMap, VecDeque};

use crate::acronym_manager::AcronymManager;
use crate::error::Res;
use crate::models::{CandidateLink, CacheClass, CcNoId, LinkLevel, SearchRequest, SearchTask, TaskPackage};

/// `<acr>`/`<id>` placeholder substitution for a BRC's `catalogue_templates`
/// (SPEC_FULL §C): `<acr>` takes the catalogue's fixed (upper-cased,
/// cleaned) acronym, `<id>` takes the decomposed id's full text.
fn substitute_template(template: &str, fixed_acr: &str, id: &CcNoId) -> String {
    template.replace("<acr>", fixed_acr).replace("<id>", &id.full)
}

/// Builds one `TaskPackage` from a `SearchRequest`, or `None` if the
/// designation doesn't decompose or no BRC can be resolved for it — LG
/// degrades rather than erroring, matching DP's own failure posture (§4.2).
pub fn build_package(req: &SearchRequest, am: &mut AcronymManager) -> Res<Option<TaskPackage>> {
    let des = am.identify_ccno(&req.find_ccno)?;
    if !des.is_valid() {
        return Ok(None);
    }

    let catalogue = am.catalogue()?;
    let candidate_ids: Vec<i64> = if req.brc_id >= 0 {
        vec![req.brc_id]
    } else {
        catalogue.identify_acr(&des.acr)
    };
    let Some(&brc_id) = candidate_ids.first() else {
        return Ok(None);
    };
    let Some(entry) = catalogue.entry(brc_id) else {
        return Ok(None);
    };

    // A non-empty `find_extra` makes the search more specific than a bare
    // ping, so its cached body is kept under the shorter-lived
    // `catalogue_detailed` class (§3: `cat_det(1d)` vs `cat(30d)`).
    let detailed_class = if req.find_extra.is_empty() {
        CacheClass::Catalogue
    } else {
        CacheClass::CatalogueDetailed
    };

    let mut urls = Vec::new();
    if !req.exclude.contains(&LinkLevel::Cat) {
        for template in &entry.entry.catalogue_templates {
            urls.push(CandidateLink {
                level: LinkLevel::Cat,
                url: substitute_template(template, &entry.fixed_acr, &des.id),
                cache_class: detailed_class,
            });
        }
    }
    if !req.exclude.contains(&LinkLevel::Fallback) && !req.fallback_link.is_empty() {
        urls.push(CandidateLink {
            level: LinkLevel::Fallback,
            url: req.fallback_link.clone(),
            cache_class: detailed_class,
        });
    }
    if !req.exclude.contains(&LinkLevel::Home) && !entry.entry.homepage.is_empty() {
        urls.push(CandidateLink {
            level: LinkLevel::Home,
            url: entry.entry.homepage.clone(),
            cache_class: CacheClass::Homepage,
        });
    }

    Ok(Some(TaskPackage {
        task_id: req.task_id,
        search_task: SearchTask {
            brc_id,
            find_ccno: des,
            find_extra: req.find_extra.clone(),
        },
        urls,
    }))
}

fn primary_domain(pkg: &TaskPackage) -> String {
    pkg.urls
        .iter()
        .find_map(|c| url::Url::parse(&c.url).ok().and_then(|u| u.host_str().map(str::to_owned)))
        .unwrap_or_default()
}

/// Groups packages by their first candidate URL's domain, then drains every
/// bucket round-robin (§4.8: "one worker per domain keeps each host's rate
/// limiter uncontested").
pub fn bucket_round_robin(packages: Vec<TaskPackage>) -> Vec<TaskPackage> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, VecDeque<TaskPackage>> = HashMap::new();

    for pkg in packages {
        let domain = primary_domain(&pkg);
        if !buckets.contains_key(&domain) {
            order.push(domain.clone());
        }
        buckets.entry(domain).or_default().push_back(pkg);
    }

    let mut out = Vec::new();
    loop {
        let mut progressed = false;
        for domain in &order {
            if let Some(bucket) = buckets.get_mut(domain) {
                if let Some(pkg) = bucket.pop_front() {
                    out.push(pkg);
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrcEntry, BrcIdSchema};
    use std::io::Write;

    fn write_catalogue(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let entries = vec![BrcEntry {
            id: 1,
            acr: "DSM".into(),
            code: "DSMZ".into(),
            synonyms: vec![],
            regex_ccno: r"DSM\s*\d+".into(),
            regex_id: BrcIdSchema {
                full: r".*".into(),
                core: r"\d+".into(),
                pre: "".into(),
                suf: "".into(),
            },
            homepage: "https://www.dsmz.de".into(),
            catalogue_templates: vec!["https://www.dsmz.de/culture/<acr>-<id>".into()],
            deprecated: false,
        }];
        let path = dir.path().join("brc.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(serde_json::to_string(&entries).unwrap().as_bytes()).unwrap();
        path
    }

    #[test]
    fn builds_package_with_substituted_template_and_homepage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalogue(&dir);
        let mut am = AcronymManager::new(path).unwrap();
        let req = SearchRequest {
            task_id: 1,
            brc_id: -1,
            find_ccno: "DSM 1234".into(),
            find_extra: vec![],
            fallback_link: String::new(),
            exclude: vec![],
        };
        let pkg = build_package(&req, &mut am).unwrap().unwrap();
        assert_eq!(pkg.urls.len(), 2);
        assert_eq!(pkg.urls[0].url, "https://www.dsmz.de/culture/DSM-1234");
        assert_eq!(pkg.urls[1].level, LinkLevel::Home);
    }

    #[test]
    fn unparseable_designation_yields_no_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalogue(&dir);
        let mut am = AcronymManager::new(path).unwrap();
        let req = SearchRequest {
            task_id: 1,
            brc_id: -1,
            find_ccno: "not a catalogue number".into(),
            find_extra: vec![],
            fallback_link: String::new(),
            exclude: vec![],
        };
        assert!(build_package(&req, &mut am).unwrap().is_none());
    }

    #[test]
    fn round_robin_interleaves_distinct_domains() {
        fn pkg(id: i64, url: &str) -> TaskPackage {
            TaskPackage {
                task_id: id,
                search_task: SearchTask {
                    brc_id: 1,
                    find_ccno: crate::models::CcNoDes::failed(""),
                    find_extra: vec![],
                },
                urls: vec![CandidateLink {
                    level: LinkLevel::Cat,
                    url: url.to_string(),
                    cache_class: CacheClass::Catalogue,
                }],
            }
        }
        let packages = vec![
            pkg(1, "https://a.example/1"),
            pkg(2, "https://a.example/2"),
            pkg(3, "https://b.example/1"),
        ];
        let ordered = bucket_round_robin(packages);
        let ids: Vec<i64> = ordered.iter().map(|p| p.task_id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }
}
