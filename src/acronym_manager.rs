//! Acronym manager (AM, §4.3): a lazy, time-expiring cache in front of the
//! designation parser (DP) and radix index (RX), owning the BRC catalogue
//! snapshot.
//!
//! This is an explicit handle, constructed by the caller and passed by
//! `Arc`, never a process singleton — the spec's own Design Notes (§9,
//! "Process-global singletons") call out `AcronymManager` by name as an
//! anti-pattern to avoid.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::brc::BrcCatalogue;
use crate::designation;
use crate::error::Res;
use crate::models::CcNoDes;

const DEFAULT_EXP_DAYS: i64 = 60;
const DEFAULT_LIMIT: usize = 1000;

struct Caches {
    single: HashMap<String, CcNoDes>,
    single_order: Vec<String>,
    all: HashMap<String, Vec<CcNoDes>>,
    all_order: Vec<String>,
}

impl Caches {
    fn new() -> Self {
        Caches {
            single: HashMap::new(),
            single_order: Vec::new(),
            all: HashMap::new(),
            all_order: Vec::new(),
        }
    }
}

/// `single-owner; external concurrency must serialise` (§4.3) — this type
/// is intentionally `&mut self` throughout rather than internally locked.
/// Callers that need concurrent access own the serialisation (e.g. behind
/// a `tokio::sync::Mutex`), matching the RM's per-task ownership model.
pub struct AcronymManager {
    catalogue_path: PathBuf,
    catalogue: BrcCatalogue,
    created_at: Instant,
    exp_days: i64,
    limit: usize,
    caches: Caches,
}

impl AcronymManager {
    pub fn new(catalogue_path: impl Into<PathBuf>) -> Res<Self> {
        Self::with_limits(catalogue_path, DEFAULT_EXP_DAYS, DEFAULT_LIMIT)
    }

    pub fn with_limits(catalogue_path: impl Into<PathBuf>, exp_days: i64, limit: usize) -> Res<Self> {
        let catalogue_path = catalogue_path.into();
        let catalogue = BrcCatalogue::load(&catalogue_path)?;
        Ok(AcronymManager {
            catalogue_path,
            catalogue,
            created_at: Instant::now(),
            exp_days,
            limit,
            caches: Caches::new(),
        })
    }

    fn is_stale(&self) -> bool {
        let exp = Duration::from_secs((self.exp_days.max(0) as u64) * 86_400);
        self.created_at.elapsed() > exp
    }

    /// Reloads the catalogue and drops both caches if the manager has
    /// expired. Called at the top of every public operation.
    fn refresh_if_stale(&mut self) -> Res<()> {
        if !self.is_stale() {
            return Ok(());
        }
        self.catalogue = BrcCatalogue::load(&self.catalogue_path)?;
        self.created_at = Instant::now();
        self.caches = Caches::new();
        Ok(())
    }

    fn evict_if_over_limit(&mut self) {
        while self.caches.single.len() > self.limit && !self.caches.single_order.is_empty() {
            let oldest = self.caches.single_order.remove(0);
            self.caches.single.remove(&oldest);
        }
        while self.caches.all.len() > self.limit && !self.caches.all_order.is_empty() {
            let oldest = self.caches.all_order.remove(0);
            self.caches.all.remove(&oldest);
        }
    }

    /// The single best decomposition for `designation`, cached by the raw
    /// (uncleaned) input string.
    pub fn identify_ccno(&mut self, designation: &str) -> Res<CcNoDes> {
        self.refresh_if_stale()?;
        if let Some(hit) = self.caches.single.get(designation) {
            return Ok(hit.clone());
        }
        let des = designation::identify_ccno(designation, &self.catalogue);
        self.caches.single.insert(designation.to_string(), des.clone());
        self.caches.single_order.push(designation.to_string());
        self.evict_if_over_limit();
        Ok(des)
    }

    /// Every valid decomposition for `designation`, longest-acronym first.
    pub fn identify_all_valid_ccno(&mut self, designation: &str) -> Res<Vec<CcNoDes>> {
        self.refresh_if_stale()?;
        if let Some(hit) = self.caches.all.get(designation) {
            return Ok(hit.clone());
        }
        let all = designation::identify_all_valid_ccno(designation, &self.catalogue);
        self.caches.all.insert(designation.to_string(), all.clone());
        self.caches.all_order.push(designation.to_string());
        self.evict_if_over_limit();
        Ok(all)
    }

    /// Bypasses both caches: used by the text-scan path (§4.2
    /// `extract_from_text`), which operates over whole documents rather
    /// than single designation strings and would not benefit from caching
    /// by exact designation text.
    pub fn extract_from_text(&mut self, text: &str) -> Res<Vec<CcNoDes>> {
        self.refresh_if_stale()?;
        Ok(designation::extract_from_text(text, &self.catalogue))
    }

    /// The coarse radix text scan (§SPEC_FULL B): every BRC id mentioned
    /// anywhere in `text`, without the full id decomposition
    /// [`extract_from_text`](Self::extract_from_text) performs.
    pub fn scan_acronyms_in_text(&mut self, text: &str) -> Res<Vec<i64>> {
        self.refresh_if_stale()?;
        Ok(designation::scan_acronyms_in_text(text, &self.catalogue))
    }

    pub fn identify_acr(&mut self, acr: &str) -> Res<Vec<i64>> {
        self.refresh_if_stale()?;
        Ok(self.catalogue.identify_acr(acr))
    }

    pub fn identify_acr_or_code(&mut self, acr_or_code: &str) -> Res<Vec<i64>> {
        self.refresh_if_stale()?;
        Ok(self.catalogue.identify_acr_or_code(acr_or_code))
    }

    pub fn catalogue(&mut self) -> Res<&BrcCatalogue> {
        self.refresh_if_stale()?;
        Ok(&self.catalogue)
    }

    pub fn catalogue_path(&self) -> &Path {
        &self.catalogue_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrcEntry, BrcIdSchema};
    use std::io::Write;

    fn write_catalogue(dir: &tempfile::TempDir) -> PathBuf {
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
            catalogue_templates: vec![],
            deprecated: false,
        }];
        let path = dir.path().join("brc.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(serde_json::to_string(&entries).unwrap().as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn caches_repeated_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalogue(&dir);
        let mut am = AcronymManager::new(path).unwrap();
        let first = am.identify_ccno("DSM 1234").unwrap();
        let second = am.identify_ccno("DSM 1234").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.acr, "DSM");
    }

    #[test]
    fn evicts_oldest_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalogue(&dir);
        let mut am = AcronymManager::with_limits(path, DEFAULT_EXP_DAYS, 2).unwrap();
        am.identify_ccno("DSM 1").unwrap();
        am.identify_ccno("DSM 2").unwrap();
        am.identify_ccno("DSM 3").unwrap();
        assert!(am.caches.single.len() <= 2);
        assert!(!am.caches.single.contains_key("DSM 1"));
    }

    #[test]
    fn stale_manager_reloads_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalogue(&dir);
        let mut am = AcronymManager::with_limits(path, 0, DEFAULT_LIMIT).unwrap();
        am.identify_ccno("DSM 1234").unwrap();
        assert!(am.is_stale());
        am.identify_ccno("DSM 1234").unwrap();
        assert!(am.caches.single.len() <= 1);
    }
}
