//! Core data model (§3). Plain data, no behaviour beyond small invariant
//! helpers — the operations that build and consume these types live in
//! their owning modules (`designation`, `brc`, `verifier`, `match_cache`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Substructure of a catalogue number id: `pre` is optional leading
/// letters, `core` is the numeric body, `suf` is optional trailing letters
/// (often `T` for type strains). `core` and `pre`/`suf` are always
/// substrings of `full`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcNoId {
    pub full: String,
    pub pre: String,
    pub core: String,
    pub suf: String,
}

impl CcNoId {
    pub fn is_valid(&self) -> bool {
        !self.core.is_empty()
    }
}

/// A decomposed catalogue number: the recognised acronym, its structured
/// id, and the designation text it was parsed from. `acr == ""` marks a
/// failed decomposition (DP degrades rather than erroring, §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcNoDes {
    pub acr: String,
    pub id: CcNoId,
    pub designation: String,
}

impl CcNoDes {
    pub fn failed(designation: impl Into<String>) -> Self {
        CcNoDes {
            acr: String::new(),
            id: CcNoId::default(),
            designation: designation.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.acr.is_empty()
    }
}

/// Coarse classification of a free-form designation, supplementing the
/// base CCNo decomposition (§SPEC_FULL B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesignationType {
    CcNo,
    Strain,
    Voucher,
    Collection,
    Des,
}

/// Per-BRC identifier schema, raw regex source strings as loaded from the
/// catalogue file; compiled once by [`crate::brc::BrcCatalogue::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrcIdSchema {
    pub full: String,
    pub core: String,
    pub pre: String,
    pub suf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrcEntry {
    pub id: i64,
    pub acr: String,
    pub code: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub regex_ccno: String,
    pub regex_id: BrcIdSchema,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub catalogue_templates: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

/// `LinkLevel` (§3): the position of a catalogue link in the try order of
/// §4.7 — templates first, then the caller-supplied fallback, then the
/// BRC homepage (pinged only, never searched).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkLevel {
    Cat,
    Home,
    Emp,
    Fallback,
}

impl LinkLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkLevel::Cat => "cat",
            LinkLevel::Home => "home",
            LinkLevel::Emp => "emp",
            LinkLevel::Fallback => "fallback",
        }
    }
}

/// `CacheNames` (§3): the three TTL families a cached response can belong
/// to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheClass {
    Homepage,
    Catalogue,
    CatalogueDetailed,
}

impl CacheClass {
    pub fn name(&self) -> &'static str {
        match self {
            CacheClass::Homepage => "homepage",
            CacheClass::Catalogue => "catalogue",
            CacheClass::CatalogueDetailed => "catalogue_detailed",
        }
    }

    pub fn ttl_days(&self) -> i64 {
        match self {
            CacheClass::Homepage => 60,
            CacheClass::Catalogue => 30,
            CacheClass::CatalogueDetailed => 1,
        }
    }

    pub fn skips_search(&self) -> bool {
        matches!(self, CacheClass::Homepage)
    }
}

/// `VerStatus` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerStatus {
    Ok,
    MisEle,
    NoUrl,
    Timeout,
    Prohibited,
    Fail404,
    Fail403,
    FailStatus,
    Err,
}

impl VerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerStatus::Ok => "ok",
            VerStatus::MisEle => "mis_ele",
            VerStatus::NoUrl => "no_url",
            VerStatus::Timeout => "timeout",
            VerStatus::Prohibited => "prohibited",
            VerStatus::Fail404 => "fail_404",
            VerStatus::Fail403 => "fail_403",
            VerStatus::FailStatus => "fail_status",
            VerStatus::Err => "err",
        }
    }
}

/// Caller-facing search request (§3). `brc_id == -1` means "any BRC";
/// `task_id` is the correlation key the caller uses to match results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub task_id: i64,
    pub brc_id: i64,
    pub find_ccno: String,
    #[serde(default)]
    pub find_extra: Vec<String>,
    #[serde(default)]
    pub fallback_link: String,
    #[serde(default)]
    pub exclude: Vec<LinkLevel>,
}

/// A resolved-BRC search task: the decomposed CCNo plus whatever extra
/// strings the page body must also contain.
#[derive(Debug, Clone)]
pub struct SearchTask {
    pub brc_id: i64,
    pub find_ccno: CcNoDes,
    pub find_extra: Vec<String>,
}

/// One candidate URL to try, in the order VW walks them.
#[derive(Debug, Clone)]
pub struct CandidateLink {
    pub level: LinkLevel,
    pub url: String,
    pub cache_class: CacheClass,
}

/// Everything a verifier worker needs for one `SearchRequest`: the resolved
/// task plus its ordered candidate links (templates, then fallback, then
/// homepage).
#[derive(Debug, Clone)]
pub struct TaskPackage {
    pub task_id: i64,
    pub search_task: SearchTask,
    pub urls: Vec<CandidateLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStatus {
    pub link: String,
    pub link_type: String,
    pub status: VerStatus,
}

#[derive(Debug, Clone)]
pub struct LinkResult {
    pub link: String,
    pub brc_id: i64,
    pub found_ccno: CcNoDes,
}

#[derive(Debug, Clone)]
pub struct VerifiedUrl {
    pub task_id: i64,
    pub result: Option<LinkResult>,
    pub status: Vec<LinkStatus>,
}

/// CLI-level configuration threaded through RM/LG/VW construction.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub worker_count: usize,
    pub db_size_gb: u64,
    pub work_dir: PathBuf,
    pub contact: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            worker_count: 1,
            db_size_gb: 10,
            work_dir: PathBuf::from("."),
            contact: String::new(),
        }
    }
}

/// Whether a culture record is itself known to be erroneous (§4.9 step 1
/// validation: "status not erroneous").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CultureStatus {
    Valid,
    Erroneous,
}

/// `strain.relation` (§4.9): free-form designation strings the caller
/// asserts are related to this culture (e.g. synonyms, prior deposits).
#[derive(Debug, Clone, Default)]
pub struct StrainRelations {
    pub relation: Vec<String>,
}

/// Input to [`crate::match_cache::MatchCache::match_culture`] (§4.9).
#[derive(Debug, Clone)]
pub struct CultureRecord {
    pub ccno: String,
    pub acr: String,
    pub brc_id: i64,
    pub id: CcNoId,
    pub status: CultureStatus,
    pub strain: StrainRelations,
}

/// The normalised `(pre, core, suf)` part of a [`CultureCcnoKey`]/
/// [`RelationCcnoKey`], upper-cased so callers don't have to agree on case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CcnoKey {
    pub pre: String,
    pub core: String,
    pub suf: String,
}

impl CcnoKey {
    pub fn from_id(id: &CcNoId) -> Self {
        CcnoKey {
            pre: id.pre.to_uppercase(),
            core: id.core.to_uppercase(),
            suf: id.suf.to_uppercase(),
        }
    }
}

/// `culture_ccno` key: `(brc_id, pre, core, suf)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CultureCcnoKey {
    pub brc_id: i64,
    pub key: CcnoKey,
}

/// `relation_ccno` key: `(fixed_acr, pre, core, suf)` — keyed by acronym
/// rather than resolved BRC id, since a relation token may not yet be
/// pinned to one BRC.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationCcnoKey {
    pub acr: String,
    pub key: CcnoKey,
}

/// A cache mutation proposed by `match_culture` and applied by
/// `update_cache` only if the caller accepts it (§4.9 step 3).
#[derive(Debug, Clone)]
pub struct UpdateResults {
    pub si_id: i64,
    pub si_cu: i64,
    pub used_in_update: bool,
    pub cid: CultureCcnoKey,
    pub add_relations: Vec<RelationCcnoKey>,
    pub del_relations: Vec<RelationCcnoKey>,
}

/// Outcome of `match_culture`: the resolved identity plus an optional
/// proposed cache update and any warnings raised along the way.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub strain_id: i64,
    pub culture_id: i64,
    pub fallback_strain_ids: Vec<i64>,
    pub warnings: Vec<String>,
    pub proposed_update: Option<UpdateResults>,
}
