//! BRC catalogue: the metadata bundle loaded once at startup (§1, "out of
//! scope as a producer" — but its shape and indices are very much this
//! crate's concern).
//!
//! Grounded on `original_source/src/saim/designation/known_acr_db.py`
//! (`create_brc_con`, `_create_acr_code_index`, `_create_all_prefix_regex`)
//! — the acronym/code indices and the forward+reverse radix trees are a
//! direct port. Regexes are pre-compiled at load time per the Design Note
//! ("Regex as schema": reject rather than fail lazily).

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use crate::error::{Res, ResExt};
use crate::models::BrcEntry;
use crate::radix::RadixIndex;
use crate::text::{clean_string, PATTERN_EDGE};

/// A [`BrcEntry`]'s regex schema, pre-compiled and rejected up front if any
/// pattern fails to parse.
#[derive(Debug, Clone)]
pub struct CompiledBrcSchema {
    pub core: Regex,
    pub pre: Regex,
    pub suf: Regex,
}

#[derive(Debug, Clone)]
pub struct CompiledBrcEntry {
    pub entry: BrcEntry,
    pub fixed_acr: String,
    pub fixed_acr_syn: Vec<String>,
    pub fixed_code: String,
    pub schema: CompiledBrcSchema,
}

/// Strips non-word noise and redundant separators from an acronym-like
/// string and upper-cases it. Mirrors `rm_complex_structure`.
pub fn fix_acr(acr: &str) -> String {
    let mut out = String::new();
    let mut last_sep = false;
    for c in acr.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
            last_sep = false;
        } else if !last_sep && !out.is_empty() {
            out.push(':');
            last_sep = true;
        }
    }
    let trimmed = clean_string(&out, &[&PATTERN_EDGE]);
    trimmed.trim_matches(':').to_string()
}

pub struct BrcCatalogue {
    pub entries: HashMap<i64, CompiledBrcEntry>,
    pub acr_index: HashMap<String, Vec<i64>>,
    pub code_index: HashMap<String, Vec<i64>>,
    pub fwd_radix: RadixIndex<i64>,
    pub rev_radix: RadixIndex<i64>,
}

impl BrcCatalogue {
    /// Loads a JSON array of [`BrcEntry`] from `path`, compiles every
    /// schema regex, and builds the acronym/code indices plus the forward
    /// and reverse radix tries over every non-deprecated acronym/code/
    /// synonym.
    pub fn load(path: &Path) -> Res<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read BRC catalogue at {}", path.display()))?;
        let entries: Vec<BrcEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse BRC catalogue at {}", path.display()))?;
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<BrcEntry>) -> Res<Self> {
        let mut compiled = HashMap::new();
        let mut acr_index: HashMap<String, Vec<i64>> = HashMap::new();
        let mut code_index: HashMap<String, Vec<i64>> = HashMap::new();
        let mut fwd_radix = RadixIndex::new();
        let mut rev_radix = RadixIndex::new();

        for entry in entries {
            if entry.deprecated {
                continue;
            }
            let schema = CompiledBrcSchema {
                core: Regex::new(&entry.regex_id.core).map_err(|e| {
                    crate::error::VerifyLinkError::Designation(format!(
                        "BRC {} has an invalid core regex `{}`: {e}",
                        entry.id, entry.regex_id.core
                    ))
                })?,
                pre: Regex::new(&entry.regex_id.pre).map_err(|e| {
                    crate::error::VerifyLinkError::Designation(format!(
                        "BRC {} has an invalid prefix regex `{}`: {e}",
                        entry.id, entry.regex_id.pre
                    ))
                })?,
                suf: Regex::new(&entry.regex_id.suf).map_err(|e| {
                    crate::error::VerifyLinkError::Designation(format!(
                        "BRC {} has an invalid suffix regex `{}`: {e}",
                        entry.id, entry.regex_id.suf
                    ))
                })?,
            };

            let fixed_acr = fix_acr(&entry.acr);
            let fixed_acr_syn: Vec<String> = entry.synonyms.iter().map(|s| fix_acr(s)).collect();
            let fixed_code = fix_acr(&entry.code);

            acr_index.entry(fixed_acr.clone()).or_default().push(entry.id);
            for syn in &fixed_acr_syn {
                acr_index.entry(syn.clone()).or_default().push(entry.id);
            }
            code_index.entry(fixed_code.clone()).or_default().push(entry.id);

            fwd_radix.insert(&fixed_acr, &[entry.id]);
            let rev: String = fixed_acr.chars().rev().collect();
            rev_radix.insert(&rev, &[entry.id]);
            for syn in &fixed_acr_syn {
                fwd_radix.insert(syn, &[entry.id]);
                let rev_syn: String = syn.chars().rev().collect();
                rev_radix.insert(&rev_syn, &[entry.id]);
            }

            compiled.insert(
                entry.id,
                CompiledBrcEntry {
                    entry,
                    fixed_acr,
                    fixed_acr_syn,
                    fixed_code,
                    schema,
                },
            );
        }

        fwd_radix.compact();
        rev_radix.compact();

        Ok(BrcCatalogue {
            entries: compiled,
            acr_index,
            code_index,
            fwd_radix,
            rev_radix,
        })
    }

    pub fn identify_acr(&self, acr: &str) -> Vec<i64> {
        let fixed = fix_acr(acr);
        self.acr_index.get(&fixed).cloned().unwrap_or_default()
    }

    pub fn identify_acr_or_code(&self, acr_or_code: &str) -> Vec<i64> {
        let fixed = fix_acr(acr_or_code);
        let mut ids = self.acr_index.get(&fixed).cloned().unwrap_or_default();
        ids.extend(self.code_index.get(&fixed).cloned().unwrap_or_default());
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn entry(&self, id: i64) -> Option<&CompiledBrcEntry> {
        self.entries.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrcIdSchema;

    fn dsm_entry() -> BrcEntry {
        BrcEntry {
            id: 1,
            acr: "DSM".into(),
            code: "DSMZ".into(),
            synonyms: vec![],
            regex_ccno: r"DSM\s*\d+".into(),
            regex_id: BrcIdSchema {
                full: r".*".into(),
                core: r"\d+".into(),
                pre: r"^$".into(),
                suf: r"^$".into(),
            },
            homepage: "https://www.dsmz.de".into(),
            catalogue_templates: vec!["https://host/culture/DSM-<id>".into()],
            deprecated: false,
        }
    }

    #[test]
    fn loads_and_indexes_single_brc() {
        let cat = BrcCatalogue::from_entries(vec![dsm_entry()]).unwrap();
        assert_eq!(cat.identify_acr("DSM"), vec![1]);
        let (found, tags) = cat.fwd_radix.full_match("DSM");
        assert!(found);
        assert_eq!(tags, vec![1]);
    }

    #[test]
    fn rejects_invalid_regex() {
        let mut entry = dsm_entry();
        entry.regex_id.core = "(".into();
        assert!(BrcCatalogue::from_entries(vec![entry]).is_err());
    }

    #[test]
    fn deprecated_entries_are_excluded() {
        let mut entry = dsm_entry();
        entry.deprecated = true;
        let cat = BrcCatalogue::from_entries(vec![entry]).unwrap();
        assert!(cat.identify_acr("DSM").is_empty());
    }
}
