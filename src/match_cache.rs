//! Match-cache & resolver (MR, §4.9): in-memory strain-identity voting over
//! a culture record plus its declared relations.
//!
//! Grounded on `original_source/src/saim/strain_matching/private/
//! strain_match.py` for the three-signal voting algorithm and the
//! intersection/fallback selection rule. §9's "Cyclic relation graphs" Design
//! Note is honoured literally: votes are aggregated at depth 1 only, no
//! recursion into `relation_ccno`.

use std::collections::{HashMap, HashSet};

use crate::acronym_manager::AcronymManager;
use crate::brc::fix_acr;
use crate::error::{Res, VerifyLinkError};
use crate::models::{
    CcnoKey, CultureCcnoKey, CultureRecord, CultureStatus, MatchOutcome, RelationCcnoKey,
    UpdateResults,
};
use crate::text::get_si_id;

/// Skip empty sets, then intersect whatever remains. An all-empty input
/// yields the empty set (§4.9 voting algorithm, `nonEmptyIntersect`).
fn non_empty_intersect(sets: &[&HashSet<i64>]) -> HashSet<i64> {
    let mut populated = sets.iter().filter(|s| !s.is_empty());
    let Some(first) = populated.next() else {
        return HashSet::new();
    };
    let mut acc: HashSet<i64> = (*first).clone();
    for s in populated {
        acc = acc.intersection(s).cloned().collect();
    }
    acc
}

pub struct MatchCache {
    culture_ccno: HashMap<CultureCcnoKey, (i64, i64)>,
    relation_ccno: HashMap<RelationCcnoKey, HashMap<i64, i64>>,
    si_id: HashMap<i64, i64>,
    erroneous_culture_ids: HashSet<i64>,
    deprecated_brc_ids: HashSet<i64>,
    /// Sticky per Open Question 1 (SPEC_FULL §C): once set by a decrement
    /// underflow, every later `check_consistency` call fails until the
    /// cache is rebuilt.
    incorrect: bool,
}

impl Default for MatchCache {
    fn default() -> Self {
        MatchCache {
            culture_ccno: HashMap::new(),
            relation_ccno: HashMap::new(),
            si_id: HashMap::new(),
            erroneous_culture_ids: HashSet::new(),
            deprecated_brc_ids: HashSet::new(),
            incorrect: false,
        }
    }
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_culture_erroneous(&mut self, culture_id: i64) {
        self.erroneous_culture_ids.insert(culture_id);
    }

    pub fn mark_brc_deprecated(&mut self, brc_id: i64) {
        self.deprecated_brc_ids.insert(brc_id);
    }

    fn main_si_id(&self, sid: i64) -> i64 {
        *self.si_id.get(&sid).unwrap_or(&sid)
    }

    /// §4.9 step 1: direct `(brc_id, pre, core, suf)` lookup, with the
    /// validations that turn a hit into a hard error rather than a result.
    fn lookup_known(&self, key: &CultureCcnoKey) -> Res<Option<(i64, i64)>> {
        let Some(&(cid, sid)) = self.culture_ccno.get(key) else {
            return Ok(None);
        };
        if self.deprecated_brc_ids.contains(&key.brc_id) {
            return Err(VerifyLinkError::StrainMatch(format!(
                "inv_brc: BRC {} is deprecated",
                key.brc_id
            )));
        }
        if self.erroneous_culture_ids.contains(&cid) {
            return Err(VerifyLinkError::StrainMatch(format!(
                "inv_cul: culture {cid} is marked erroneous"
            )));
        }
        if cid < 0 || sid < 0 {
            return Err(VerifyLinkError::StrainMatch(format!(
                "err_ca: negative id in culture_ccno entry ({cid}, {sid})"
            )));
        }
        Ok(Some((cid, sid)))
    }

    /// §4.9 steps 1-2: resolve a [`CultureRecord`] to a strain/culture
    /// identity. `skip_if_known` implements "If both ids already known and
    /// skip=true, return" — pass `true` when the caller doesn't need a
    /// fresh vote for an already-cached culture.
    pub fn match_culture(
        &self,
        am: &mut AcronymManager,
        record: &CultureRecord,
        skip_if_known: bool,
    ) -> Res<MatchOutcome> {
        if record.status == CultureStatus::Erroneous {
            return Err(VerifyLinkError::StrainMatch(
                "err_ca: culture record is marked erroneous".into(),
            ));
        }

        let ckey = CultureCcnoKey {
            brc_id: record.brc_id,
            key: CcnoKey::from_id(&record.id),
        };
        let known = self.lookup_known(&ckey)?;

        if let Some((cid, sid)) = known {
            if skip_if_known {
                return Ok(MatchOutcome {
                    strain_id: self.main_si_id(sid),
                    culture_id: cid,
                    fallback_strain_ids: Vec::new(),
                    warnings: Vec::new(),
                    proposed_update: None,
                });
            }
        }

        let mut warnings = Vec::new();

        // Signal 1: direct relation lookup.
        let direct_key = RelationCcnoKey {
            acr: fix_acr(&record.acr),
            key: CcnoKey::from_id(&record.id),
        };
        let direct: HashSet<i64> = self
            .relation_ccno
            .get(&direct_key)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();

        // Signal 2: relation overlap histogram.
        let mut histogram: HashMap<i64, i64> = HashMap::new();
        let mut voters = 0i64;
        for relation in &record.strain.relation {
            let candidates = am.identify_all_valid_ccno(relation)?;
            if candidates.is_empty() {
                continue;
            }
            voters += 1;
            for ccno_des in &candidates {
                let rel_key = RelationCcnoKey {
                    acr: fix_acr(&ccno_des.acr),
                    key: CcnoKey::from_id(&ccno_des.id),
                };
                if let Some(m) = self.relation_ccno.get(&rel_key) {
                    for (&sid, &count) in m {
                        *histogram.entry(sid).or_insert(0) += count;
                    }
                }
                for brc_id in am.identify_acr(&ccno_des.acr)? {
                    let cul_key = CultureCcnoKey {
                        brc_id,
                        key: CcnoKey::from_id(&ccno_des.id),
                    };
                    if let Some(&(_, sid)) = self.culture_ccno.get(&cul_key) {
                        *histogram.entry(sid).or_insert(0) += 1;
                    }
                }
            }
        }

        let total_votes: i64 = histogram.values().sum();
        let mut ccno_top: Vec<i64> = histogram.keys().copied().collect();
        ccno_top.sort_by(|a, b| {
            histogram[b]
                .cmp(&histogram[a])
                .then_with(|| a.cmp(b))
        });
        if let Some(&top_id) = ccno_top.first() {
            let top_count = histogram[&top_id];
            if voters > 0 && (top_count as f64) < 0.4 * voters as f64 {
                warnings.push(format!(
                    "top relation vote {top_count} is under 40% of {voters} voters"
                ));
            }
            if total_votes > 0 && (top_count as f64) < 0.5 * total_votes as f64 {
                warnings.push(format!(
                    "top relation vote {top_count} is under 50% of {total_votes} total votes"
                ));
            }
        }

        // Signal 3: transitive SI-ID relation.
        let mut siid_set: HashSet<i64> = HashSet::new();
        for relation in &record.strain.relation {
            if let Some((sid, _ver)) = get_si_id(relation) {
                siid_set.insert(self.main_si_id(sid));
            }
        }

        let ccno_top_set: HashSet<i64> = ccno_top.iter().copied().collect();
        let dec = non_empty_intersect(&[&direct, &ccno_top_set, &siid_set]);

        let mut winner = if dec.len() == 1 {
            *dec.iter().next().unwrap()
        } else if siid_set.len() == 1 {
            *siid_set.iter().next().unwrap()
        } else if let Some(&id) = ccno_top.iter().find(|id| dec.contains(id)) {
            id
        } else {
            -1
        };

        let mut fallbacks: HashSet<i64> = direct
            .iter()
            .chain(siid_set.iter())
            .chain(ccno_top.iter())
            .copied()
            .filter(|&id| id > 0 && id != winner)
            .collect();

        if let Some((known_cid, known_sid)) = known {
            let known_main = self.main_si_id(known_sid);
            if winner != -1 && winner != known_main {
                warnings.push(format!(
                    "voted winner {winner} disagrees with known strain_id {known_main}; preferring known id"
                ));
                fallbacks.insert(winner);
                winner = known_main;
            }
            if winner == known_main {
                return Ok(MatchOutcome {
                    strain_id: known_main,
                    culture_id: known_cid,
                    fallback_strain_ids: {
                        let mut fb: Vec<i64> = fallbacks.into_iter().collect();
                        fb.sort_unstable();
                        fb
                    },
                    warnings,
                    proposed_update: None,
                });
            }
        }

        let mut fallback_ids: Vec<i64> = fallbacks.into_iter().collect();
        fallback_ids.sort_unstable();

        let culture_id = known.map(|(cid, _)| cid).unwrap_or(-1);

        let proposed_update = if winner > 0 {
            Some(UpdateResults {
                si_id: winner,
                si_cu: culture_id,
                used_in_update: true,
                cid: ckey.clone(),
                add_relations: vec![direct_key],
                del_relations: Vec::new(),
            })
        } else {
            None
        };

        Ok(MatchOutcome {
            strain_id: winner,
            culture_id,
            fallback_strain_ids: fallback_ids,
            warnings,
            proposed_update,
        })
    }

    /// §4.9 step 3: applies a caller-accepted [`UpdateResults`].
    pub fn update_cache(&mut self, update: &UpdateResults, warnings: &mut Vec<String>) {
        if !update.used_in_update {
            return;
        }
        match self.si_id.get(&update.si_id) {
            Some(&existing) if existing != update.si_id => {
                warnings.push(format!(
                    "si_id {} already mapped to main {existing}; overwriting to self-main",
                    update.si_id
                ));
                self.si_id.insert(update.si_id, update.si_id);
            }
            _ => {
                self.si_id.insert(update.si_id, update.si_id);
            }
        }

        self.culture_ccno
            .insert(update.cid.clone(), (update.si_cu, update.si_id));

        for key in &update.add_relations {
            *self
                .relation_ccno
                .entry(key.clone())
                .or_default()
                .entry(update.si_id)
                .or_insert(0) += 1;
        }

        for key in &update.del_relations {
            let Some(inner) = self.relation_ccno.get_mut(key) else {
                continue;
            };
            let Some(count) = inner.get_mut(&update.si_id) else {
                continue;
            };
            *count -= 1;
            if *count < 0 {
                warnings.push(format!(
                    "relation_ccno underflow for si_id {} — marking cache incorrect",
                    update.si_id
                ));
                self.incorrect = true;
            }
            if *count <= 0 {
                inner.remove(&update.si_id);
            }
            if inner.is_empty() {
                self.relation_ccno.remove(key);
            }
        }
    }

    /// Scans for negative ids anywhere, and `relation_ccno`/`culture_ccno`
    /// entries referencing a non-main `si_id` (§4.9).
    pub fn check_consistency(&self) -> Res<()> {
        if self.incorrect {
            return Err(VerifyLinkError::StrainMatch(
                "match cache is marked incorrect after a relation_ccno underflow".into(),
            ));
        }
        for (key, &(cid, sid)) in &self.culture_ccno {
            if cid < 0 || sid < 0 || key.brc_id < 0 {
                return Err(VerifyLinkError::StrainMatch(format!(
                    "negative id in culture_ccno: brc={}, cid={cid}, sid={sid}",
                    key.brc_id
                )));
            }
            if self.main_si_id(sid) != sid {
                return Err(VerifyLinkError::StrainMatch(format!(
                    "culture_ccno references non-main si_id {sid}"
                )));
            }
        }
        for map in self.relation_ccno.values() {
            for (&sid, &count) in map {
                if sid < 0 || count < 0 {
                    return Err(VerifyLinkError::StrainMatch(format!(
                        "negative id in relation_ccno: sid={sid}, count={count}"
                    )));
                }
                if self.main_si_id(sid) != sid {
                    return Err(VerifyLinkError::StrainMatch(format!(
                        "relation_ccno references non-main si_id {sid}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrcEntry, BrcIdSchema, CcNoId};
    use std::io::Write;

    fn dsm_catalogue_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
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

    fn id(core: &str) -> CcNoId {
        CcNoId {
            full: core.into(),
            pre: "".into(),
            core: core.into(),
            suf: "".into(),
        }
    }

    /// E8: strain resolution via direct relation lookup.
    #[test]
    fn e8_resolves_via_direct_relation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dsm_catalogue_path(&dir);
        let mut am = AcronymManager::new(path).unwrap();

        let mut mr = MatchCache::new();
        mr.culture_ccno.insert(
            CultureCcnoKey {
                brc_id: 1,
                key: CcnoKey::from_id(&id("112721")),
            },
            (1, 1),
        );
        let mut relation_votes = HashMap::new();
        relation_votes.insert(1i64, 1i64);
        mr.relation_ccno.insert(
            RelationCcnoKey {
                acr: "DSM".into(),
                key: CcnoKey::from_id(&id("112721")),
            },
            relation_votes,
        );

        let record = CultureRecord {
            ccno: "DSM 112722".into(),
            acr: "DSM".into(),
            brc_id: 1,
            id: id("112722"),
            status: CultureStatus::Valid,
            strain: crate::models::StrainRelations {
                relation: vec!["DSM 112721".into()],
            },
        };

        let outcome = mr.match_culture(&mut am, &record, false).unwrap();
        assert_eq!(outcome.strain_id, 1);
        assert_eq!(outcome.culture_id, -1);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn known_culture_disagreement_prefers_known_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dsm_catalogue_path(&dir);
        let mut am = AcronymManager::new(path).unwrap();

        let mut mr = MatchCache::new();
        mr.culture_ccno.insert(
            CultureCcnoKey {
                brc_id: 1,
                key: CcnoKey::from_id(&id("1")),
            },
            (10, 7),
        );
        let mut votes = HashMap::new();
        votes.insert(99i64, 5i64);
        mr.relation_ccno.insert(
            RelationCcnoKey {
                acr: "DSM".into(),
                key: CcnoKey::from_id(&id("1")),
            },
            votes,
        );

        let record = CultureRecord {
            ccno: "DSM 1".into(),
            acr: "DSM".into(),
            brc_id: 1,
            id: id("1"),
            status: CultureStatus::Valid,
            strain: crate::models::StrainRelations { relation: vec![] },
        };
        let outcome = mr.match_culture(&mut am, &record, false).unwrap();
        assert_eq!(outcome.strain_id, 7);
        assert!(outcome.fallback_strain_ids.contains(&99));
        assert!(!outcome.warnings.is_empty());
    }

    #[test]
    fn underflow_sets_sticky_incorrect_flag() {
        let mut mr = MatchCache::new();
        let key = RelationCcnoKey {
            acr: "DSM".into(),
            key: CcnoKey::from_id(&id("1")),
        };
        let update = UpdateResults {
            si_id: 1,
            si_cu: 1,
            used_in_update: true,
            cid: CultureCcnoKey {
                brc_id: 1,
                key: CcnoKey::from_id(&id("1")),
            },
            add_relations: vec![],
            del_relations: vec![key],
        };
        let mut warnings = Vec::new();
        mr.update_cache(&update, &mut warnings);
        assert!(mr.check_consistency().is_err());
        // Even after fixing the underlying data, the cache stays flagged.
        assert!(mr.check_consistency().is_err());
    }

    #[test]
    fn consistent_cache_passes() {
        let mut mr = MatchCache::new();
        let update = UpdateResults {
            si_id: 1,
            si_cu: 5,
            used_in_update: true,
            cid: CultureCcnoKey {
                brc_id: 1,
                key: CcnoKey::from_id(&id("1")),
            },
            add_relations: vec![RelationCcnoKey {
                acr: "DSM".into(),
                key: CcnoKey::from_id(&id("1")),
            }],
            del_relations: vec![],
        };
        let mut warnings = Vec::new();
        mr.update_cache(&update, &mut warnings);
        assert!(mr.check_consistency().is_ok());
    }
}
