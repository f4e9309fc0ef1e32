//! Designation parser (DP, §4.2): decomposes a catalogue-number-like token
//! into `(acronym, id{prefix,core,suffix}, designation)`, and extracts every
//! such token from free text.
//!
//! Grounded on `original_source/src/saim/designation/extract_ccno.py`
//! (`identify_ccno`, `identify_all_valid_ccno`, `extract_ccno_from_text`,
//! `_identify_ccno_fix`, `_identify_left_ccno`).

use regex::Regex;

use crate::brc::BrcCatalogue;
use crate::models::{CcNoDes, CcNoId, DesignationType};
use crate::text::{
    clean_designation, clean_string, PATTERN_CORE_ID, PATTERN_CORE_ID_EDGE, PATTERN_CORE_ID_TXT,
    PATTERN_ID_EDGE, PATTERN_LEAD_ZERO, PATTERN_PREFIX_START,
};

/// Builds a case-insensitive pattern matching `acr` against arbitrary
/// punctuation variants of its internal separators: the radix already
/// collapses `"DSM-T"`/`"DSM_T"`/`"DSM T"` onto the same node when
/// indexing, so the acronym-stripping step below must tolerate the same
/// variation, or a multi-token acronym could never be decomposed from a
/// punctuation form it wasn't literally inserted with.
fn acr_match_pattern(acr: &str) -> String {
    let mut pattern = String::new();
    let mut in_sep = false;
    for c in acr.chars() {
        if c.is_ascii_alphanumeric() {
            pattern.push_str(&regex::escape(&c.to_string()));
            in_sep = false;
        } else if !in_sep {
            pattern.push_str(r"[^A-Za-z0-9]+");
            in_sep = true;
        }
    }
    pattern
}

/// Strips the acronym prefix from a cleaned designation and validates the
/// acronym/id boundary (a letter-ending acronym must be followed by a
/// non-letter; a digit-ending one by a non-digit). Mirrors `get_ccno_id`.
fn get_ccno_id(cleaned: &str, acr: &str) -> Option<String> {
    if acr.is_empty() {
        return None;
    }
    let acr_pattern = acr_match_pattern(acr);
    let acr_re = Regex::new(&format!("(?i)^{acr_pattern}")).ok()?;
    let matched = acr_re.find(cleaned)?;
    let after_prefix = &cleaned[matched.end()..];
    let fixed_id = clean_string(after_prefix, &[&crate::text::PATTERN_PARA, &PATTERN_ID_EDGE]);
    if fixed_id.is_empty() {
        return None;
    }
    let last = acr.chars().last()?;
    let boundary_re = if last.is_ascii_digit() {
        Regex::new(&format!("(?i)^{acr_pattern}\\D.*$")).ok()?
    } else {
        Regex::new(&format!("(?i)^{acr_pattern}[^A-Za-z].*$")).ok()?
    };
    if !boundary_re.is_match(cleaned) {
        return None;
    }
    Some(fixed_id)
}

fn clean_core(core: &str) -> String {
    let cleaned = clean_string(core, &[&PATTERN_CORE_ID_EDGE]);
    PATTERN_LEAD_ZERO.replace(&cleaned, "").to_string()
}

/// Finds the first non-empty occurrence of `allowed_pattern` in `to_check`.
/// Mirrors `_extract_suf_pre`.
fn extract_suf_pre(to_check: &str, allowed_pattern: &str) -> String {
    if to_check.is_empty() || allowed_pattern.is_empty() {
        return String::new();
    }
    let Ok(re) = Regex::new(&format!("({allowed_pattern})")) else {
        return String::new();
    };
    for m in re.find_iter(to_check) {
        if !m.as_str().is_empty() {
            return m.as_str().to_string();
        }
    }
    String::new()
}

fn reasonable_pre(pre: &str, pre_pattern: &str) -> Option<String> {
    let pre_e = extract_suf_pre(pre, pre_pattern);
    let pre_cl = clean_string(pre, &[&PATTERN_ID_EDGE]);
    if !pre_cl.is_empty() && pre_e != pre_cl {
        return None;
    }
    Some(pre_e)
}

fn reasonable_suf(suf: &str, suf_pattern: &str) -> Option<String> {
    let suf_e = extract_suf_pre(suf, suf_pattern);
    let suf_cl = clean_string(suf, &[&PATTERN_ID_EDGE]);
    if !suf_cl.is_empty() && suf_cl != suf_e {
        // A suffix may be followed by a known "strip-me" character (`T`)
        // and still validate.
        let stripped = Regex::new("T$").unwrap().replace(&suf_cl, "").to_string();
        if stripped != suf_e {
            return None;
        }
    }
    Some(suf_e)
}

/// Matches `fixed_id_cl` against every candidate BRC's `^(.*?)(core)(.*?)$`
/// schema, validating prefix/suffix against that BRC's regexes. Mirrors
/// `_get_id_parts_known`.
fn get_id_parts_known(
    cat: &BrcCatalogue,
    brc_ids: &[i64],
    fixed_id_cl: &str,
) -> Option<(String, String, String)> {
    for bid in brc_ids {
        let ce = cat.entry(*bid)?;
        let Ok(re) = Regex::new(&format!("^(.*?)({})(.*?)$", ce.schema.core.as_str())) else {
            continue;
        };
        let Some(caps) = re.captures(fixed_id_cl) else {
            continue;
        };
        let core = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if !PATTERN_CORE_ID.is_match(core) {
            continue;
        }
        let pre_raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let suf_raw = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let Some(pre) = reasonable_pre(pre_raw, ce.schema.pre.as_str()) else {
            continue;
        };
        let Some(suf) = reasonable_suf(suf_raw, ce.schema.suf.as_str()) else {
            continue;
        };
        return Some((pre, clean_core(core), suf));
    }
    None
}

fn identify_ccno_with_acr(cleaned: &str, cat: &BrcCatalogue, acr: &str) -> CcNoDes {
    let Some(fixed_id) = get_ccno_id(cleaned, acr) else {
        return CcNoDes::failed(cleaned);
    };
    let brc_ids = cat.identify_acr(acr);
    let fixed_id_cl = clean_string(&fixed_id, &[&PATTERN_ID_EDGE]);
    match get_id_parts_known(cat, &brc_ids, &fixed_id_cl) {
        Some((pre, core, suf)) => CcNoDes {
            acr: acr.to_string(),
            id: CcNoId {
                full: fixed_id,
                pre,
                core,
                suf,
            },
            designation: cleaned.to_string(),
        },
        None => CcNoDes::failed(cleaned),
    }
}

/// Every decomposition `ccno` admits against `cat`, longest-acronym first.
pub fn identify_all_valid_ccno(ccno: &str, cat: &BrcCatalogue) -> Vec<CcNoDes> {
    let cleaned = clean_designation(ccno);
    let candidates = cat.fwd_radix.prefix_matches(&cleaned, true);

    // Each candidate is already tagged with the BRC ids that share that
    // acronym span; resolve those back to the catalogue's own acronym text
    // rather than the raw (possibly differently-punctuated) substring the
    // radix happened to match in the input.
    let mut acrs: Vec<String> = Vec::new();
    for (_, brc_ids) in &candidates {
        for bid in brc_ids {
            if let Some(ce) = cat.entry(*bid) {
                if !acrs.contains(&ce.entry.acr) {
                    acrs.push(ce.entry.acr.clone());
                }
            }
        }
    }
    acrs.sort_by_key(|a| std::cmp::Reverse(a.chars().count()));

    acrs.into_iter()
        .map(|acr| identify_ccno_with_acr(&cleaned, cat, &acr))
        .filter(|d| d.is_valid())
        .collect()
}

/// The single best decomposition (longest acronym wins ties), degrading to
/// a failed [`CcNoDes`] rather than erroring.
pub fn identify_ccno(ccno: &str, cat: &BrcCatalogue) -> CcNoDes {
    identify_all_valid_ccno(ccno, cat)
        .into_iter()
        .next()
        .unwrap_or_else(|| CcNoDes::failed(clean_designation(ccno)))
}

fn identify_left_ccno(rev_acr: &str, rev_pre: &str, left_full: &[char]) -> String {
    let target: Vec<char> = rev_pre.chars().chain(rev_acr.chars()).collect();
    let mut consumed = 0usize;
    let mut li = 0usize;
    for tc in target {
        loop {
            if li >= left_full.len() {
                return String::new();
            }
            let lc = left_full[li];
            li += 1;
            consumed += 1;
            if lc.to_ascii_uppercase() == tc.to_ascii_uppercase() {
                break;
            }
        }
    }
    left_full[0..consumed].iter().rev().collect()
}

fn add_suffix(full_suf: &str, clean_suf: &str) -> String {
    let full_chars: Vec<char> = full_suf.chars().collect();
    let mut consumed = 0usize;
    let mut fi = 0usize;
    for c in clean_suf.chars() {
        loop {
            if fi >= full_chars.len() {
                return full_chars.iter().collect();
            }
            let fc = full_chars[fi];
            fi += 1;
            consumed += 1;
            if fc.to_ascii_uppercase() == c.to_ascii_uppercase() {
                break;
            }
        }
    }
    full_chars[0..consumed].iter().collect()
}

fn get_acronyms(
    sub_left: &str,
    pre_end: usize,
    prefix: &str,
    cat: &BrcCatalogue,
) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = cat
        .rev_radix
        .prefix_matches(sub_left, false)
        .into_iter()
        .map(|(acr, _)| (acr, String::new()))
        .collect();

    let tail: String = sub_left.chars().skip(pre_end).collect();
    let new_start = clean_string(&tail, &[&crate::text::PATTERN_EDGE]);
    out.extend(
        cat.rev_radix
            .prefix_matches(&new_start, false)
            .into_iter()
            .map(|(acr, _)| (acr, prefix.to_string())),
    );
    out
}

fn identify_ccno_fix(acr: &str, ccno: &str, suffix: &str, cat: &BrcCatalogue) -> CcNoDes {
    let clean_ccno = clean_designation(ccno);
    let Some(fixed_id) = get_ccno_id(&clean_ccno, acr) else {
        return CcNoDes::failed(clean_ccno);
    };
    let mut fixed_id_cl = clean_string(&fixed_id, &[&PATTERN_ID_EDGE]);
    let brc_ids = cat.identify_acr(acr);
    let (mut pre, mut core, mut suf) = (String::new(), String::new(), String::new());
    for bid in &brc_ids {
        let Some(ce) = cat.entry(*bid) else { continue };
        if !ce.schema.suf.as_str().is_empty() {
            if let Ok(re) = Regex::new(&format!("^([,.:/\\s_-]?(?:{}))", ce.schema.suf.as_str())) {
                if let Some(m) = re.find(suffix) {
                    fixed_id_cl.push_str(m.as_str());
                }
            }
        }
        if let Some((p, c, s)) = get_id_parts_known(cat, std::slice::from_ref(bid), &fixed_id_cl) {
            pre = p;
            core = c;
            suf = s;
            break;
        }
    }
    if core.is_empty() {
        return CcNoDes::failed(clean_ccno);
    }
    let mut full_id = fixed_id;
    let mut designation = clean_ccno;
    if !suf.is_empty() {
        let to_add = add_suffix(suffix, &suf);
        designation.push_str(&to_add);
        full_id.push_str(&to_add);
    }
    CcNoDes {
        acr: acr.to_string(),
        id: CcNoId {
            full: full_id,
            pre,
            core,
            suf,
        },
        designation,
    }
}

/// Finds every BRC token embedded in free text (§4.2 `extract_from_text`):
/// for every numeric-core match, looks left up to 64 chars for a known
/// acronym (optionally preceded by a prefix token) and right up to 9 chars
/// for an allowed suffix, yielding a reconstructed [`CcNoDes`] per valid
/// combination.
pub fn extract_from_text(text: &str, cat: &BrcCatalogue) -> Vec<CcNoDes> {
    let mut out = Vec::new();
    let mut last_end = 0usize;
    for m in PATTERN_CORE_ID_TXT.find_iter(text) {
        let match_start = m.start();
        let match_end = m.end();
        let window_start = last_end.max(match_start.saturating_sub(64));
        last_end = match_end;
        if window_start >= match_start {
            continue;
        }
        let left_full: Vec<char> = text[window_start..match_start].chars().rev().collect();
        let left_full_str: String = left_full.iter().collect();
        let sub_left = clean_string(&left_full_str, &[&crate::text::PATTERN_EDGE]);
        let Some(pre_cap) = PATTERN_PREFIX_START.captures(&sub_left) else {
            continue;
        };
        let Some(pre_group) = pre_cap.get(1) else {
            continue;
        };
        let prefix = pre_group.as_str().to_string();
        let pre_end = pre_group.end();
        let sub_right_end = (match_end + 9).min(text.len());
        let sub_right = &text[match_end..sub_right_end];

        for (rev_acr, rev_pre) in get_acronyms(&sub_left, pre_end, &prefix, cat) {
            let ccno_left = identify_left_ccno(&rev_acr, &rev_pre, &left_full);
            if ccno_left.is_empty() {
                continue;
            }
            let ccno = format!("{ccno_left}{}", m.as_str());
            let acr_fwd: String = rev_acr.chars().rev().collect();
            let ccno_des = identify_ccno_fix(&acr_fwd, &ccno, sub_right, cat);
            if ccno_des.is_valid() {
                out.push(ccno_des);
            }
        }
    }
    out
}

/// Classifies an already-decomposed designation, supplementing the base
/// CCNo decomposition with a handful of common non-CCNo designation shapes
/// (§SPEC_FULL B).
pub fn identify_designation_type(des: &CcNoDes) -> DesignationType {
    if des.is_valid() && !des.id.core.is_empty() {
        return DesignationType::CcNo;
    }
    let cleaned = des.designation.to_lowercase();
    if cleaned.contains("strain") {
        DesignationType::Strain
    } else if cleaned.contains("voucher") {
        DesignationType::Voucher
    } else if cleaned.contains("collection") {
        DesignationType::Collection
    } else {
        DesignationType::Des
    }
}

/// Splits a bare synonym string (no resolved acronym) into
/// `(prefix, core, suffix)` via the generic three-group numeric-core
/// pattern. Kept as a small public helper on this module since `MatchCache`
/// callers may hold synonym strings without a resolved acronym
/// (§SPEC_FULL B). Mirrors
/// `saim.designation.extract_ccno.get_syn_eq_struct`.
pub fn get_syn_eq_struct(designation: &str) -> (String, String, String) {
    let cleaned = clean_designation(designation);
    let Some(caps) = crate::text::PATTERN_THREE_GROUPS.captures(&cleaned) else {
        return (String::new(), String::new(), String::new());
    };
    let pre_raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let core_raw = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let suf_raw = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    if core_raw.is_empty() {
        return (String::new(), String::new(), String::new());
    }
    let pre = crate::brc::fix_acr(pre_raw);
    let core = clean_string(core_raw, &[&PATTERN_CORE_ID_EDGE]);
    let suf_cl = clean_string(suf_raw, &[&PATTERN_ID_EDGE]);
    let suf_stripped = Regex::new("T$").unwrap().replace(&suf_cl, "").to_string();
    (pre, core, suf_stripped.to_uppercase())
}

/// Every distinct BRC id whose acronym appears anywhere in `text` (the
/// radix text scanner run coarsely, without the full id decomposition
/// [`extract_from_text`] performs) — "which collections does this text
/// even mention".
pub fn scan_acronyms_in_text(text: &str, cat: &BrcCatalogue) -> Vec<i64> {
    let mut ids = Vec::new();
    for tags in cat.fwd_radix.scan_in_text(text, 0) {
        for id in tags {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrcEntry, BrcIdSchema};

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
                // Bare "DSM" additionally tolerates a stray "T" prefix
                // before the digits, e.g. "DSM-T 1234" read as DSM + T1234.
                pre: "T".into(),
                suf: "".into(),
            },
            homepage: "https://www.dsmz.de".into(),
            catalogue_templates: vec!["https://host/culture/DSM-<id>".into()],
            deprecated: false,
        }
    }

    fn dsm_t_entry() -> BrcEntry {
        BrcEntry {
            id: 2,
            acr: "DSM T".into(),
            code: "DSMZT".into(),
            synonyms: vec![],
            regex_ccno: r"DSM\s*T\s*\d+".into(),
            regex_id: BrcIdSchema {
                full: r".*".into(),
                core: r"\d+".into(),
                // The "T" is already part of the acronym itself here.
                pre: "".into(),
                suf: "".into(),
            },
            homepage: "https://www.dsmz.de".into(),
            catalogue_templates: vec![],
            deprecated: false,
        }
    }

    #[test]
    fn e1_parse_only() {
        let cat = BrcCatalogue::from_entries(vec![dsm_entry()]).unwrap();
        let des = identify_ccno("DSM 112721", &cat);
        assert_eq!(des.acr, "DSM");
        assert_eq!(des.id.core, "112721");
        assert_eq!(des.id.pre, "");
        assert_eq!(des.id.suf, "");
        assert_eq!(des.designation, "DSM 112721");
    }

    #[test]
    fn e2_parse_ambiguous_prefers_longest_acronym() {
        let cat = BrcCatalogue::from_entries(vec![dsm_entry(), dsm_t_entry()]).unwrap();
        let all = identify_all_valid_ccno("DSM-T 1234", &cat);
        assert!(all.len() >= 2, "expected both DSM and DSM T decompositions, got {all:?}");
        let best = identify_ccno("DSM-T 1234", &cat);
        assert_eq!(best.acr, "DSM T");
    }

    #[test]
    fn unparseable_input_degrades_to_failed() {
        let cat = BrcCatalogue::from_entries(vec![dsm_entry()]).unwrap();
        let des = identify_ccno("not a catalogue number", &cat);
        assert!(!des.is_valid());
    }

    #[test]
    fn e3_text_scan_finds_embedded_token() {
        let cat = BrcCatalogue::from_entries(vec![dsm_entry()]).unwrap();
        let found = extract_from_text("See DSM:123 and more text", &cat);
        assert!(found.iter().any(|d| d.acr == "DSM" && d.id.core == "123"));
    }

    #[test]
    fn get_syn_eq_struct_splits_prefix_core_suffix() {
        assert_eq!(
            get_syn_eq_struct("XY123ZT"),
            ("XY".to_string(), "123".to_string(), "Z".to_string())
        );
        assert_eq!(
            get_syn_eq_struct("DSM 001234"),
            ("DSM".to_string(), "001234".to_string(), "".to_string())
        );
        assert_eq!(
            get_syn_eq_struct("no digits here"),
            ("".to_string(), "".to_string(), "".to_string())
        );
    }

    #[test]
    fn scan_acronyms_in_text_finds_every_brc_mentioned() {
        let cat = BrcCatalogue::from_entries(vec![dsm_entry(), dsm_t_entry()]).unwrap();
        let ids = scan_acronyms_in_text("Deposited at DSM and later at DSM T, see DSM again.", &cat);
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
    }
}
