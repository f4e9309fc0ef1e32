//! In-page search (§4.6): decides whether a decoded page body "contains" a
//! [`SearchTask`]'s catalogue number and extra strings.
//!
//! Grounded on `original_source/src/saim/culture_link/private/verify_ccno.py`
//! (core-token regex construction) for the matching rule; the teacher's own
//! `scraper`-based page text extraction (`crawn::crawler::get_keywords`)
//! supplies the idiom for turning a response body into searchable text.

use regex::Regex;

use crate::models::SearchTask;

const SUFFIX_STRIP_SET: &str = r",.:/\s_\-T";

/// Builds the core-token regex for one BRC id decomposition:
/// `(?:ACR(?:\W+|$)?)?PRE(?:\W+|$)?0*CORE(?:\W+|$)?[SUF+strip-set]{len(SUF),}(?:\W|$)`.
fn core_token_regex(acr: &str, pre: &str, core: &str, suf: &str) -> Option<Regex> {
    let acr_part = if acr.is_empty() {
        String::new()
    } else {
        format!("(?:{}(?:\\W+|$))?", regex::escape(acr))
    };
    let pre_part = if pre.is_empty() {
        String::new()
    } else {
        format!("{}(?:\\W+|$)?", regex::escape(pre))
    };
    let suf_len = suf.chars().count();
    let suf_part = if suf.is_empty() {
        String::new()
    } else {
        format!("[{SUFFIX_STRIP_SET}]{{{suf_len},}}")
    };
    let pattern = format!(
        "(?i){acr_part}{pre_part}0*{}(?:\\W+|$)?{suf_part}(?:\\W|$)",
        regex::escape(core)
    );
    Regex::new(&pattern).ok()
}

/// Whole-word, case-folded substring match: every whitespace-split word of
/// `extra` must occur as a whole word in `page_text_upper`.
fn extra_matches(extra: &str, page_text_upper: &str) -> bool {
    extra.split_whitespace().all(|word| {
        let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))) else {
            return false;
        };
        re.is_match(page_text_upper)
    })
}

/// True iff `page_text` (any case) contains the task's catalogue number as
/// a core token and every extra string as a whole-word match.
pub fn contains_task(page_text: &str, task: &SearchTask) -> bool {
    let upper = page_text.to_uppercase();
    let id = &task.find_ccno.id;
    let Some(core_re) = core_token_regex(&task.find_ccno.acr, &id.pre, &id.core, &id.suf) else {
        return false;
    };
    if !core_re.is_match(&upper) {
        return false;
    }
    task.find_extra.iter().all(|extra| extra_matches(extra, &upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CcNoDes, CcNoId};

    fn task(acr: &str, pre: &str, core: &str, suf: &str, extra: Vec<&str>) -> SearchTask {
        SearchTask {
            brc_id: 1,
            find_ccno: CcNoDes {
                acr: acr.into(),
                id: CcNoId {
                    full: format!("{pre}{core}{suf}"),
                    pre: pre.into(),
                    core: core.into(),
                    suf: suf.into(),
                },
                designation: format!("{acr} {pre}{core}{suf}"),
            },
            find_extra: extra.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn finds_core_token_with_leading_zero_normalisation() {
        let t = task("DSM", "", "1234", "", vec![]);
        assert!(contains_task("Strain DSM 001234 was deposited.", &t));
    }

    #[test]
    fn requires_all_extras_present() {
        let t = task("DSM", "", "1234", "", vec!["Bacillus subtilis"]);
        assert!(!contains_task("DSM 1234 only.", &t));
        assert!(contains_task("DSM 1234, Bacillus subtilis strain.", &t));
    }

    #[test]
    fn suffix_strip_set_tolerates_separators() {
        let t = task("DSM", "", "1234", "T", vec![]);
        assert!(contains_task("see DSM 1234-T here", &t));
    }
}
