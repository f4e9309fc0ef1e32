//! Regex-driven string cleanup shared by the designation parser.
//!
//! Ported from `original_source/src/saim/shared/parse/string.py`. Patterns
//! are compiled once via `LazyLock`, following the same "compile the schema
//! up front" discipline the catalogue loader applies to per-BRC regexes
//! (§9 Design Notes, "Regex as schema").

use std::sync::LazyLock;

use regex::Regex;

pub static PATTERN_EDGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^A-Za-z0-9]+|[^A-Za-z0-9]+$").unwrap());
pub static PATTERN_ID_EDGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[,.:/\s_-]+|[,.:/\s_-]+$").unwrap());
pub static PATTERN_CORE_ID_EDGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\D+|\D+$").unwrap());
pub static PATTERN_CORE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\D\d+)*$").unwrap());
pub static PATTERN_CORE_ID_TXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\D\d+)*)").unwrap());
pub static PATTERN_PREFIX_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\W*([A-Za-z]+)\W*").unwrap());
pub static PATTERN_LEAD_ZERO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^0*(?=\d+$)").unwrap());
pub static PATTERN_PARA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)(]*\)|\[[^\[\]]*]|<[^<>]*>").unwrap());
pub static PATTERN_SI_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SI-ID\s*(\d+)(?:\.(\d+))?").unwrap());
pub static PATTERN_SI_CU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SI-CU\s*(\d+)$").unwrap());
pub static PATTERN_THREE_GROUPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\D*)(\d+(?:\D\d+)*)(\D*)$").unwrap());

static DESIGNATION_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^(?:[Tt]ype[-\s]+)?[Ss]train[.:\s]+").unwrap(),
        Regex::new(r"^(?:[Ss]pecimen[-\s]+)?[Vv]oucher[.:\s]+").unwrap(),
        Regex::new(r"^(?:[Cc]ulture[-\s]+)?[Cc]ollection[.:\s]+").unwrap(),
        Regex::new(r"[T\s]+$").unwrap(),
    ]
});

/// Removes every occurrence of each pattern, in order. Mirrors
/// `clean_string`.
pub fn clean_string(text: &str, patterns: &[&Regex]) -> String {
    let mut out = text.to_string();
    for p in patterns {
        out = p.replace_all(&out, "").to_string();
    }
    out
}

/// Strips parenthesised groups, leading `Strain:`-like prefixes, and
/// trims edge punctuation — the designation-level clean step of DP §4.2.1.
pub fn clean_designation(designation: &str) -> String {
    let mut out = PATTERN_PARA.replace_all(designation, "").to_string();
    out = PATTERN_EDGE.replace_all(&out, "").to_string();
    for p in DESIGNATION_PREFIXES.iter() {
        out = p.replace_all(&out, "").to_string();
    }
    collapse_whitespace(out.trim())
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}

/// Parses a free-form relation string such as `"SI-ID 1234.2"` into
/// `(si_id, version)`, defaulting version to 1. Mirrors
/// `saim.designation.extract_ccno.get_si_id`.
pub fn get_si_id(designation: &str) -> Option<(i64, i64)> {
    let trimmed = designation.trim();
    let caps = PATTERN_SI_ID.captures(trimmed)?;
    let id: i64 = caps.get(1)?.as_str().parse().ok()?;
    let ver = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    Some((id, ver))
}

/// Parses a free-form relation string such as `"SI-CU 42"` into its culture
/// id, or `-1` if it doesn't match. Mirrors
/// `saim.designation.extract_ccno.get_si_cu`.
pub fn get_si_cu(designation: &str) -> i64 {
    let trimmed = designation.trim();
    PATTERN_SI_CU
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_designation_strips_strain_prefix_and_parens() {
        assert_eq!(clean_designation("Strain: DSM 112721 (type)"), "DSM 112721");
    }

    #[test]
    fn get_si_id_parses_version() {
        assert_eq!(get_si_id("SI-ID 1234.2"), Some((1234, 2)));
        assert_eq!(get_si_id("SI-ID 77"), Some((77, 1)));
        assert_eq!(get_si_id("not it"), None);
    }

    #[test]
    fn get_si_cu_parses_or_defaults_to_negative_one() {
        assert_eq!(get_si_cu("SI-CU 42"), 42);
        assert_eq!(get_si_cu("si-cu 7"), 7);
        assert_eq!(get_si_cu("SI-CU 42.1"), -1);
        assert_eq!(get_si_cu("not it"), -1);
    }
}
