//! Compacted trie over uppercase acronym-like keys.
//!
//! Every run of non-`[A-Za-z0-9]` characters in an inserted key collapses to
//! a single canonical separator `:` before insertion, so `"DSM-T"`,
//! `"DSM_T"` and `"DSM T"` all land on the same path. Lookups normalise the
//! probe string the same way, then walk the tree by longest matching edge.
//!
//! Grounded on `original_source/src/saim/shared/search/radix_tree.py`
//! (`RadixTree`, `is_full_match`, `find_first_match_with_fix`,
//! `find_first_match_simple`), kept as a generic, panic-free index over an
//! arbitrary tag type `T`.

use std::collections::HashMap;

const SEP: char = ':';

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Collapses every maximal run of non-word characters in `s` to one `SEP`,
/// upper-casing word characters along the way. Mirrors
/// `replace_non_word_chars`.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_sep = false;
    for c in s.chars() {
        if is_word_char(c) {
            out.push(c.to_ascii_uppercase());
            last_sep = false;
        } else if !last_sep {
            out.push(SEP);
            last_sep = true;
        }
    }
    out
}

/// Streaming variant of [`normalize`] that also yields the origin-string
/// byte offset of each emitted (possibly collapsed) character, so later
/// lookups can map back into the un-normalised text. Mirrors
/// `replace_non_word_chars_iter`.
fn normalize_iter(s: &str, start: usize) -> Vec<(char, usize)> {
    let mut out = Vec::new();
    let mut last_sep = false;
    for (idx, c) in s.char_indices().skip_while(|(i, _)| *i < start) {
        if is_word_char(c) {
            out.push((c.to_ascii_uppercase(), idx));
            last_sep = false;
        } else if !last_sep {
            out.push((SEP, idx));
            last_sep = true;
        }
    }
    out
}

/// Leading separators merge away entirely once a real char is found, the
/// way `_merge_lead_string_sep` does: a key that begins with noise skips it.
fn merge_lead_sep(s: &str) -> &str {
    s.trim_start_matches(SEP)
}

#[derive(Debug, Default)]
struct Node<T> {
    children: HashMap<String, Node<T>>,
    terminal: bool,
    tags: Vec<T>,
    max_edge_len: usize,
    compacted: bool,
}

impl<T: Clone + Eq> Node<T> {
    fn new() -> Self {
        Node {
            children: HashMap::new(),
            terminal: false,
            tags: Vec::new(),
            max_edge_len: 1,
            compacted: false,
        }
    }

    fn insert(&mut self, key: &str, tags: &[T]) {
        if self.compacted {
            return;
        }
        let key = merge_lead_sep(key);
        if key.is_empty() {
            self.terminal = true;
            for t in tags {
                if !self.tags.contains(t) {
                    self.tags.push(t.clone());
                }
            }
            return;
        }
        let mut chars = key.chars();
        let head = chars.next().unwrap().to_ascii_uppercase().to_string();
        let rest: String = chars.collect();
        self.children
            .entry(head)
            .or_insert_with(Node::new)
            .insert(&rest, tags);
    }

    /// Bottom-up compaction: a chain of single-child, non-terminal nodes
    /// (and no separator-edge sibling) merges into a single multi-char edge.
    fn compact(&mut self) {
        if self.compacted {
            return;
        }
        for child in self.children.values_mut() {
            child.compact();
        }
        let mut merged: HashMap<String, Node<T>> = HashMap::new();
        for (key, mut child) in self.children.drain() {
            if key != SEP.to_string()
                && !child.terminal
                && child.children.len() == 1
                && !child.children.contains_key(&SEP.to_string())
            {
                let (ckey, cchild) = child.children.drain().next().unwrap();
                let new_key = format!("{key}{ckey}");
                merged.insert(new_key, cchild);
            } else {
                merged.insert(key, child);
            }
        }
        self.max_edge_len = merged.keys().map(|k| k.len()).max().unwrap_or(1).max(1);
        self.children = merged;
        self.compacted = true;
    }
}

/// A compacted, insertion-only keyword index. Build it by repeated
/// [`RadixIndex::insert`], then [`RadixIndex::compact`] once before any
/// query; further inserts after compaction are silently ignored (matches
/// the source's `ready` flag on `RadixTree`).
#[derive(Debug)]
pub struct RadixIndex<T> {
    root: Node<T>,
}

impl<T: Clone + Eq> Default for RadixIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq> RadixIndex<T> {
    pub fn new() -> Self {
        RadixIndex { root: Node::new() }
    }

    /// Inserts `key` tagged with `tags` (may be empty). No-op once
    /// [`compact`](Self::compact) has run.
    pub fn insert(&mut self, key: &str, tags: &[T]) {
        self.root.insert(&normalize(key), tags);
    }

    /// Compacts the tree. Idempotent; safe to call more than once.
    pub fn compact(&mut self) {
        self.root.compact();
    }

    /// True iff `text`, normalised, walks the trie end-to-end to a terminal
    /// node *and* the trailing two-character lookahead in the original
    /// text doesn't look like a run-on word (two letters or two digits).
    pub fn full_match(&self, text: &str) -> (bool, Vec<T>) {
        let norm = normalize(text);
        if norm.is_empty() {
            return (false, Vec::new());
        }
        let mapper = OffsetMap::new(text, &norm);
        let mut found: HashMap<usize, Vec<T>> = HashMap::new();
        search(&self.root, &mapper, 0, &mut found);
        if let Some(&last) = found.keys().max() {
            if last == text.chars().count().saturating_sub(1) {
                return (true, found.remove(&last).unwrap_or_default());
            }
        }
        (false, Vec::new())
    }

    /// Every terminal node reached during the walk of `text`, mapped back
    /// into `text`'s original substrings (preserving original punctuation).
    /// `trim_right` drops the last character first (used when probing a
    /// designation that may still carry its trailing id).
    pub fn prefix_matches(&self, text: &str, trim_right: bool) -> Vec<(String, Vec<T>)> {
        let probe = if trim_right && !text.is_empty() {
            let mut chars: Vec<char> = text.chars().collect();
            chars.pop();
            chars.into_iter().collect::<String>()
        } else {
            text.to_string()
        };
        let norm = normalize(&probe);
        if norm.is_empty() {
            return Vec::new();
        }
        let mapper = OffsetMap::new(&probe, &norm);
        let mut found: HashMap<usize, Vec<T>> = HashMap::new();
        search(&self.root, &mapper, 0, &mut found);
        let mut out: Vec<(usize, String, Vec<T>)> = found
            .into_iter()
            .map(|(pos, tags)| (pos, mapper.map_seq(pos as isize), tags))
            .collect();
        out.sort_by_key(|(pos, _, _)| *pos);
        out.into_iter().map(|(_, s, t)| (s, t)).collect()
    }

    /// Streams `prefix_matches` over every position of `text`, skipping
    /// characters already consumed by a match. Used to find every BRC
    /// acronym occurrence in free text.
    pub fn scan_in_text(&self, text: &str, start: usize) -> Vec<Vec<T>> {
        let norm_chars = normalize_iter(text, start);
        let text_upper: String = norm_chars.iter().map(|(c, _)| *c).collect();
        let mut out = Vec::new();
        let mut pos = 0usize;
        while pos < text_upper.chars().count() {
            let mut found: HashMap<usize, Vec<T>> = HashMap::new();
            search_str(&self.root, &text_upper, pos, &mut found);
            if let Some(&last) = found.keys().max() {
                out.push(found.remove(&last).unwrap_or_default());
                pos = last + 1;
            } else {
                pos += 1;
            }
        }
        out
    }
}

/// Maps a position in the normalised short string back to a position (and
/// prefix substring) of the original string, the way `_SOMap` does.
struct OffsetMap {
    origin: Vec<char>,
    short: Vec<char>,
    map_seq: Vec<usize>,
}

impl OffsetMap {
    fn new(origin: &str, short: &str) -> Self {
        let origin: Vec<char> = origin.chars().collect();
        let short: Vec<char> = short.chars().collect();
        let mut map_seq = Vec::with_capacity(short.len());
        let mut running_offset = 0usize;
        for (sh_i, &c) in short.iter().enumerate() {
            while running_offset + sh_i < origin.len()
                && origin[running_offset + sh_i] != c
                && c != SEP
            {
                running_offset += 1;
            }
            map_seq.push(running_offset + sh_i);
        }
        OffsetMap { origin, short, map_seq }
    }

    fn short_at(&self, i: usize) -> char {
        self.short[i]
    }

    fn len(&self) -> usize {
        self.short.len()
    }

    fn map_seq(&self, last_ind: isize) -> String {
        if last_ind < 0 {
            return String::new();
        }
        let mapped_pos = self.map_seq[last_ind as usize];
        let mut end = mapped_pos;
        if self.origin.len() > mapped_pos + 1 {
            let c = self.origin[mapped_pos + 1];
            if c == ')' || c == ']' {
                end = mapped_pos + 1;
            }
        }
        self.origin[0..=end].iter().collect()
    }

    fn is_clearly_sep(&self, pos: usize) -> bool {
        is_clearly_sep_chars(&self.origin, pos)
    }
}

fn is_clearly_sep_chars(text: &[char], pos: usize) -> bool {
    if text.len() > pos + 1 {
        let a = text[pos];
        let b = text[pos + 1];
        if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() {
            return false;
        }
        if a.is_ascii_digit() && b.is_ascii_digit() {
            return false;
        }
    }
    true
}

fn search<T: Clone + Eq>(
    node: &Node<T>,
    mapper: &OffsetMap,
    start: usize,
    out: &mut HashMap<usize, Vec<T>>,
) {
    let window_end = (start + node.max_edge_len).min(mapper.len());
    if window_end <= start {
        return;
    }
    let to_sea: String = (start..window_end).map(|i| mapper.short_at(i)).collect();
    let max_ind = to_sea.chars().count();
    for cut in 0..max_ind {
        let sub: String = to_sea.chars().take(max_ind - cut).collect();
        if let Some(next_node) = node.children.get(&sub) {
            let next_start = start + max_ind - cut;
            let mom_pos = next_start.wrapping_sub(1);
            search(next_node, mapper, next_start, out);
            if next_node.terminal && mom_pos > 0 && mapper.is_clearly_sep(mom_pos) {
                out.insert(mom_pos, next_node.tags.clone());
            }
        }
    }
}

/// Same walk as [`search`] but over a plain already-normalised string
/// (for in-text scanning, where we don't need the origin offset map —
/// the caller tracks consumed length itself).
fn search_str<T: Clone + Eq>(
    node: &Node<T>,
    text: &str,
    start: usize,
    out: &mut HashMap<usize, Vec<T>>,
) {
    let chars: Vec<char> = text.chars().collect();
    let window_end = (start + node.max_edge_len).min(chars.len());
    if window_end <= start {
        return;
    }
    let max_ind = window_end - start;
    for cut in 0..max_ind {
        let sub: String = chars[start..window_end - cut].iter().collect();
        if let Some(next_node) = node.children.get(&sub) {
            let next_start = window_end - cut;
            let mom_pos = next_start.wrapping_sub(1);
            search_str(next_node, text, next_start, out);
            if next_node.terminal && mom_pos > 0 && is_clearly_sep_chars(&chars, mom_pos) {
                out.insert(mom_pos, next_node.tags.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[(&str, u32)]) -> RadixIndex<u32> {
        let mut idx = RadixIndex::new();
        for (k, tag) in keys {
            idx.insert(k, &[*tag]);
        }
        idx.compact();
        idx
    }

    #[test]
    fn full_match_round_trips_inserted_keys() {
        let idx = build(&[("DSM", 1), ("ATCC", 2)]);
        let (ok, tags) = idx.full_match("DSM");
        assert!(ok);
        assert_eq!(tags, vec![1]);
    }

    #[test]
    fn full_match_rejects_run_on_word() {
        let idx = build(&[("AB", 1)]);
        let (ok, _) = idx.full_match("ABCDE");
        assert!(!ok);
    }

    #[test]
    fn prefix_matches_return_original_substring() {
        let idx = build(&[("DSM", 1), ("DSM T", 2)]);
        let hits = idx.prefix_matches("DSM-T 1234", true);
        assert!(hits.iter().any(|(s, _)| s == "DSM"));
    }

    #[test]
    fn no_prefix_yields_empty() {
        let idx = build(&[("DSM", 1)]);
        assert!(idx.prefix_matches("ZZZZ 123", true).is_empty());
    }
}
