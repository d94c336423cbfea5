//! Character n-gram Jaccard similarity.

use std::collections::HashSet;

/// Jaccard similarity of the character n-gram sets of `a` and `b`.
///
/// Whitespace runs collapse to a single space before n-grams are taken.
/// Returns 0.0 when either side has no n-gram (empty or shorter than `n`).
pub fn jaccard_ngrams(a: &str, b: &str, n: usize) -> f64 {
    let a = collapse(a);
    let b = collapse(b);
    let set_a = ngrams(&a, n);
    let set_b = ngrams(&b, n);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn collapse(s: &str) -> Vec<char> {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect()
}

fn ngrams(chars: &[char], n: usize) -> HashSet<&[char]> {
    if n == 0 {
        return HashSet::new();
    }
    chars.windows(n).collect()
}
