//! Linked issue and pull request references in free text.

use std::sync::LazyLock;

use regex::Regex;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)#(\d+)|https://github\.com/[^/\s]+/[^/\s]+/(?:issues|pull)/(\d+)")
        .expect("reference pattern is valid")
});

/// Extract every issue or pull request number referenced in `text`.
///
/// Recognizes short `#123` tokens and full `https://github.com/<owner>/<repo>/issues/123`
/// or `.../pull/123` URLs, case-insensitively. Numbers are returned in order of
/// appearance; duplicates are kept.
///
/// # Examples
///
/// ```
/// use speccheck_review::references::linked_references;
///
/// let text = "Fixes #12, see also https://github.com/acme/api/PULL/7 and #12";
/// assert_eq!(linked_references(text), vec![12, 7, 12]);
/// ```
pub fn linked_references(text: &str) -> Vec<u64> {
    REFERENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// The issue that governs a pull request: the first reference in its body.
///
/// # Examples
///
/// ```
/// use speccheck_review::references::governing_issue;
///
/// assert_eq!(governing_issue("Resolves #42"), Some(42));
/// assert_eq!(governing_issue("no references here"), None);
/// ```
pub fn governing_issue(text: &str) -> Option<u64> {
    linked_references(text).into_iter().next()
}
