//! Agent id canonicalisation.
//!
//! Agent ids are opaque strings assigned at agent start. On disk they name
//! directories and files, so they are stripped to `[A-Za-z0-9_-]` before any
//! path is built from them. An id that strips to empty is not addressable
//! through the bus; such agents are reported as blocked rather than guessed
//! at.

/// Canonicalise an agent id by keeping only `[A-Za-z0-9_-]`.
pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// A canonical, non-empty agent id, or `None`.
pub fn canonical_non_empty(raw: &str) -> Option<String> {
    let id = canonicalize(raw);
    if id.is_empty() { None } else { Some(id) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_and_whitespace_characters() {
        assert_eq!(canonicalize("agent-7_b"), "agent-7_b");
        assert_eq!(canonicalize("../etc/passwd"), "etcpasswd");
        assert_eq!(canonicalize("bob smith"), "bobsmith");
        assert_eq!(canonicalize("φαλαγξ"), "");
    }

    #[test]
    fn empty_after_stripping_is_none() {
        assert_eq!(canonical_non_empty("!!!"), None);
        assert_eq!(canonical_non_empty("h1"), Some("h1".to_string()));
    }
}
