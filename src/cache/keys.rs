// src/cache/keys.rs
//! Cache key derivation.
//!
//! All cache and lock keys used by the crate are built here so the namespaces
//! stay in one place:
//! - `emb:{normalized}` embedding vectors
//! - `weaviate:similarity:{normalized}` ranked similarity results
//! - `page:course:{slug}` resolved page context
//! - `session:{id}:nav` last navigation of a session
//! - `lock:session:{id}` per-session turn lock

/// Canonical form of a free-text query.
///
/// Lower-cases, drops everything outside `[a-z0-9]` and whitespace, then sorts
/// the remaining tokens and joins them with `_`. An underscore in the input is
/// read as a token separator, which keeps the function idempotent. Queries with the same keyword
/// set map to the same key, so "Python course" and "course Python" share
/// cache entries.
pub fn normalize_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c == '_' { ' ' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join("_")
}

pub fn embedding_key(normalized: &str) -> String {
    format!("emb:{}", normalized)
}

pub fn similarity_key(normalized: &str) -> String {
    format!("weaviate:similarity:{}", normalized)
}

pub fn page_key(slug: &str) -> String {
    format!("page:course:{}", slug)
}

pub fn navigation_key(session_id: &str) -> String {
    format!("session:{}:nav", session_id)
}

pub fn session_lock_key(session_id: &str) -> String {
    format!("lock:session:{}", session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_order_and_case_collapse() {
        let a = normalize_query("Python Course");
        let b = normalize_query("course python");
        let c = normalize_query("  COURSE   Python!!");
        assert_eq!(a, "course_python");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_query("Data-Science: 101 for Beginners?");
        assert_eq!(once, "101_beginners_datascience_for");
        assert_eq!(normalize_query(&once), once);
    }

    #[test]
    fn test_punctuation_only_query_is_empty() {
        assert_eq!(normalize_query("?!... --"), "");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_non_ascii_letters_are_stripped() {
        assert_eq!(normalize_query("café Über"), "ber_caf");
    }

    #[test]
    fn test_key_namespaces() {
        assert_eq!(embedding_key("course_python"), "emb:course_python");
        assert_eq!(similarity_key("course_python"), "weaviate:similarity:course_python");
        assert_eq!(page_key("intro-to-python"), "page:course:intro-to-python");
        assert_eq!(navigation_key("abc"), "session:abc:nav");
        assert_eq!(session_lock_key("abc"), "lock:session:abc");
    }
}
