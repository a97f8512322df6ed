//! Backend address helpers
//!
//! Addresses are compared case-insensitively with trailing slashes removed.
//! The first spelling seen is the one kept.

use std::collections::HashSet;

/// Trim whitespace and trailing slashes
pub fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Comparison key for deduplication and pool membership checks
pub fn address_key(raw: &str) -> String {
    normalize_base(raw).to_ascii_lowercase()
}

pub fn same_address(a: &str, b: &str) -> bool {
    address_key(a) == address_key(b)
}

/// Parse a comma-separated node list, dropping empty entries
pub fn parse_nodes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_base)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Concatenate node lists, normalize, drop empties and duplicates.
/// Order follows first occurrence.
pub fn uniq_nodes<'a, I>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in parts {
        for node in part {
            let normalized = normalize_base(node);
            if normalized.is_empty() {
                continue;
            }
            if seen.insert(address_key(&normalized)) {
                out.push(normalized);
            }
        }
    }
    out
}

/// Parse an integer the way the host UI does: anything non-numeric yields
/// `default`, otherwise the value is floored and clamped into `[min, max]`.
pub fn clamp_int(raw: Option<&str>, min: i64, max: i64, default: i64) -> i64 {
    let parsed = raw
        .map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite());

    match parsed {
        Some(v) => (v.floor() as i64).clamp(min, max),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_trailing_slash() {
        assert_eq!(normalize_base("  https://a.example/ "), "https://a.example");
        assert_eq!(normalize_base("https://a.example//"), "https://a.example");
        assert_eq!(normalize_base(""), "");
    }

    #[test]
    fn test_same_address_ignores_case_and_slash() {
        assert!(same_address("https://A.example/", "https://a.example"));
        assert!(!same_address("https://a.example", "https://b.example"));
    }

    #[test]
    fn test_parse_nodes() {
        assert_eq!(
            parse_nodes("https://a.example/, ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_nodes("  ").is_empty());
    }

    #[test]
    fn test_uniq_nodes_keeps_first_occurrence() {
        let first = vec!["https://B.example/".to_string(), "https://a.example".to_string()];
        let second = vec!["https://b.example".to_string(), "https://c.example".to_string()];
        let merged = uniq_nodes([first.as_slice(), second.as_slice()]);
        assert_eq!(
            merged,
            vec![
                "https://B.example".to_string(),
                "https://a.example".to_string(),
                "https://c.example".to_string(),
            ]
        );
    }

    #[test]
    fn test_clamp_int() {
        assert_eq!(clamp_int(Some("900"), 200, 10_000, 650), 900);
        assert_eq!(clamp_int(Some("50"), 200, 10_000, 650), 200);
        assert_eq!(clamp_int(Some("99999"), 200, 10_000, 650), 10_000);
        assert_eq!(clamp_int(Some("512.9"), 200, 10_000, 650), 512);
        assert_eq!(clamp_int(Some("abc"), 200, 10_000, 650), 650);
        assert_eq!(clamp_int(None, 200, 10_000, 650), 650);
    }
}
