//! Over-purge detection.
//!
//! The production build removes rules whose selectors it cannot find in
//! markup. Selectors built dynamically are easy to lose that way, so the
//! removed content is scanned for a fixed set of critical prefixes.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::StageError;

/// Selectors in `removed` that start with one of `prefixes`, sorted and deduplicated.
pub fn find_critical_selectors(
    removed: &str,
    prefixes: &[String],
) -> Result<Vec<String>, StageError> {
    if prefixes.is_empty() {
        return Ok(Vec::new());
    }
    let alternation = prefixes
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"(?:{})[\w-]*", alternation))
        .map_err(|e| StageError::Parse(format!("invalid critical prefix: {}", e)))?;

    let found: BTreeSet<String> = pattern
        .find_iter(removed)
        .map(|m| m.as_str().to_string())
        .collect();
    Ok(found.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CRITICAL_PREFIXES;

    fn prefixes() -> Vec<String> {
        CRITICAL_PREFIXES.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_finds_prefixed_selectors() {
        let removed = "Removed: .hero-title, .navbar .nav-link:hover, .btn, .footer";
        let found = find_critical_selectors(removed, &prefixes()).expect("scan");
        assert_eq!(found, vec![".btn", ".hero-title", ".nav-link", ".navbar"]);
    }

    #[test]
    fn test_nothing_critical() {
        let found = find_critical_selectors(".footer .sidebar", &prefixes()).expect("scan");
        assert!(found.is_empty());
        assert!(find_critical_selectors(".hero", &[]).expect("scan").is_empty());
    }

    #[test]
    fn test_prefix_is_escaped() {
        let found = find_critical_selectors("xhero .hero", &prefixes()).expect("scan");
        assert_eq!(found, vec![".hero"]);
    }
}
