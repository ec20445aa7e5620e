//! Source pre-filter: textual denylist scan of raw document text
//!
//! Runs before structural parsing, so it still sees text that would never
//! parse. It is a coarse first pass: the policy enforcer and the attribute
//! validator check the parsed structure independently.

use std::sync::LazyLock;

use regex::Regex;

use crate::ValidationResult;

/// Denylisted category with the pattern that detects it
struct ForbiddenPattern {
    category: &'static str,
    regex: Regex,
}

static FORBIDDEN_PATTERNS: LazyLock<Vec<ForbiddenPattern>> = LazyLock::new(|| {
    [
        (
            "network access",
            r"\b(?:fetch|axios)\s*\(|\bXMLHttpRequest\b|\bWebSocket\b|\bEventSource\b|\bsendBeacon\b",
        ),
        ("external script", r"(?i)<script\b[^>]*\bsrc\s*="),
        (
            "import",
            r#"\bimport\s+[^;\n]*?\bfrom\s*['"][^'"]*['"]|\bimport\s*\(|\brequire\s*\("#,
        ),
        (
            "dynamic code",
            r"\beval\s*\(|\bnew\s+Function\b|\bFunction\s*\(|\bset(?:Timeout|Interval)\s*\(",
        ),
        (
            "host global access",
            r"\b(?:window|document|globalThis)\s*\.|\b(?:localStorage|sessionStorage|indexedDB)\b",
        ),
        (
            "filesystem/process access",
            r"\b(?:process|global)\s*\.|\b__dirname\b|\b__filename\b|\bchild_process\b",
        ),
    ]
    .into_iter()
    .map(|(category, pattern)| ForbiddenPattern {
        category,
        regex: Regex::new(pattern).expect("forbidden pattern is valid"),
    })
    .collect()
});

/// Scan raw document text against every denylisted category
///
/// Each category reports at most once (its first match) and scanning
/// always continues through the full list.
pub fn scan(text: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    for pattern in FORBIDDEN_PATTERNS.iter() {
        if let Some(found) = pattern.regex.find(text) {
            tracing::debug!(category = pattern.category, "pre-filter match");
            result.add(format!(
                "Forbidden pattern detected ({}): {}",
                pattern.category,
                found.as_str().trim()
            ));
        }
    }
    result
}

/// Category names in scan order
pub fn categories() -> Vec<&'static str> {
    FORBIDDEN_PATTERNS.iter().map(|p| p.category).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_document_passes() {
        let result = scan(r#"<Toggle name="showFilters" value="true" /><Chart source="sales" />"#);
        assert!(result.valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_fetch_is_network_access() {
        let result = scan("<script>fetch('/x')</script>");
        assert!(!result.valid);
        assert_eq!(
            result.violations,
            vec!["Forbidden pattern detected (network access): fetch("]
        );
    }

    #[test]
    fn test_collects_every_category() {
        let text = r#"<script src="http://evil"></script>
<script>
import x from 'y';
eval(code);
window.location = 'z';
process.exit(1);
new WebSocket('ws://a');
</script>"#;
        let result = scan(text);
        assert_eq!(result.violations.len(), 6);
        for (violation, category) in result.violations.iter().zip(categories()) {
            assert!(
                violation.contains(&format!("({})", category)),
                "expected {} in {}",
                category,
                violation
            );
        }
    }

    #[test]
    fn test_category_reported_once() {
        let result = scan("eval(a); eval(b); setTimeout(c)");
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn test_word_boundaries() {
        // Identifiers that merely contain a denylisted word are not flagged
        let result = scan(r#"<Chart title="prefetch(ish) medieval(times)" source="documents" />"#);
        assert!(result.valid, "{:?}", result.violations);
    }

    #[test]
    fn test_document_access_detected() {
        let result = scan("{document.cookie}");
        assert!(result.violations[0].contains("host global access"));
    }
}
