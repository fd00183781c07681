//! File-name slugs and archive entry names.
//!
//! Entry names are derived from the document's file name so an archive of
//! `Annual Report (2023).pdf` reads `annual-report-2023-001.png`, … .

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Base name used when a file name slugs down to nothing.
pub const FALLBACK_BASE_NAME: &str = "document";

static RE_NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[^a-z0-9\s-]").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Turn free text into a lowercase, hyphenated, URL-friendly slug.
///
/// Characters outside `[a-z0-9]`, whitespace and `-` are removed, whitespace
/// runs become a single `-`, and leading/trailing hyphens are trimmed.
/// Returns [`FALLBACK_BASE_NAME`] if nothing survives.
pub fn slugify(input: &str) -> String {
    let stripped = RE_NON_SLUG.replace_all(input, "");
    let hyphenated = RE_WHITESPACE.replace_all(stripped.trim(), "-");
    let slug = hyphenated.trim_matches('-').to_lowercase();
    if slug.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        slug
    }
}

/// Base name for a document path or URL segment: the file stem, slugged.
pub fn base_name_from_path(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    slugify(stem)
}

/// Archive entry name for the image at 0-based `index`.
pub fn entry_name(base_name: &str, index: usize, extension: &str) -> String {
    format!("{}-{:03}.{}", base_name, index + 1, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_and_hyphenates() {
        assert_eq!(slugify("Annual Report (2023)"), "annual-report-2023");
        assert_eq!(slugify("  Hello   World  "), "hello-world");
        assert_eq!(slugify("--already-slugged--"), "already-slugged");
        assert_eq!(slugify("Ünïcödé"), "ncd");
    }

    #[test]
    fn slugify_falls_back_when_empty() {
        assert_eq!(slugify("!!!"), FALLBACK_BASE_NAME);
        assert_eq!(slugify(""), FALLBACK_BASE_NAME);
    }

    #[test]
    fn base_name_uses_file_stem() {
        assert_eq!(base_name_from_path("/tmp/My Scan.PDF"), "my-scan");
        assert_eq!(base_name_from_path("report.v2.pdf"), "reportv2");
    }

    #[test]
    fn entry_names_are_one_based_and_padded() {
        assert_eq!(entry_name("doc", 0, "png"), "doc-001.png");
        assert_eq!(entry_name("doc", 41, "png"), "doc-042.png");
        assert_eq!(entry_name("doc", 1233, "png"), "doc-1234.png");
    }
}
