//! URL canonicalization and sanitization
//!
//! The canonical form is the identity key for all deduplication: lowercase,
//! scheme-less, `www.`-less, fragment-free, query-free (unless the URL is a
//! search or filter view), with no trailing slash. It is a plain string, not
//! a parsed URL: the scheme-less form is not representable as a `url::Url`.

/// Canonicalize a URL for deduplication.
///
/// Idempotent: `canonicalize(canonicalize(u)) == canonicalize(u)`.
pub fn canonicalize(url: &str) -> String {
    let mut result = url.trim().to_lowercase();

    if let Some(pos) = result.find("://") {
        result.drain(..pos + 3);
    }

    if let Some(stripped) = result.strip_prefix("www.") {
        result = stripped.to_string();
    }

    if let Some(pos) = result.find('#') {
        result.truncate(pos);
    }

    // Query parameters identify distinct pages only on search/filter views.
    if let Some(pos) = result.find('?') {
        if !result.contains("search") && !result.contains("filter") {
            result.truncate(pos);
        }
    }

    while result.ends_with('/') {
        result.pop();
    }

    result
}

/// Extract the host part of a URL: the text between `://` and the next `/`.
pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}

/// Normalize a crawl hostname for comparison (lowercase, `www.`-less).
pub fn crawl_host(host: &str) -> String {
    let lower = host.trim().to_lowercase();
    lower.strip_prefix("www.").unwrap_or(&lower).to_string()
}

/// Host of a URL in comparison form.
pub fn canonical_host(url: &str) -> String {
    crawl_host(host_of(url))
}

/// Repair malformed URLs seen in the wild: a spurious leading `m` glued onto
/// the scheme, or a page host concatenated with an absolute link
/// (`…books.toscrape.comhttp://…`). Returns the input unchanged when no
/// repair applies.
pub fn repair(url: &str) -> String {
    let mut fixed = url.trim().to_string();

    if fixed.starts_with("mhttp://") || fixed.starts_with("mhttps://") {
        fixed.remove(0);
    }

    // Keep the innermost absolute URL when a second scheme is embedded.
    if let Some(pos) = fixed.rfind("https://").filter(|&p| p > 0) {
        fixed.drain(..pos);
    } else if let Some(pos) = fixed.rfind("http://").filter(|&p| p > 0) {
        fixed.drain(..pos);
    }

    fixed
}

/// Check that a URL is an absolute http(s) URL with exactly one scheme.
pub fn is_valid(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let rest = match url.strip_prefix("http://").or_else(|| url.strip_prefix("https://")) {
        Some(r) => r,
        None => return false,
    };
    !rest.is_empty() && !rest.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_matrix() {
        assert_eq!(
            canonicalize("HTTP://WWW.Books.Toscrape.Com/a/"),
            "books.toscrape.com/a"
        );
        assert_eq!(
            canonicalize("http://books.toscrape.com/a/?utm=x"),
            "books.toscrape.com/a"
        );
        assert_eq!(
            canonicalize("http://books.toscrape.com/s?search=q"),
            "books.toscrape.com/s?search=q"
        );
        assert_eq!(
            canonicalize("http://books.toscrape.com/a#frag"),
            "books.toscrape.com/a"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let inputs = [
            "HTTP://WWW.Books.Toscrape.Com/a/",
            "http://books.toscrape.com/a/?utm=x",
            "http://books.toscrape.com/s?search=q",
            "http://books.toscrape.com/a#frag",
            "https://books.toscrape.com/",
            "books.toscrape.com",
            "",
        ];
        for input in inputs {
            let once = canonicalize(input);
            assert_eq!(canonicalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn canonicalize_keeps_filter_queries() {
        assert_eq!(
            canonicalize("http://books.toscrape.com/list?filter=price"),
            "books.toscrape.com/list?filter=price"
        );
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://books.toscrape.com/a/b"), "books.toscrape.com");
        assert_eq!(host_of("http://example.com"), "example.com");
        assert_eq!(host_of("example.com/path"), "example.com");
        assert_eq!(canonical_host("HTTP://WWW.Example.COM/x"), "example.com");
    }

    #[test]
    fn repair_strips_leading_m() {
        assert_eq!(
            repair("mhttp://books.toscrape.com/a"),
            "http://books.toscrape.com/a"
        );
    }

    #[test]
    fn repair_cuts_concatenated_host() {
        assert_eq!(
            repair("http://books.toscrape.comhttp://books.toscrape.com/cat.html"),
            "http://books.toscrape.com/cat.html"
        );
        assert_eq!(
            repair("http://books.toscrape.comhttps://books.toscrape.com/x"),
            "https://books.toscrape.com/x"
        );
    }

    #[test]
    fn repair_leaves_clean_urls_alone() {
        assert_eq!(
            repair("http://books.toscrape.com/index.html"),
            "http://books.toscrape.com/index.html"
        );
    }

    #[test]
    fn validity() {
        assert!(is_valid("http://books.toscrape.com/"));
        assert!(is_valid("https://books.toscrape.com/a.html"));
        assert!(!is_valid(""));
        assert!(!is_valid("books.toscrape.com"));
        assert!(!is_valid("http://http://x"));
        assert!(!is_valid("http://books.toscrape.comhttp://x"));
    }
}
