//! HTML extraction: the record on a detail page and the outbound links.

use std::collections::BTreeSet;

use scraper::{Html, Selector};
use url::Url;

use crate::canonical;
use crate::types::BookRecord;

/// Link suffixes and path fragments that never lead to content.
const SKIPPED_LINK_PARTS: &[&str] = &[
    "/static/", ".css", ".js", ".ico", ".jpg", ".png",
];

/// Category/listing pages: never yield a detail record.
pub fn is_category_page(url: &str) -> bool {
    url.contains("/category/") || url.contains("index.html") || url.contains("page-")
}

/// Detail pages under the catalogue that are not listings.
pub fn is_detail_page(url: &str) -> bool {
    url.contains("/catalogue/") && url.contains(".html") && !is_category_page(url)
}

/// Extract the record from a page. Listing and category pages yield an empty
/// record; detail pages yield whatever the selectors find, with missing
/// fields left empty.
pub fn extract_record(html: &str, url: &str) -> BookRecord {
    if !is_detail_page(url) {
        return BookRecord::default();
    }

    let document = Html::parse_document(html);
    let mut record = BookRecord {
        url: url.to_string(),
        ..BookRecord::default()
    };

    if let Ok(selector) = Selector::parse("h1") {
        if let Some(element) = document.select(&selector).next() {
            record.title = element.text().collect::<String>().trim().to_string();
        }
    }

    if let Ok(selector) = Selector::parse("p.price_color") {
        if let Some(element) = document.select(&selector).next() {
            record.price = element.text().collect::<String>().trim().to_string();
        }
    }

    if let Ok(selector) = Selector::parse("p.star-rating") {
        if let Some(element) = document.select(&selector).next() {
            record.rating = element
                .value()
                .classes()
                .find(|class| {
                    matches!(*class, "One" | "Two" | "Three" | "Four" | "Five")
                })
                .unwrap_or("Unknown")
                .to_string();
        }
    }

    record
}

/// Extract all crawlable links from a page: anchors resolved against the
/// base URL, filtered to the crawl host, with static resources and malformed
/// concatenations dropped. Deduplicated and returned in sorted order.
pub fn extract_links(html: &str, base_url: &str, crawl_host: &str) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut links = BTreeSet::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }

        let link = resolved.to_string();
        if SKIPPED_LINK_PARTS.iter().any(|part| link.contains(part)) {
            continue;
        }
        if !canonical::is_valid(&link) {
            continue;
        }
        if canonical::canonical_host(&link) != canonical::crawl_host(crawl_host) {
            continue;
        }

        links.insert(link);
    }

    links.into_iter().collect()
}
