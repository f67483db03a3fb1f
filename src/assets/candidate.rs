//! Turning a matched element into an asset candidate
//!
//! Everything here runs synchronously against the parsed document, so the
//! document never has to outlive the parse step.

use crate::crawler::CompiledSelector;
use crate::url::{last_segment, resolve_url};
use scraper::ElementRef;
use std::collections::BTreeMap;
use url::Url;

/// Attributes probed, in order, for an asset's source URL
pub const SOURCE_ATTRIBUTES: &[&str] = &[
    "src",
    "data-src",
    "href",
    "data-href",
    "data-original",
    "poster",
    "content",
];

/// Element attributes copied into the asset's metadata map
const DESCRIPTIVE_ATTRIBUTES: &[&str] = &["alt", "title"];

/// Data gathered for an asset before it is processed
#[derive(Debug, Clone, PartialEq)]
pub struct AssetCandidate {
    pub url: Url,
    pub title: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

/// Builds a candidate from a matched element
///
/// Returns `None` when the element carries no usable source URL.
///
/// # Arguments
///
/// * `element` - The element matched by an assets selector
/// * `base` - Base URL for resolving relative references
/// * `attribute` - Attribute named by the selector itself, if any
/// * `metadata` - The job's metadata selectors, scoped to the element's parent
pub fn extract_candidate(
    element: ElementRef<'_>,
    base: &Url,
    attribute: Option<&str>,
    metadata: &[CompiledSelector],
) -> Option<AssetCandidate> {
    let url = source_url(element, base, attribute)?;

    let container = element
        .parent()
        .and_then(ElementRef::wrap)
        .unwrap_or(element);

    let mut map = BTreeMap::new();
    let mut texts = Vec::new();
    for selector in metadata {
        let Some(found) = container.select(&selector.selector).next() else {
            continue;
        };
        let value = match &selector.attribute {
            Some(attr) => found.value().attr(attr).map(collapse_whitespace),
            None => Some(element_text(found)),
        };
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            map.insert(selector.query.clone(), value.clone());
            texts.push(value);
        }
    }

    for attr in DESCRIPTIVE_ATTRIBUTES {
        if let Some(value) = element.value().attr(attr).map(collapse_whitespace) {
            if !value.is_empty() {
                map.insert((*attr).to_string(), value);
            }
        }
    }

    let mut texts = texts.into_iter();
    let title = texts
        .next()
        .or_else(|| last_segment(&url))
        .unwrap_or_else(|| url.host_str().unwrap_or_default().to_string());
    let description = texts.next().unwrap_or_default();

    Some(AssetCandidate {
        url,
        title,
        description,
        metadata: map,
    })
}

/// First present source attribute, falling back to a nested `<source>`
fn source_url(element: ElementRef<'_>, base: &Url, attribute: Option<&str>) -> Option<Url> {
    let node = element.value();

    if let Some(attr) = attribute {
        return node.attr(attr).and_then(|v| resolve_url(base, v));
    }

    for attr in SOURCE_ATTRIBUTES {
        if let Some(value) = node.attr(attr).filter(|v| !v.trim().is_empty()) {
            return resolve_url(base, value);
        }
    }

    let nested = scraper::Selector::parse("source[src]").ok()?;
    element
        .select(&nested)
        .next()
        .and_then(|source| source.value().attr("src"))
        .and_then(|v| resolve_url(base, v))
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
