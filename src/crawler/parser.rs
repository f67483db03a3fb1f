//! HTML parser for extracting links and asset candidates
//!
//! Parsing is synchronous and produces owned data only. The parsed document
//! is dropped before the crawler resumes any async work.

use crate::assets::{extract_candidate, AssetCandidate};
use crate::crawler::selector::CompiledSelectors;
use crate::url::resolve_url;
use scraper::{Html, Selector};
use url::Url;

/// Attributes probed, in order, for a link target when the selector names none
const LINK_ATTRIBUTES: &[&str] = &["href", "data-href", "src"];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Links matched by the job's link selectors (absolute URLs)
    pub links: Vec<Url>,

    /// Assets matched by the job's asset selectors
    pub assets: Vec<AssetCandidate>,
}

/// Parses a page and runs a job's selectors against it
///
/// # Ordering
///
/// Selectors run in the order they were declared; matches of one selector
/// come out in document order. A `<base href>` in the document replaces
/// `page_url` for resolving relative references.
///
/// # Example
///
/// ```
/// use trawler::crawler::{parse_page, CompiledSelectors};
/// use trawler::state::{Selector, SelectorPurpose};
/// use url::Url;
///
/// let selectors = CompiledSelectors::compile(&[
///     Selector::css("a.next", SelectorPurpose::Links),
///     Selector::css("img", SelectorPurpose::Assets),
/// ]).unwrap();
/// let html = r#"<a class="next" href="/p/2">next</a><img src="cat.jpg">"#;
/// let page = parse_page(html, &Url::parse("https://example.com/p/1").unwrap(), &selectors);
/// assert_eq!(page.links[0].as_str(), "https://example.com/p/2");
/// assert_eq!(page.assets[0].url.as_str(), "https://example.com/p/cat.jpg");
/// ```
pub fn parse_page(html: &str, page_url: &Url, selectors: &CompiledSelectors) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);

    let mut page = ParsedPage::default();

    for selector in selectors.links() {
        for element in document.select(&selector.selector) {
            let node = element.value();
            let target = match &selector.attribute {
                Some(attr) => node.attr(attr),
                None => LINK_ATTRIBUTES.iter().find_map(|a| node.attr(a)),
            };
            if let Some(url) = target.and_then(|t| resolve_url(&base, t)) {
                page.links.push(url);
            }
        }
    }

    for selector in selectors.assets() {
        for element in document.select(&selector.selector) {
            if let Some(candidate) = extract_candidate(
                element,
                &base,
                selector.attribute.as_deref(),
                selectors.metadata(),
            ) {
                page.assets.push(candidate);
            }
        }
    }

    page
}

/// The document's `<base href>`, resolved against the page URL
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}
