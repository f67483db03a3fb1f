use crate::UrlError;
use url::Url;

/// Schemes that never lead to a fetchable resource
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "about:", "blob:"];

/// Normalizes an absolute URL for crawling and deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Require a host
/// 4. Remove the fragment (everything after #)
///
/// Host lowercasing and dot-segment removal are done by the parser.
///
/// # Examples
///
/// ```
/// use trawler::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM/a/../b#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/b");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    finish(url)
}

/// Resolves a possibly relative reference against `base` and normalizes it
///
/// Returns `None` for empty references and non-fetchable schemes
/// (`javascript:`, `mailto:`, `tel:`, `data:` ...).
pub fn resolve_url(base: &Url, reference: &str) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lower = reference.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return None;
    }

    let joined = base.join(reference).ok()?;
    finish(joined).ok()
}

fn finish(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Last non-empty path segment, percent-decoded where possible
pub fn last_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/gallery/index.html").unwrap()
    }

    #[test]
    fn test_removes_fragment() {
        let url = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            normalize_url("ftp://example.com/file"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_resolve_relative() {
        let url = resolve_url(&base(), "photo.jpg").unwrap();
        assert_eq!(url.as_str(), "https://example.com/gallery/photo.jpg");

        let url = resolve_url(&base(), "/root.png").unwrap();
        assert_eq!(url.as_str(), "https://example.com/root.png");

        let url = resolve_url(&base(), "//cdn.example.com/v.mp4").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/v.mp4");
    }

    #[test]
    fn test_resolve_skips_non_fetchable() {
        assert!(resolve_url(&base(), "javascript:void(0)").is_none());
        assert!(resolve_url(&base(), "MAILTO:a@b.c").is_none());
        assert!(resolve_url(&base(), "data:image/png;base64,AAAA").is_none());
        assert!(resolve_url(&base(), "#top").is_none());
        assert!(resolve_url(&base(), "   ").is_none());
    }

    #[test]
    fn test_last_segment() {
        let url = Url::parse("https://example.com/media/My%20Clip.mp4?x=1").unwrap();
        assert_eq!(last_segment(&url).as_deref(), Some("My Clip.mp4"));

        let url = Url::parse("https://example.com/dir/").unwrap();
        assert_eq!(last_segment(&url).as_deref(), Some("dir"));

        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(last_segment(&url), None);
    }

    #[test]
    fn test_last_segment_keeps_undecodable_input() {
        let url = Url::parse("https://example.com/raw/%FF%FEclip.mp4").unwrap();
        assert_eq!(last_segment(&url).as_deref(), Some("%FF%FEclip.mp4"));

        let url = Url::parse("https://example.com/caf%C3%A9.jpg").unwrap();
        assert_eq!(last_segment(&url).as_deref(), Some("café.jpg"));
    }
}
