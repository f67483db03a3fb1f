use crate::UrlError;
use regex::Regex;

/// Include/exclude constraint on followed URLs
///
/// Both patterns are regular expressions searched anywhere in the URL. An
/// empty pattern places no constraint. A URL matching the exclude pattern is
/// always rejected, even when it also matches the include pattern.
///
/// # Examples
///
/// ```
/// use trawler::url::UrlFilter;
///
/// let filter = UrlFilter::new(r"/gallery/", r"\.pdf$").unwrap();
/// assert!(filter.allows("https://example.com/gallery/1"));
/// assert!(!filter.allows("https://example.com/gallery/1.pdf"));
/// assert!(!filter.allows("https://example.com/blog/1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl UrlFilter {
    pub fn new(include: &str, exclude: &str) -> Result<Self, UrlError> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Checks whether `url` may be followed
    pub fn allows(&self, url: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(url) {
                return false;
            }
        }

        match &self.include {
            Some(include) => include.is_match(url),
            None => true,
        }
    }
}

fn compile(pattern: &str) -> Result<Option<Regex>, UrlError> {
    if pattern.trim().is_empty() {
        return Ok(None);
    }

    Regex::new(pattern)
        .map(Some)
        .map_err(|e| UrlError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patterns_allow_everything() {
        let filter = UrlFilter::new("", "").unwrap();
        assert!(filter.allows("https://example.com/anything"));
    }

    #[test]
    fn test_include_only() {
        let filter = UrlFilter::new(r"example\.com/photos", "").unwrap();
        assert!(filter.allows("https://example.com/photos/2"));
        assert!(!filter.allows("https://example.com/about"));
    }

    #[test]
    fn test_exclude_only() {
        let filter = UrlFilter::new("", r"logout|\?sort=").unwrap();
        assert!(filter.allows("https://example.com/photos"));
        assert!(!filter.allows("https://example.com/logout"));
        assert!(!filter.allows("https://example.com/photos?sort=asc"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = UrlFilter::new("photos", "private").unwrap();
        assert!(!filter.allows("https://example.com/photos/private/1"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = UrlFilter::new("(unclosed", "").unwrap_err();
        assert!(matches!(err, UrlError::InvalidPattern { .. }));
    }
}
