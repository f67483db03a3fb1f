use crate::state::AssetType;
use url::Url;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "webm", "mkv", "mov", "avi", "wmv", "flv", "mpeg", "mpg", "3gp", "m3u8", "mpd",
];
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "avif", "tif", "tiff", "ico", "heic",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "oga", "flac", "aac", "m4a", "opus", "wma"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf", "txt", "csv",
    "epub",
];

/// Keyword heuristics, checked in order when the extension says nothing
const KEYWORDS: &[(AssetType, &[&str])] = &[
    (
        AssetType::Video,
        &["video", "/watch", "/embed/", "youtube.com", "vimeo.com", "movie", "clip"],
    ),
    (
        AssetType::Audio,
        &["audio", "podcast", "sound", "music", "/track"],
    ),
    (
        AssetType::Image,
        &["image", "/img/", "/images/", "photo", "picture", "/pics/"],
    ),
    (
        AssetType::Document,
        &["document", "/docs/", "/files/", "attachment", "download"],
    ),
];

/// Classifies an asset from its URL
///
/// The file extension decides first, then URL keywords, then `Unknown`.
///
/// # Examples
///
/// ```
/// use trawler::assets::classify;
/// use trawler::AssetType;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/a/clip.MP4?sig=1").unwrap();
/// assert_eq!(classify(&url), AssetType::Video);
/// ```
pub fn classify(url: &Url) -> AssetType {
    if let Some(asset_type) = extension(url).and_then(|ext| by_extension(&ext)) {
        return asset_type;
    }

    let lower = url.as_str().to_ascii_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(asset_type, _)| *asset_type)
        .unwrap_or(AssetType::Unknown)
}

fn extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let (_, ext) = segment.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

fn by_extension(ext: &str) -> Option<AssetType> {
    [
        (AssetType::Video, VIDEO_EXTENSIONS),
        (AssetType::Image, IMAGE_EXTENSIONS),
        (AssetType::Audio, AUDIO_EXTENSIONS),
        (AssetType::Document, DOCUMENT_EXTENSIONS),
    ]
    .into_iter()
    .find(|(_, exts)| exts.contains(&ext))
    .map(|(asset_type, _)| asset_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_str(s: &str) -> AssetType {
        classify(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_by_extension() {
        assert_eq!(classify_str("https://x.com/a.webm"), AssetType::Video);
        assert_eq!(classify_str("https://x.com/a.JPEG"), AssetType::Image);
        assert_eq!(classify_str("https://x.com/a.flac"), AssetType::Audio);
        assert_eq!(classify_str("https://x.com/report.pdf"), AssetType::Document);
    }

    #[test]
    fn test_extension_beats_keywords() {
        assert_eq!(
            classify_str("https://x.com/videos/poster.png"),
            AssetType::Image
        );
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(classify_str("https://x.com/watch?v=abc"), AssetType::Video);
        assert_eq!(classify_str("https://x.com/podcast/42"), AssetType::Audio);
        assert_eq!(classify_str("https://x.com/photo/7"), AssetType::Image);
        assert_eq!(classify_str("https://x.com/download?id=9"), AssetType::Document);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify_str("https://x.com/item/9"), AssetType::Unknown);
        assert_eq!(classify_str("https://x.com/archive.xyz"), AssetType::Unknown);
    }
}
