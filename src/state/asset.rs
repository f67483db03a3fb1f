use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Coarse media class of a downloaded asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Video,
    Image,
    Audio,
    Document,
    #[default]
    Unknown,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered item and the outcome of downloading it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub size: u64,
    pub local_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub downloaded: bool,
    /// Last failure, empty when none
    #[serde(default)]
    pub error: String,
}

impl Asset {
    /// Creates a fresh, not yet downloaded asset for `url`
    pub fn new(url: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            asset_type,
            ..Default::default()
        }
    }
}
