//! Uploaded image assets. The upload collaborator owns their lifetime; the
//! engine only validates incoming uploads and reads their URLs.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, StudioError};

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct UploadedAsset {
    pub id: String,
    pub url: String,
    pub name: String,
}

/// What the host knows about a file before it becomes an asset.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

pub fn validate_upload(info: &UploadInfo, config: &EngineConfig) -> Result<()> {
    if !config.allowed_mime_types.iter().any(|m| m.eq_ignore_ascii_case(&info.mime_type)) {
        return Err(StudioError::Validation(format!(
            "File {} is not a supported image type. Please use PNG, JPG, JPEG, GIF or SVG.",
            info.name
        )));
    }
    if info.size_bytes > config.max_upload_bytes {
        return Err(StudioError::Validation(format!(
            "File {} is too large. Maximum size is {}MB.",
            info.name,
            config.max_upload_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AssetLibrary {
    assets: Vec<UploadedAsset>,
}

impl AssetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers an upload. Re-registering an id replaces it.
    pub fn register(&mut self, asset: UploadedAsset, info: &UploadInfo, config: &EngineConfig) -> Result<()> {
        validate_upload(info, config)?;
        match self.assets.iter_mut().find(|a| a.id == asset.id) {
            Some(existing) => *existing = asset,
            None => self.assets.push(asset),
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&UploadedAsset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<UploadedAsset> {
        let idx = self.assets.iter().position(|a| a.id == id)?;
        Some(self.assets.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadedAsset> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
