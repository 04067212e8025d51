//! The batch of canvases being edited together, plus the shared asset library.

use log::{debug, info};

use crate::assets::{AssetLibrary, UploadInfo, UploadedAsset};
use crate::canvas::{needs_release, AddOutcome, Canvas, MainImage};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::objects::WatermarkDraft;

#[derive(Clone, Debug, PartialEq, Default)]
pub struct AssetRemoval {
    /// `(canvas id, watermark id)` for every watermark the asset backed.
    pub removed_watermarks: Vec<(u32, u32)>,
    pub released: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Session {
    canvases: Vec<Canvas>,
    active: Option<u32>,
    next_canvas_id: u32,
    pub assets: AssetLibrary,
}

impl Session {
    pub fn new() -> Self {
        Session { next_canvas_id: 1, ..Default::default() }
    }

    /// Rebuilds a session from persisted canvases. The first becomes active.
    pub fn from_canvases(canvases: Vec<Canvas>) -> Self {
        let next_canvas_id = canvases.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let active = canvases.first().map(|c| c.id);
        Session { canvases, active, next_canvas_id, assets: AssetLibrary::new() }
    }

    /// Swaps in a set of canvases (undo/redo, snapshot load), keeping the
    /// asset library. Ids keep growing past anything ever handed out.
    pub fn replace_canvases(&mut self, canvases: Vec<Canvas>, active: Option<u32>) {
        let max_id = canvases.iter().map(|c| c.id).max().unwrap_or(0);
        self.next_canvas_id = self.next_canvas_id.max(max_id + 1);
        self.active = active.filter(|id| canvases.iter().any(|c| c.id == *id)).or_else(|| canvases.first().map(|c| c.id));
        self.canvases = canvases;
    }

    pub fn canvases(&self) -> &[Canvas] {
        &self.canvases
    }

    pub fn canvas(&self, id: u32) -> Option<&Canvas> {
        self.canvases.iter().find(|c| c.id == id)
    }

    pub fn canvas_mut(&mut self, id: u32) -> Option<&mut Canvas> {
        self.canvases.iter_mut().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<u32> {
        self.active
    }

    pub fn active(&self) -> Option<&Canvas> {
        self.canvas(self.active?)
    }

    pub fn active_mut(&mut self) -> Option<&mut Canvas> {
        let id = self.active?;
        self.canvas_mut(id)
    }

    pub fn set_active(&mut self, id: u32) -> bool {
        if self.canvas(id).is_some() {
            debug!("active canvas -> {}", id);
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    fn push(&mut self, canvas: Canvas) -> u32 {
        let id = canvas.id;
        self.canvases.push(canvas);
        self.active = Some(id);
        id
    }

    fn fresh_canvas_id(&mut self) -> u32 {
        let id = self.next_canvas_id.max(1);
        self.next_canvas_id = id + 1;
        id
    }

    pub fn add_canvas(&mut self) -> u32 {
        let id = self.fresh_canvas_id();
        self.push(Canvas::new(id))
    }

    pub fn add_canvas_from_image(&mut self, image: MainImage) -> u32 {
        let id = self.fresh_canvas_id();
        self.push(Canvas::with_background_image(id, image))
    }

    /// Removes a canvas; returns the URLs it owned that may now be released.
    pub fn remove_canvas(&mut self, id: u32) -> Option<Vec<String>> {
        let idx = self.canvases.iter().position(|c| c.id == id)?;
        let removed = self.canvases.remove(idx);
        if self.active == Some(id) {
            let next = idx.min(self.canvases.len().saturating_sub(1));
            self.active = self.canvases.get(next).map(|c| c.id);
        }
        info!("removed canvas {}", id);
        let still_referenced = |url: &String| {
            self.canvases.iter().any(|c| c.owned_urls().contains(url))
                || self.assets.iter().any(|a| &a.url == url)
        };
        Some(removed.owned_urls().into_iter().filter(|u| !still_referenced(u)).collect())
    }

    pub fn add_asset(&mut self, asset: UploadedAsset, upload: &UploadInfo, config: &EngineConfig) -> Result<()> {
        self.assets.register(asset, upload, config)
    }

    /// Places an uploaded asset on a canvas as an image watermark.
    pub fn place_asset(&mut self, canvas_id: u32, asset_id: &str, config: &EngineConfig) -> Option<AddOutcome> {
        let asset = self.assets.get(asset_id)?.clone();
        let canvas = self.canvas_mut(canvas_id)?;
        let draft = WatermarkDraft::image(asset.url, Some(asset.name), Some(asset.id));
        Some(canvas.add_watermark(draft, config))
    }

    /// Deletes an asset and every watermark, on every canvas, that it backs.
    pub fn remove_asset(&mut self, asset_id: &str) -> Option<AssetRemoval> {
        let asset = self.assets.remove(asset_id)?;
        let mut removal = AssetRemoval::default();
        for canvas in &mut self.canvases {
            for watermark in canvas.remove_watermarks_for_asset(asset_id) {
                removal.removed_watermarks.push((canvas.id, watermark));
            }
        }
        let in_use = self.canvases.iter().any(|c| c.owned_urls().contains(&asset.url));
        if needs_release(&asset.url) && !in_use {
            removal.released = Some(asset.url);
        }
        info!("removed asset {} and {} watermark(s)", asset_id, removal.removed_watermarks.len());
        Some(removal)
    }
}
