use futures::executor::block_on;
use log::{debug, warn};
use serde_json::json;
use wasm_bindgen::prelude::*;
use wasm_bindgen::Clamped;
use web_sys::{CanvasRenderingContext2d, ImageData};

use crate::canvas::{Canvas, Target};
use crate::config::EngineConfig;
use crate::error::{ResourceError, Result, StudioError};
use crate::export::{
    export_batch, export_canvas, requested_size, AssetFetcher, BatchEntry, ExportedImage, MemoryAssets,
};
use crate::fonts::FontBook;
use crate::io::{decode_data_url, is_data_url, png_data_url, snapshot_from_json, snapshot_to_json};
use crate::render::{hit_test, image_urls, render_preview, scene_nodes, ImageCache, PaintContext, PreviewOptions};
use crate::selection::{Interaction, PointerOutcome};
use crate::session::Session;
use crate::surface::Surface;
use crate::types::Point;

#[derive(Clone)]
pub struct EngineState {
    pub canvases: Vec<Canvas>,
    pub active: Option<u32>,
    pub action_name: String,
}

pub(crate) fn error_json(err: impl std::fmt::Display) -> String {
    json!({ "error": err.to_string() }).to_string()
}

#[wasm_bindgen]
pub struct StudioEngine {
    pub(crate) session: Session,
    pub(crate) interaction: Interaction,
    pub(crate) config: EngineConfig,
    pub(crate) fonts: FontBook,
    pub(crate) images: ImageCache,
    pub(crate) assets: MemoryAssets,
    pub(crate) preview: PreviewOptions,
    pub(crate) undo_stack: Vec<EngineState>,
    pub(crate) redo_stack: Vec<EngineState>,
    pub(crate) pending_releases: Vec<String>,
    drag_recorded: bool,
}

impl Default for StudioEngine {
    fn default() -> Self {
        StudioEngine::new()
    }
}

#[wasm_bindgen]
impl StudioEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> StudioEngine {
        console_error_panic_hook::set_once();

        let mut session = Session::new();
        session.add_canvas();
        StudioEngine {
            session,
            interaction: Interaction::new(),
            config: EngineConfig::default(),
            fonts: FontBook::with_fallback(),
            images: ImageCache::new(),
            assets: MemoryAssets::new(),
            preview: PreviewOptions::default(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            pending_releases: Vec::new(),
            drag_recorded: false,
        }
    }

    /// Replaces the configuration; fields left out keep their defaults.
    pub fn configure(&mut self, config_json: &str) -> String {
        match EngineConfig::from_json(config_json) {
            Ok(config) => {
                self.config = config;
                json!({ "success": true }).to_string()
            }
            Err(e) => error_json(e),
        }
    }

    pub fn register_font(&mut self, family: &str, data: &[u8]) -> String {
        match self.fonts.register(family, data.to_vec()) {
            Ok(()) => json!({ "success": true }).to_string(),
            Err(e) => error_json(e),
        }
    }

    /// Hands over the encoded bytes behind `url` for preview and export.
    pub fn provide_image(&mut self, url: &str, data: &[u8]) -> String {
        self.assets.insert(url, data.to_vec());
        match self.images.insert_bytes(url, data) {
            Ok(()) => json!({ "success": true }).to_string(),
            Err(e) => {
                warn!("image {} could not be decoded: {}", url, e);
                error_json(e)
            }
        }
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) -> String {
        let point = self.logical_point(x, y);
        let hit = self.hit(point);
        let Some(canvas) = self.session.active() else {
            return error_json("no active canvas");
        };
        let outcome = self.interaction.pointer_down(canvas, point, hit);
        if let PointerOutcome::DragStarted(_) = outcome {
            self.drag_recorded = false;
        }
        self.get_selection()
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) -> String {
        if !self.interaction.is_dragging() {
            return json!({ "moved": false }).to_string();
        }
        if !self.drag_recorded {
            self.save_state("Move");
            self.drag_recorded = true;
        }
        let point = self.logical_point(x, y);
        let bounds = self.config.logical_size;
        let moved = match self.session.active_mut() {
            Some(canvas) => self.interaction.pointer_move(canvas, point, bounds),
            None => None,
        };
        match moved {
            Some(p) => json!({ "moved": true, "x": p.x, "y": p.y }).to_string(),
            None => json!({ "moved": false }).to_string(),
        }
    }

    pub fn pointer_up(&mut self) {
        self.interaction.pointer_up();
    }

    pub fn pointer_leave(&mut self) {
        self.interaction.pointer_leave();
    }

    pub fn double_click(&mut self, x: f64, y: f64) -> String {
        let point = self.logical_point(x, y);
        let hit = self.hit(point);
        if let Some(canvas) = self.session.active() {
            self.interaction.double_click(canvas, hit);
        }
        self.get_selection()
    }

    pub fn get_selection(&self) -> String {
        json!({
            "selection": self.interaction.selection(),
            "state": self.interaction.state(),
            "editing": self.interaction.editing(),
        })
        .to_string()
    }

    /// Paints the preview into a 2D context at the current zoom.
    pub fn render(&self, ctx: &CanvasRenderingContext2d) -> std::result::Result<(), JsValue> {
        let surface = self.preview_surface().map_err(|e| JsValue::from_str(&e.to_string()))?;
        let (width, height) = (surface.width(), surface.height());
        let pixels = surface.to_rgba_image().into_raw();
        let image = ImageData::new_with_u8_clamped_array_and_sh(Clamped(pixels.as_slice()), width, height)?;
        ctx.put_image_data(&image, 0.0, 0.0)
    }

    pub fn preview_png(&self) -> String {
        match self.preview_surface().and_then(|s| s.encode_png()) {
            Ok(png) => json!({ "dataUrl": png_data_url(&png) }).to_string(),
            Err(e) => error_json(e),
        }
    }

    /// Exports the active canvas, at the logical size unless told otherwise.
    /// Missing images are listed under `skipped`.
    pub fn export_png(&self, width: Option<u32>, height: Option<u32>) -> String {
        let (width, height) = requested_size(width, height, self.config.logical_size);
        match block_on(self.export_active(width, height, &self.assets)) {
            Ok(image) => json!({
                "dataUrl": image.to_data_url(),
                "filename": image.filename(),
                "width": image.width,
                "height": image.height,
                "skipped": image.report.skipped.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            })
            .to_string(),
            Err(e) => error_json(e),
        }
    }

    /// Exports every canvas; the host packages the returned files.
    pub fn export_all(&self, width: Option<u32>, height: Option<u32>) -> String {
        let (width, height) = requested_size(width, height, self.config.logical_size);
        match block_on(self.export_every(width, height, &self.assets)) {
            Ok(entries) => {
                let files: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|e| json!({ "filename": e.filename, "dataUrl": png_data_url(&e.png), "skipped": e.skipped }))
                    .collect();
                json!({ "files": files }).to_string()
            }
            Err(e) => error_json(e),
        }
    }

    /// URLs the host may now revoke. Drains the queue.
    pub fn take_released_urls(&mut self) -> String {
        let urls = std::mem::take(&mut self.pending_releases);
        serde_json::to_string(&urls).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn get_snapshot_json(&self) -> String {
        snapshot_to_json(self.session.canvases()).unwrap_or_else(error_json)
    }

    pub fn load_snapshot_json(&mut self, json: &str) -> String {
        match snapshot_from_json(json) {
            Ok(canvases) => {
                self.save_state("Load");
                self.session.replace_canvases(canvases, None);
                self.interaction.clear();
                self.cache_inline_images();
                json!({ "success": true, "canvases": self.session.canvases().len() }).to_string()
            }
            Err(e) => error_json(e),
        }
    }

    pub fn get_canvas_json(&self) -> String {
        match self.session.active() {
            Some(canvas) => serde_json::to_string(canvas).unwrap_or_else(error_json),
            None => "null".to_string(),
        }
    }

    /// The active canvas as a plain JS object.
    pub fn get_canvas(&self) -> std::result::Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.session.active()).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn get_assets_json(&self) -> String {
        let assets: Vec<_> = self.session.assets.iter().collect();
        serde_json::to_string(&assets).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn undo(&mut self) -> bool {
        if let Some(prev_state) = self.undo_stack.pop() {
            let current_state = self.capture("Redo State");
            self.redo_stack.push(current_state);
            self.restore(prev_state);
            true
        } else {
            false
        }
    }

    pub fn redo(&mut self) -> bool {
        if let Some(next_state) = self.redo_stack.pop() {
            let current_state = self.capture("Undo State");
            self.undo_stack.push(current_state);
            self.restore(next_state);
            true
        } else {
            false
        }
    }

    pub fn get_history(&self) -> String {
        let history: Vec<String> = self.undo_stack.iter().map(|s| s.action_name.clone()).collect();
        serde_json::to_string(&history).unwrap_or("[]".to_string())
    }

    pub fn zoom(&self) -> u32 {
        self.preview.zoom_percent
    }
}

impl StudioEngine {
    pub fn with_config(config: EngineConfig) -> Result<StudioEngine> {
        config.validate()?;
        Ok(StudioEngine { config, ..StudioEngine::new() })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    pub fn active_canvas(&self) -> Option<&Canvas> {
        self.session.active()
    }

    /// Preview pixels to logical units.
    pub fn logical_point(&self, x: f64, y: f64) -> Point {
        let zoom = self.preview.zoom_percent as f64 / 100.0;
        Point::new(x / zoom, y / zoom)
    }

    pub(crate) fn paint_context(&self) -> PaintContext<'_> {
        PaintContext { images: &self.images, fonts: &self.fonts, config: &self.config }
    }

    fn hit(&self, point: Point) -> Option<Target> {
        let canvas = self.session.active()?;
        hit_test(&scene_nodes(canvas, self.paint_context()), point)
    }

    pub fn preview_surface(&self) -> Result<Surface> {
        let canvas = self
            .session
            .active()
            .ok_or_else(|| StudioError::ExportNotReady("no active canvas".into()))?;
        render_preview(canvas, self.interaction.selection(), self.preview, self.paint_context())
    }

    pub async fn export_active(&self, width: u32, height: u32, fetcher: &dyn AssetFetcher) -> Result<ExportedImage> {
        let canvas = self
            .session
            .active()
            .ok_or_else(|| StudioError::ExportNotReady("no active canvas".into()))?;
        export_canvas(canvas, width, height, fetcher, &self.fonts, &self.config).await
    }

    pub async fn export_every(&self, width: u32, height: u32, fetcher: &dyn AssetFetcher) -> Result<Vec<BatchEntry>> {
        export_batch(self.session.canvases(), width, height, fetcher, &self.fonts, &self.config).await
    }

    pub(crate) fn capture(&self, action_name: &str) -> EngineState {
        EngineState {
            canvases: self.session.canvases().to_vec(),
            active: self.session.active_id(),
            action_name: action_name.to_string(),
        }
    }

    fn restore(&mut self, state: EngineState) {
        self.session.replace_canvases(state.canvases, state.active);
        self.interaction.clear();
        self.cache_inline_images();
    }

    /// Decodes `data:` images that no host will ever hand over, so the
    /// preview and hit testing see the same pixels the export does.
    pub(crate) fn cache_inline_images(&mut self) {
        let mut pending: Vec<String> = self
            .session
            .canvases()
            .iter()
            .flat_map(image_urls)
            .filter(|url| is_data_url(url) && self.images.get(url).is_none() && self.images.failure(url).is_none())
            .collect();
        pending.sort();
        pending.dedup();
        for url in pending {
            match decode_data_url(&url) {
                Some(bytes) => {
                    if self.images.insert_bytes(&url, &bytes).is_err() {
                        warn!("inline image of {} bytes could not be decoded", bytes.len());
                    }
                }
                None => self.images.mark_failed(ResourceError::Decode { url, reason: "malformed data URL".into() }),
            }
        }
    }

    pub(crate) fn save_state(&mut self, action_name: &str) {
        let state = self.capture(action_name);
        self.push_history(state);
    }

    pub(crate) fn push_history(&mut self, state: EngineState) {
        self.undo_stack.push(state);
        if self.undo_stack.len() > self.config.history_depth {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    /// Queues URLs for the host and forgets the bytes behind them.
    pub(crate) fn release(&mut self, urls: impl IntoIterator<Item = String>) {
        for url in urls {
            debug!("releasing {}", url);
            self.assets.remove(&url);
            self.images.remove(&url);
            if !self.pending_releases.contains(&url) {
                self.pending_releases.push(url);
            }
        }
    }

    /// Drops selection that points at something no longer on screen.
    pub(crate) fn reconcile_selection(&mut self) {
        match self.session.active() {
            Some(canvas) => self.interaction.reconcile(canvas),
            None => self.interaction.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_canvas() {
        let engine = StudioEngine::new();
        assert_eq!(engine.session().canvases().len(), 1);
        assert!(engine.active_canvas().is_some());
    }

    #[test]
    fn logical_point_undoes_zoom() {
        let mut engine = StudioEngine::new();
        engine.preview.zoom_percent = 200;
        assert_eq!(engine.logical_point(100.0, 50.0), Point::new(50.0, 25.0));
    }

    #[test]
    fn with_config_rejects_invalid() {
        let config = EngineConfig { decode_timeout_ms: 0, ..EngineConfig::default() };
        assert!(StudioEngine::with_config(config).is_err());
    }
}
