//! A single composition and the mutations the editor performs on it.
//!
//! Lookups by an id that no longer exists are no-ops: stale UI callbacks can
//! arrive after an entity was removed and must not disturb the model.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::objects::{Element, ElementDraft, Placement, PropertyPatch, Watermark, WatermarkDraft};
use crate::types::Point;

/// Addresses one layer of a canvas.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
    Element(u32),
    Watermark(u32),
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddOutcome {
    Added(u32),
    /// The add matched an existing entity and was absorbed; carries its id.
    DuplicateIgnored(u32),
}

impl AddOutcome {
    pub fn id(self) -> u32 {
        match self {
            AddOutcome::Added(id) | AddOutcome::DuplicateIgnored(id) => id,
        }
    }

    pub fn was_added(self) -> bool {
        matches!(self, AddOutcome::Added(_))
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct MainImage {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Object URLs (`blob:`) are the only handles the host must revoke.
pub fn needs_release(url: &str) -> bool {
    url.starts_with("blob:")
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    pub id: u32,
    pub main_image: Option<MainImage>,
    pub elements: Vec<Element>,
    pub watermarks: Vec<Watermark>,
    pub background_color: String,
    #[serde(skip)]
    next_id: u32,
}

impl Canvas {
    pub fn new(id: u32) -> Self {
        Canvas {
            id,
            main_image: None,
            elements: Vec::new(),
            watermarks: Vec::new(),
            background_color: "#ffffff".to_string(),
            next_id: 1,
        }
    }

    pub fn with_background_image(id: u32, image: MainImage) -> Self {
        Canvas { main_image: Some(image), ..Canvas::new(id) }
    }

    fn fresh_id(&mut self) -> u32 {
        let max_existing = self
            .elements
            .iter()
            .map(|e| e.id)
            .chain(self.watermarks.iter().map(|w| w.id))
            .max()
            .unwrap_or(0);
        let id = self.next_id.max(max_existing + 1);
        self.next_id = id + 1;
        id
    }

    pub fn element(&self, id: u32) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn watermark(&self, id: u32) -> Option<&Watermark> {
        self.watermarks.iter().find(|w| w.id == id)
    }

    pub fn contains(&self, target: Target) -> bool {
        self.placement(target).is_some()
    }

    pub fn placement(&self, target: Target) -> Option<&Placement> {
        match target {
            Target::Element(id) => self.element(id).map(|e| &e.placement),
            Target::Watermark(id) => self.watermark(id).map(|w| &w.placement),
        }
    }

    pub fn add_element(&mut self, draft: ElementDraft, config: &EngineConfig) -> AddOutcome {
        if let Some(existing) = self.elements.iter().find(|e| e.duplicates(&draft)) {
            debug!("canvas {}: duplicate element drop absorbed (matches {})", self.id, existing.id);
            return AddOutcome::DuplicateIgnored(existing.id);
        }
        let id = self.fresh_id();
        self.elements.push(draft.into_element(id, config));
        AddOutcome::Added(id)
    }

    pub fn add_watermark(&mut self, draft: WatermarkDraft, config: &EngineConfig) -> AddOutcome {
        if let Some(asset) = draft.asset_id() {
            if let Some(existing) = self.watermarks.iter().find(|w| w.asset_id() == Some(asset)) {
                debug!("canvas {}: asset {} already placed as watermark {}", self.id, asset, existing.id);
                return AddOutcome::DuplicateIgnored(existing.id);
            }
        }
        let wanted = draft.position.unwrap_or_else(|| draft.default_position(config));
        let position = self.free_watermark_position(wanted, config.watermark_offset);
        let id = self.fresh_id();
        self.watermarks.push(draft.into_watermark(id, position, config));
        AddOutcome::Added(id)
    }

    /// Steps `wanted` by `delta` until no watermark sits exactly there.
    fn free_watermark_position(&self, wanted: Point, delta: Point) -> Point {
        let mut position = wanted;
        for _ in 0..=self.watermarks.len() {
            if !self.watermarks.iter().any(|w| w.placement.position == position) {
                break;
            }
            position = position.offset(delta);
        }
        position
    }

    /// Copies a watermark, keeping its asset back-reference, one offset step
    /// away from the original.
    pub fn duplicate_watermark(&mut self, id: u32, config: &EngineConfig) -> Option<u32> {
        let mut copy = self.watermark(id)?.clone();
        let start = copy.placement.position.offset(config.watermark_offset);
        copy.placement.position = self.free_watermark_position(start, config.watermark_offset);
        copy.id = self.fresh_id();
        let new_id = copy.id;
        self.watermarks.push(copy);
        Some(new_id)
    }

    pub fn update_element_properties(&mut self, id: u32, patch: &PropertyPatch) -> bool {
        match self.elements.iter_mut().find(|e| e.id == id) {
            Some(element) => {
                element.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn update_watermark_properties(&mut self, id: u32, patch: &PropertyPatch) -> bool {
        match self.watermarks.iter_mut().find(|w| w.id == id) {
            Some(watermark) => {
                watermark.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn update_properties(&mut self, target: Target, patch: &PropertyPatch) -> bool {
        match target {
            Target::Element(id) => self.update_element_properties(id, patch),
            Target::Watermark(id) => self.update_watermark_properties(id, patch),
        }
    }

    /// Unconditional; bounds are the controller's business during a drag.
    pub fn update_position(&mut self, target: Target, position: Point) -> bool {
        let placement = match target {
            Target::Element(id) => self.elements.iter_mut().find(|e| e.id == id).map(|e| &mut e.placement),
            Target::Watermark(id) => self.watermarks.iter_mut().find(|w| w.id == id).map(|w| &mut w.placement),
        };
        match placement {
            Some(p) => {
                p.position = position;
                true
            }
            None => false,
        }
    }

    /// Removes one layer. `None` when nothing had that id; otherwise the URL
    /// the host may now release, if any.
    pub fn remove(&mut self, target: Target) -> Option<Option<String>> {
        match target {
            Target::Element(id) => {
                let idx = self.elements.iter().position(|e| e.id == id)?;
                self.elements.remove(idx);
                Some(None)
            }
            Target::Watermark(id) => {
                let idx = self.watermarks.iter().position(|w| w.id == id)?;
                let removed = self.watermarks.remove(idx);
                Some(self.releasable(removed.image().map(|i| i.url.as_str())))
            }
        }
    }

    /// A URL is only released once nothing left on the canvas points at it.
    fn releasable(&self, url: Option<&str>) -> Option<String> {
        let url = url.filter(|u| needs_release(u))?;
        let still_used = self.watermarks.iter().any(|w| w.image().map(|i| i.url.as_str()) == Some(url))
            || self.main_image.as_ref().map(|m| m.url.as_str()) == Some(url);
        (!still_used).then(|| url.to_string())
    }

    /// Drops every watermark backed by `asset_id`, returning their ids.
    pub fn remove_watermarks_for_asset(&mut self, asset_id: &str) -> Vec<u32> {
        let removed: Vec<u32> =
            self.watermarks.iter().filter(|w| w.asset_id() == Some(asset_id)).map(|w| w.id).collect();
        self.watermarks.retain(|w| w.asset_id() != Some(asset_id));
        removed
    }

    /// Replaces the background image, returning the old URL if it needs release.
    pub fn set_background_image(&mut self, image: Option<MainImage>) -> Option<String> {
        let previous = std::mem::replace(&mut self.main_image, image)?;
        self.releasable(Some(&previous.url))
    }

    pub fn set_canvas_background(&mut self, color: impl Into<String>) {
        self.background_color = color.into();
    }

    /// Every releasable URL the canvas holds; used when the canvas goes away.
    pub fn owned_urls(&self) -> Vec<String> {
        let held = self
            .main_image
            .iter()
            .map(|m| m.url.as_str())
            .chain(self.watermarks.iter().filter_map(|w| w.image().map(|i| i.url.as_str())))
            .filter(|u| needs_release(u));
        let mut urls: Vec<String> = Vec::new();
        for url in held {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }
}
