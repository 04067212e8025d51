use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use crate::assets::{UploadInfo, UploadedAsset};
use crate::canvas::{AddOutcome, MainImage, Target};
use crate::engine::{error_json, StudioEngine};
use crate::objects::{ElementDraft, PropertyPatch, WatermarkDraft};
use crate::render::{clamp_zoom, zoom_in, zoom_out};
use crate::selection::{Interaction, Property, Selection};
use crate::types::Point;

fn params<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    let value = if value.is_null() { json!({}) } else { value };
    serde_json::from_value(value).map_err(|e| format!("Invalid params: {}", e))
}

fn success() -> String {
    json!({ "success": true }).to_string()
}

fn outcome_json(outcome: AddOutcome) -> String {
    json!({ "success": true, "id": outcome.id(), "added": outcome.was_added() }).to_string()
}

#[derive(Deserialize)]
struct IdParams {
    id: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetIdParams {
    asset_id: String,
}

#[derive(Deserialize)]
struct AddAssetParams {
    asset: UploadedAsset,
    upload: UploadInfo,
}

#[derive(Deserialize)]
struct TargetParams {
    #[serde(default)]
    target: Option<Target>,
}

#[derive(Deserialize)]
struct UpdateParams {
    #[serde(default)]
    target: Option<Target>,
    patch: PropertyPatch,
}

#[derive(Deserialize)]
struct PositionParams {
    target: Target,
    position: Point,
}

#[derive(Deserialize)]
struct AdjustParams {
    #[serde(default)]
    target: Option<Target>,
    property: Property,
    delta: f64,
}

#[derive(Deserialize)]
struct ColorParams {
    color: String,
}

#[derive(Deserialize)]
struct BackgroundImageParams {
    #[serde(default)]
    image: Option<MainImage>,
}

#[derive(Deserialize)]
struct TextParams {
    text: String,
}

#[derive(Deserialize)]
struct ZoomParams {
    percent: u32,
}

#[derive(Deserialize)]
struct GridParams {
    enabled: bool,
}

#[wasm_bindgen]
impl StudioEngine {
    /// Runs one toolbar/menu command:
    /// `{"action": "add_element", "params": {...}}`.
    pub fn execute_command(&mut self, cmd_json: &str) -> String {
        #[derive(Deserialize)]
        struct Command {
            action: String,
            #[serde(default)]
            params: Value,
        }

        let cmd: Command = match serde_json::from_str(cmd_json) {
            Ok(c) => c,
            Err(e) => return error_json(format!("Invalid JSON: {}", e)),
        };

        match self.dispatch(&cmd.action, cmd.params) {
            Ok(result) => {
                self.cache_inline_images();
                result
            }
            Err(message) => {
                warn!("command {} failed: {}", cmd.action, message);
                error_json(message)
            }
        }
    }
}

impl StudioEngine {
    fn dispatch(&mut self, action: &str, p: Value) -> Result<String, String> {
        match action {
            "add_canvas" => {
                self.save_state("Add Canvas");
                let id = self.session.add_canvas();
                self.interaction.clear();
                Ok(json!({ "success": true, "id": id }).to_string())
            }
            "add_canvas_from_image" => {
                let image: MainImage = params(p)?;
                self.save_state("Add Canvas");
                let id = self.session.add_canvas_from_image(image);
                self.interaction.clear();
                Ok(json!({ "success": true, "id": id }).to_string())
            }
            "remove_canvas" => {
                let IdParams { id } = params(p)?;
                let before = self.capture("Remove Canvas");
                match self.session.remove_canvas(id) {
                    Some(released) => {
                        self.push_history(before);
                        self.release(released);
                        self.reconcile_selection();
                        Ok(success())
                    }
                    None => Ok(json!({ "success": false }).to_string()),
                }
            }
            "set_active_canvas" => {
                let IdParams { id } = params(p)?;
                let switched = self.session.set_active(id);
                if switched {
                    self.interaction.clear();
                }
                Ok(json!({ "success": switched }).to_string())
            }
            "add_element" => {
                let draft: ElementDraft = params(p)?;
                let before = self.capture("Add Element");
                let outcome = self.session.active_mut().ok_or("No active canvas")?.add_element(draft, &self.config);
                if outcome.was_added() {
                    self.push_history(before);
                }
                Ok(outcome_json(outcome))
            }
            "add_watermark" => {
                let draft: WatermarkDraft = params(p)?;
                let before = self.capture("Add Watermark");
                let outcome = self.session.active_mut().ok_or("No active canvas")?.add_watermark(draft, &self.config);
                if outcome.was_added() {
                    self.push_history(before);
                }
                Ok(outcome_json(outcome))
            }
            "add_asset" => {
                let AddAssetParams { asset, upload } = params(p)?;
                let id = asset.id.clone();
                self.session.add_asset(asset, &upload, &self.config).map_err(|e| e.to_string())?;
                Ok(json!({ "success": true, "id": id }).to_string())
            }
            "place_asset" => {
                let AssetIdParams { asset_id } = params(p)?;
                let canvas_id = self.session.active_id().ok_or("No active canvas")?;
                let before = self.capture("Add Watermark");
                let outcome =
                    self.session.place_asset(canvas_id, &asset_id, &self.config).ok_or("Unknown asset")?;
                if outcome.was_added() {
                    self.push_history(before);
                }
                Ok(outcome_json(outcome))
            }
            "remove_asset" => {
                let AssetIdParams { asset_id } = params(p)?;
                let before = self.capture("Remove Asset");
                match self.session.remove_asset(&asset_id) {
                    Some(removal) => {
                        if !removal.removed_watermarks.is_empty() {
                            self.push_history(before);
                        }
                        self.release(removal.released);
                        self.reconcile_selection();
                        Ok(json!({ "success": true, "removedWatermarks": removal.removed_watermarks.len() }).to_string())
                    }
                    None => Ok(json!({ "success": false }).to_string()),
                }
            }
            "update_properties" => {
                let UpdateParams { target, patch } = params(p)?;
                let target = self.resolve_target(target)?;
                let before = self.capture("Update Properties");
                let updated = self.session.active_mut().ok_or("No active canvas")?.update_properties(target, &patch);
                if updated {
                    self.push_history(before);
                }
                Ok(json!({ "success": updated }).to_string())
            }
            "update_position" => {
                let PositionParams { target, position } = params(p)?;
                let before = self.capture("Move");
                let updated = self.session.active_mut().ok_or("No active canvas")?.update_position(target, position);
                if updated {
                    self.push_history(before);
                }
                Ok(json!({ "success": updated }).to_string())
            }
            "remove" => {
                let TargetParams { target } = params(p)?;
                let target = self.resolve_target(target)?;
                let before = self.capture("Delete");
                match self.session.active_mut().ok_or("No active canvas")?.remove(target) {
                    Some(released) => {
                        self.push_history(before);
                        self.release(released);
                        self.reconcile_selection();
                        Ok(success())
                    }
                    None => Ok(json!({ "success": false }).to_string()),
                }
            }
            "duplicate_watermark" => {
                let TargetParams { target } = params(p)?;
                let Target::Watermark(id) = self.resolve_target(target)? else {
                    return Err("Only watermarks can be duplicated".into());
                };
                let before = self.capture("Duplicate Watermark");
                match self.session.active_mut().ok_or("No active canvas")?.duplicate_watermark(id, &self.config) {
                    Some(new_id) => {
                        self.push_history(before);
                        if let Some(canvas) = self.session.active() {
                            self.interaction.select(canvas, Target::Watermark(new_id));
                        }
                        Ok(json!({ "success": true, "id": new_id }).to_string())
                    }
                    None => Ok(json!({ "success": false }).to_string()),
                }
            }
            "adjust_property" => {
                let AdjustParams { target, property, delta } = params(p)?;
                let target = self.resolve_target(target)?;
                let before = self.capture("Adjust");
                let value = Interaction::adjust_property(self.session.active_mut().ok_or("No active canvas")?, target, property, delta);
                match value {
                    Some(v) => {
                        self.push_history(before);
                        Ok(json!({ "success": true, "value": v }).to_string())
                    }
                    None => Ok(json!({ "success": false }).to_string()),
                }
            }
            "set_background_color" => {
                let ColorParams { color } = params(p)?;
                let before = self.capture("Background Color");
                self.session.active_mut().ok_or("No active canvas")?.set_canvas_background(color);
                self.push_history(before);
                Ok(success())
            }
            "set_background_image" => {
                let BackgroundImageParams { image } = params(p)?;
                let before = self.capture("Background Image");
                let released = self.session.active_mut().ok_or("No active canvas")?.set_background_image(image);
                self.push_history(before);
                self.release(released);
                Ok(success())
            }
            "select" => {
                let TargetParams { target } = params(p)?;
                let selected = match (target, self.session.active()) {
                    (Some(target), Some(canvas)) => self.interaction.select(canvas, target),
                    _ => false,
                };
                Ok(json!({ "success": selected, "selection": self.interaction.selection() }).to_string())
            }
            "clear_selection" => {
                self.interaction.clear();
                Ok(success())
            }
            "edit_text" => {
                let TextParams { text } = params(p)?;
                let Some(target) = self.interaction.editing() else {
                    return Err("No text is being edited".into());
                };
                let before = self.capture("Edit Text");
                let edited = match self.session.active_mut() {
                    Some(canvas) => self.interaction.edit_text(canvas, &text),
                    None => false,
                };
                if edited {
                    self.push_history(before);
                }
                Ok(json!({ "success": edited, "target": target }).to_string())
            }
            "blur" => {
                self.interaction.blur();
                Ok(success())
            }
            "undo" => Ok(json!({ "success": self.undo() }).to_string()),
            "redo" => Ok(json!({ "success": self.redo() }).to_string()),
            "get_history" => Ok(self.get_history()),
            "zoom_in" => {
                self.preview.zoom_percent = zoom_in(self.preview.zoom_percent);
                Ok(json!({ "success": true, "zoom": self.preview.zoom_percent }).to_string())
            }
            "zoom_out" => {
                self.preview.zoom_percent = zoom_out(self.preview.zoom_percent);
                Ok(json!({ "success": true, "zoom": self.preview.zoom_percent }).to_string())
            }
            "set_zoom" => {
                let ZoomParams { percent } = params(p)?;
                self.preview.zoom_percent = clamp_zoom(percent);
                Ok(json!({ "success": true, "zoom": self.preview.zoom_percent }).to_string())
            }
            "show_grid" => {
                let GridParams { enabled } = params(p)?;
                self.preview.show_grid = enabled;
                Ok(success())
            }
            other => Err(format!("Unknown action: {}", other)),
        }
    }

    /// An explicit target, or whatever is selected.
    fn resolve_target(&self, target: Option<Target>) -> Result<Target, String> {
        target
            .or_else(|| self.interaction.selection().target())
            .ok_or_else(|| match self.interaction.selection() {
                Selection::CanvasBackground => "The canvas itself is selected".to_string(),
                _ => "Nothing is selected".to_string(),
            })
    }
}
