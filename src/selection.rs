//! Pointer-driven selection and dragging.
//!
//! The controller is session-scoped and never persisted. It owns at most one
//! selection and at most one drag, and turns pointer events into canvas
//! mutations.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::canvas::{Canvas, Target};
use crate::objects::{clamp_font_size, clamp_scale, PropertyPatch, MIN_WATERMARK_OPACITY};
use crate::types::{Point, Size};

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Selection {
    #[default]
    None,
    Element(u32),
    Watermark(u32),
    /// The empty canvas was clicked; property editors target its background.
    CanvasBackground,
}

impl Selection {
    pub fn target(self) -> Option<Target> {
        match self {
            Selection::Element(id) => Some(Target::Element(id)),
            Selection::Watermark(id) => Some(Target::Watermark(id)),
            Selection::None | Selection::CanvasBackground => None,
        }
    }

    pub fn is(self, target: Target) -> bool {
        self.target() == Some(target)
    }
}

impl From<Target> for Selection {
    fn from(target: Target) -> Self {
        match target {
            Target::Element(id) => Selection::Element(id),
            Target::Watermark(id) => Selection::Watermark(id),
        }
    }
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum InteractionState {
    Idle,
    Selected,
    Dragging,
    Editing,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    Scale,
    Opacity,
    Rotation,
    FontSize,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum PointerOutcome {
    /// A drag is already running; the event was dropped.
    Ignored,
    DragStarted(Target),
    BackgroundSelected,
}

#[derive(Clone, Copy, PartialEq, Debug)]
struct Drag {
    target: Target,
    /// Pointer minus entity position at drag start.
    anchor: Point,
}

#[derive(Clone, Debug, Default)]
pub struct Interaction {
    selection: Selection,
    drag: Option<Drag>,
    editing: Option<Target>,
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn editing(&self) -> Option<Target> {
        self.editing
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn state(&self) -> InteractionState {
        if self.drag.is_some() {
            InteractionState::Dragging
        } else if self.editing.is_some() {
            InteractionState::Editing
        } else if self.selection.target().is_some() {
            InteractionState::Selected
        } else {
            InteractionState::Idle
        }
    }

    /// Selects without starting a drag (keyboard, layer list).
    pub fn select(&mut self, canvas: &Canvas, target: Target) -> bool {
        if !canvas.contains(target) {
            return false;
        }
        if self.editing.is_some_and(|t| t != target) {
            self.editing = None;
        }
        self.selection = target.into();
        true
    }

    pub fn clear(&mut self) {
        self.selection = Selection::None;
        self.drag = None;
        self.editing = None;
    }

    /// `hit` is whatever entity lies under the pointer, topmost first.
    pub fn pointer_down(&mut self, canvas: &Canvas, pointer: Point, hit: Option<Target>) -> PointerOutcome {
        if self.drag.is_some() {
            debug!("pointer down ignored: drag already active");
            return PointerOutcome::Ignored;
        }
        let hit = hit.and_then(|t| canvas.placement(t).map(|p| (t, p.position)));
        match hit {
            Some((target, position)) => {
                if self.editing.is_some_and(|t| t != target) {
                    self.editing = None;
                }
                self.selection = target.into();
                self.drag = Some(Drag { target, anchor: pointer - position });
                debug!("drag start {:?}", target);
                PointerOutcome::DragStarted(target)
            }
            None => {
                self.selection = Selection::CanvasBackground;
                self.editing = None;
                PointerOutcome::BackgroundSelected
            }
        }
    }

    /// Moves the dragged entity so it keeps its grab offset, clamped to the
    /// canvas. Returns the committed position.
    pub fn pointer_move(&mut self, canvas: &mut Canvas, pointer: Point, bounds: Size) -> Option<Point> {
        let drag = self.drag?;
        let raw = pointer - drag.anchor;
        let position = Point::new(raw.x.clamp(0.0, bounds.width), raw.y.clamp(0.0, bounds.height));
        if canvas.update_position(drag.target, position) {
            Some(position)
        } else {
            // the entity vanished mid-drag
            self.clear();
            None
        }
    }

    pub fn pointer_up(&mut self) {
        if let Some(drag) = self.drag.take() {
            debug!("drag end {:?}", drag.target);
        }
    }

    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Second pointer-down on a text entity enters text editing.
    pub fn double_click(&mut self, canvas: &Canvas, hit: Option<Target>) -> bool {
        let Some(target) = hit else { return false };
        let is_text = match target {
            Target::Element(id) => canvas.element(id).and_then(|e| e.text()).is_some(),
            Target::Watermark(id) => canvas.watermark(id).and_then(|w| w.text()).is_some(),
        };
        if !is_text {
            return false;
        }
        self.drag = None;
        self.selection = target.into();
        self.editing = Some(target);
        true
    }

    /// Writes the input surface's content into the entity being edited.
    pub fn edit_text(&mut self, canvas: &mut Canvas, text: &str) -> bool {
        let Some(target) = self.editing else { return false };
        let patch = PropertyPatch { text: Some(text.to_string()), ..Default::default() };
        canvas.update_properties(target, &patch)
    }

    pub fn blur(&mut self) {
        self.editing = None;
    }

    /// Drops selection state that points at entities no longer on `canvas`.
    pub fn reconcile(&mut self, canvas: &Canvas) {
        if let Some(target) = self.selection.target() {
            if !canvas.contains(target) {
                self.clear();
            }
        }
    }

    /// Applies a bounded delta to one numeric property and commits it.
    /// Returns the value written, or `None` when the target or property
    /// does not exist.
    pub fn adjust_property(canvas: &mut Canvas, target: Target, property: Property, delta: f64) -> Option<f64> {
        let is_watermark = matches!(target, Target::Watermark(_));
        let placement = *canvas.placement(target)?;
        let mut patch = PropertyPatch::default();
        let value = match property {
            Property::Scale => {
                let v = clamp_scale(placement.scale + delta);
                patch.scale = Some(v);
                v
            }
            Property::Opacity => {
                let floor = if is_watermark { MIN_WATERMARK_OPACITY } else { 0.0 };
                let v = (placement.opacity + delta).clamp(floor, 1.0);
                patch.opacity = Some(v);
                v
            }
            Property::Rotation => {
                let v = placement.rotation + delta;
                patch.rotation = Some(v);
                v
            }
            Property::FontSize => {
                let current = match target {
                    Target::Element(id) => canvas.element(id)?.text()?.font_size,
                    Target::Watermark(id) => canvas.watermark(id)?.text()?.font_size,
                };
                let v = clamp_font_size(current + delta);
                patch.font_size = Some(v);
                v
            }
        };
        canvas.update_properties(target, &patch);
        Some(value)
    }
}
