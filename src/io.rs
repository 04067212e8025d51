//! Persisted snapshots and `data:` URLs.
//!
//! A snapshot is the array of canvases exactly as they serialize; selection
//! and drag state live in the controller and are never part of it.

use base64::{engine::general_purpose, Engine as _};

use crate::canvas::Canvas;
use crate::error::{Result, StudioError};
use crate::objects::normalize_rotation;

pub fn snapshot_to_json(canvases: &[Canvas]) -> Result<String> {
    Ok(serde_json::to_string(canvases)?)
}

/// Parses a snapshot. Rotations are re-normalized and duplicate canvas ids
/// are rejected, so a loaded session holds the same invariants as one built
/// through the editor.
pub fn snapshot_from_json(json: &str) -> Result<Vec<Canvas>> {
    let mut canvases: Vec<Canvas> = serde_json::from_str(json)?;
    for (i, canvas) in canvases.iter().enumerate() {
        if canvases[..i].iter().any(|c| c.id == canvas.id) {
            return Err(StudioError::Snapshot(format!("duplicate canvas id {}", canvas.id)));
        }
    }
    for canvas in &mut canvases {
        for element in &mut canvas.elements {
            element.placement.rotation = normalize_rotation(element.placement.rotation);
        }
        for watermark in &mut canvas.watermarks {
            watermark.placement.rotation = normalize_rotation(watermark.placement.rotation);
        }
    }
    Ok(canvases)
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png))
}

pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

/// Payload bytes of a `data:` URL, base64 or percent-encoded.
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if meta.ends_with(";base64") {
        general_purpose::STANDARD.decode(payload.trim()).ok()
    } else {
        percent_decode(payload)
    }
}

fn percent_decode(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}
