//! Export pipeline.
//!
//! An export reads only the `Canvas` model, never the preview surface, so it
//! needs no settling delay and does not care which canvas is on screen. All
//! image loads are issued together and awaited as a batch; drawing then runs
//! strictly in paint order on a fresh surface.

use futures::future::{join_all, BoxFuture, FutureExt};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::Pixmap;

use crate::canvas::Canvas;
use crate::config::EngineConfig;
use crate::error::{ResourceError, Result, StudioError};
use crate::fonts::FontBook;
use crate::io::{decode_data_url, is_data_url, png_data_url};
use crate::render::{decode_pixmap, image_urls, paint_scene, ImageCache, PaintContext};
use crate::surface::Surface;
use crate::types::Size;

/// Largest edge a single export may have.
pub const MAX_EXPORT_DIMENSION: u32 = 16_384;

pub type FetchResult = std::result::Result<Vec<u8>, ResourceError>;

/// Supplies encoded image bytes for a URL.
pub trait AssetFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult>;
}

/// Bytes the host has already handed over, keyed by URL.
#[derive(Clone, Debug, Default)]
pub struct MemoryAssets {
    entries: HashMap<String, Arc<Vec<u8>>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(url.into(), Arc::new(bytes));
    }

    pub fn remove(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }
}

impl AssetFetcher for MemoryAssets {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult> {
        let result = self
            .entries
            .get(url)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| ResourceError::Missing(url.to_string()));
        futures::future::ready(result).boxed()
    }
}

/// Reads `file://` and relative URLs from a directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct FsAssets {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FsAssets {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        FsAssets { root: root.into() }
    }

    fn resolve(&self, url: &str) -> std::path::PathBuf {
        let path = url.strip_prefix("file://").unwrap_or(url);
        self.root.join(path.trim_start_matches('/'))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetFetcher for FsAssets {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult> {
        async move {
            let path = self.resolve(url);
            tokio::fs::read(&path)
                .await
                .map_err(|e| ResourceError::Fetch { url: url.to_string(), reason: e.to_string() })
        }
        .boxed()
    }
}

/// Bounds every fetch of the wrapped fetcher. A timeout is reported like any
/// other load failure, so the entity is skipped and the export goes on.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct TimeoutFetcher<F> {
    inner: F,
    timeout: std::time::Duration,
}

#[cfg(not(target_arch = "wasm32"))]
impl<F: AssetFetcher> TimeoutFetcher<F> {
    pub fn new(inner: F, timeout: std::time::Duration) -> Self {
        TimeoutFetcher { inner, timeout }
    }

    pub fn from_config(inner: F, config: &EngineConfig) -> Self {
        Self::new(inner, config.decode_timeout())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl<F: AssetFetcher> AssetFetcher for TimeoutFetcher<F> {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult> {
        async move {
            tokio::time::timeout(self.timeout, self.inner.fetch(url))
                .await
                .map_err(|_| ResourceError::TimedOut { url: url.to_string(), millis: self.timeout.as_millis() as u64 })?
        }
        .boxed()
    }
}

/// Fetches (or unpacks a `data:` URL) and decodes one image.
pub async fn load_image(fetcher: &dyn AssetFetcher, url: &str) -> std::result::Result<Pixmap, ResourceError> {
    let bytes = if is_data_url(url) {
        decode_data_url(url)
            .ok_or_else(|| ResourceError::Decode { url: url.to_string(), reason: "malformed data URL".into() })?
    } else {
        fetcher.fetch(url).await?
    };
    decode_pixmap(url, &bytes)
}

/// Loads every URL concurrently; failures are kept per URL.
pub async fn load_images(fetcher: &dyn AssetFetcher, urls: &[String]) -> ImageCache {
    let results = join_all(urls.iter().map(|url| load_image(fetcher, url))).await;
    let mut cache = ImageCache::new();
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(pixmap) => cache.insert(url.as_str(), pixmap),
            Err(err) => cache.mark_failed(err),
        }
    }
    cache
}

/// Resources left out of an otherwise successful export.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportReport {
    pub skipped: Vec<ResourceError>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ExportedImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
    pub report: ExportReport,
}

impl ExportedImage {
    pub fn to_data_url(&self) -> String {
        png_data_url(&self.png)
    }

    pub fn filename(&self) -> String {
        export_filename(self.width, self.height)
    }
}

/// Requested sizes below one pixel are raised to one.
pub fn export_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width.max(1), height.max(1))
}

/// Sizes the host left out default to the logical canvas size.
pub fn requested_size(width: Option<u32>, height: Option<u32>, logical: Size) -> (u32, u32) {
    (
        width.unwrap_or(logical.width.round() as u32),
        height.unwrap_or(logical.height.round() as u32),
    )
}

/// Height matching `width` under the logical aspect ratio.
pub fn matching_height(width: u32, logical: Size) -> u32 {
    ((width as f64) * logical.height / logical.width).round().max(1.0) as u32
}

/// Width matching `height` under the logical aspect ratio.
pub fn matching_width(height: u32, logical: Size) -> u32 {
    ((height as f64) * logical.width / logical.height).round().max(1.0) as u32
}

pub fn export_filename(width: u32, height: u32) -> String {
    format!("canvas-design-{}x{}.png", width, height)
}

/// `index` is zero-based; names are numbered from one.
pub fn batch_filename(index: usize) -> String {
    format!("canvas-design-{}.png", index + 1)
}

/// Rasterizes `canvas` at `width × height` and encodes it as PNG.
pub async fn export_canvas(
    canvas: &Canvas,
    width: u32,
    height: u32,
    fetcher: &dyn AssetFetcher,
    fonts: &FontBook,
    config: &EngineConfig,
) -> Result<ExportedImage> {
    let (width, height) = export_dimensions(width, height);
    if width > MAX_EXPORT_DIMENSION || height > MAX_EXPORT_DIMENSION {
        return Err(StudioError::Surface { width, height });
    }
    let mut surface = Surface::new(width, height)?;
    let sx = width as f64 / config.logical_size.width;
    let sy = height as f64 / config.logical_size.height;

    let urls = image_urls(canvas);
    let images = load_images(fetcher, &urls).await;

    let ctx = PaintContext { images: &images, fonts, config };
    let skipped = paint_scene(&mut surface, canvas, sx, sy, ctx);
    let png = surface.encode_png()?;
    if skipped.is_empty() {
        info!("exported canvas {} at {}x{}", canvas.id, width, height);
    } else {
        warn!("exported canvas {} at {}x{} without {} resource(s)", canvas.id, width, height, skipped.len());
    }
    Ok(ExportedImage { width, height, png, report: ExportReport { skipped } })
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub filename: String,
    #[serde(skip)]
    pub png: Vec<u8>,
    pub skipped: usize,
}

/// Exports every canvas in order, one after another.
pub async fn export_batch(
    canvases: &[Canvas],
    width: u32,
    height: u32,
    fetcher: &dyn AssetFetcher,
    fonts: &FontBook,
    config: &EngineConfig,
) -> Result<Vec<BatchEntry>> {
    if canvases.is_empty() {
        return Err(StudioError::ExportNotReady("there are no canvases to export".into()));
    }
    let mut entries = Vec::with_capacity(canvases.len());
    for (index, canvas) in canvases.iter().enumerate() {
        let image = export_canvas(canvas, width, height, fetcher, fonts, config).await?;
        info!("batch export {}/{}", index + 1, canvases.len());
        entries.push(BatchEntry { filename: batch_filename(index), png: image.png, skipped: image.report.skipped.len() });
    }
    Ok(entries)
}

/// Turns a set of exported files into one downloadable archive.
pub trait Packager {
    fn package(&self, entries: &[BatchEntry]) -> Result<Vec<u8>>;
}

pub async fn export_archive(
    canvases: &[Canvas],
    width: u32,
    height: u32,
    fetcher: &dyn AssetFetcher,
    fonts: &FontBook,
    config: &EngineConfig,
    packager: &dyn Packager,
) -> Result<Vec<u8>> {
    let entries = export_batch(canvases, width, height, fetcher, fonts, config).await?;
    packager.package(&entries)
}
