use futures::future::{BoxFuture, FutureExt};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use std::time::Duration;

use studio_engine::assets::{UploadInfo, UploadedAsset};
use studio_engine::export::{
    export_archive, export_batch, export_canvas, AssetFetcher, BatchEntry, FetchResult, MemoryAssets, Packager,
    TimeoutFetcher,
};
use studio_engine::fonts::FontBook;
use studio_engine::session::Session;
use studio_engine::{
    Canvas, ElementDraft, EngineConfig, MainImage, Point, PropertyPatch, ResourceError, ShapeKind, StudioError,
    TextDraft, WatermarkDraft,
};

const BLUE: [u8; 4] = [0x3B, 0x82, 0xF6, 0xFF];
const WHITE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const RED: [u8; 4] = [0xFF, 0x00, 0x00, 0xFF];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png).unwrap();
    out
}

fn decode(png: &[u8]) -> RgbaImage {
    image::load_from_memory(png).unwrap().to_rgba8()
}

fn px(img: &RgbaImage, x: u32, y: u32) -> [u8; 4] {
    img.get_pixel(x, y).0
}

fn rectangle_canvas(config: &EngineConfig) -> Canvas {
    let mut canvas = Canvas::new(1);
    canvas.add_element(ElementDraft::shape(ShapeKind::Rectangle, Point::new(100.0, 100.0)), config);
    canvas
}

struct Hangs;

impl AssetFetcher for Hangs {
    fn fetch<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, FetchResult> {
        futures::future::pending().boxed()
    }
}

#[tokio::test]
async fn rectangle_lands_on_its_logical_box() {
    init_logging();
    let config = EngineConfig::default();
    let canvas = rectangle_canvas(&config);

    let out = export_canvas(&canvas, 800, 600, &MemoryAssets::new(), &FontBook::new(), &config).await.unwrap();
    assert!(out.report.is_complete());
    let img = decode(&out.png);
    assert_eq!(img.dimensions(), (800, 600));
    assert_eq!(px(&img, 100, 100), BLUE);
    assert_eq!(px(&img, 150, 150), BLUE);
    assert_eq!(px(&img, 199, 199), BLUE);
    assert_eq!(px(&img, 99, 150), WHITE);
    assert_eq!(px(&img, 200, 150), WHITE);
    assert_eq!(px(&img, 150, 200), WHITE);
}

#[tokio::test]
async fn export_is_deterministic() {
    let config = EngineConfig::default();
    let mut canvas = rectangle_canvas(&config);
    canvas.add_element(ElementDraft::shape(ShapeKind::Star, Point::new(300.0, 200.0)), &config);
    canvas.update_element_properties(2, &PropertyPatch { rotation: Some(33.0), scale: Some(1.7), ..Default::default() });
    let mut assets = MemoryAssets::new();
    assets.insert("mem:logo", solid_png(40, 20, RED));
    canvas.add_watermark(WatermarkDraft::image("mem:logo", None, None), &config);

    let fonts = FontBook::new();
    let first = export_canvas(&canvas, 1024, 768, &assets, &fonts, &config).await.unwrap();
    let second = export_canvas(&canvas, 1024, 768, &assets, &fonts, &config).await.unwrap();
    assert_eq!(first.png, second.png);
}

#[tokio::test]
async fn doubling_the_output_doubles_positions_and_scale() {
    let config = EngineConfig::default();
    let mut canvas = rectangle_canvas(&config);
    canvas.add_element(ElementDraft::shape(ShapeKind::Rectangle, Point::new(500.0, 300.0)), &config);
    canvas.update_element_properties(2, &PropertyPatch { scale: Some(0.5), ..Default::default() });

    let out = export_canvas(&canvas, 1600, 1200, &MemoryAssets::new(), &FontBook::new(), &config).await.unwrap();
    let img = decode(&out.png);
    // first rectangle: logical (100,100)-(200,200) -> (200,200)-(400,400)
    assert_eq!(px(&img, 200, 200), BLUE);
    assert_eq!(px(&img, 399, 399), BLUE);
    assert_eq!(px(&img, 199, 300), WHITE);
    assert_eq!(px(&img, 400, 300), WHITE);
    // second rectangle: 100 * 0.5 * 2 = 100 device pixels from (1000, 600)
    assert_eq!(px(&img, 1000, 600), BLUE);
    assert_eq!(px(&img, 1099, 699), BLUE);
    assert_eq!(px(&img, 1100, 650), WHITE);
}

#[tokio::test]
async fn unequal_axes_scale_independently() {
    let config = EngineConfig::default();
    let canvas = rectangle_canvas(&config);
    let out = export_canvas(&canvas, 1600, 600, &MemoryAssets::new(), &FontBook::new(), &config).await.unwrap();
    let img = decode(&out.png);
    assert_eq!(px(&img, 250, 150), BLUE);
    assert_eq!(px(&img, 399, 199), BLUE);
    assert_eq!(px(&img, 400, 150), WHITE);
}

#[tokio::test]
async fn watermarks_always_paint_above_elements() {
    let config = EngineConfig::default();
    let mut assets = MemoryAssets::new();
    assets.insert("mem:red", solid_png(100, 100, RED));

    let mut canvas = Canvas::new(1);
    canvas.add_watermark(WatermarkDraft::image("mem:red", None, None).at(Point::new(100.0, 100.0)), &config);
    for offset in [0.0, 10.0, 20.0] {
        canvas.add_element(ElementDraft::shape(ShapeKind::Rectangle, Point::new(100.0 + offset, 100.0)), &config);
    }

    let out = export_canvas(&canvas, 800, 600, &assets, &FontBook::new(), &config).await.unwrap();
    let img = decode(&out.png);
    assert_eq!(px(&img, 150, 150), RED);
    assert_eq!(px(&img, 210, 150), BLUE);
}

#[tokio::test]
async fn image_watermarks_are_bounded_and_keep_aspect() {
    let config = EngineConfig::default();
    let mut assets = MemoryAssets::new();
    assets.insert("mem:wide", solid_png(800, 200, RED));
    let mut canvas = Canvas::new(1);
    canvas.add_watermark(WatermarkDraft::image("mem:wide", None, None).at(Point::new(0.0, 0.0)), &config);

    let out = export_canvas(&canvas, 800, 600, &assets, &FontBook::new(), &config).await.unwrap();
    let img = decode(&out.png);
    // 800x200 fits into 200x50
    assert_eq!(px(&img, 190, 45), RED);
    assert_eq!(px(&img, 201, 10), WHITE);
    assert_eq!(px(&img, 10, 51), WHITE);
}

#[tokio::test]
async fn broken_background_still_exports_everything_else() {
    init_logging();
    let config = EngineConfig::default();
    let mut assets = MemoryAssets::new();
    assets.insert("mem:red", solid_png(10, 10, RED));
    assets.insert("mem:corrupt", b"GIF89a but not really".to_vec());

    let mut canvas = Canvas::with_background_image(
        1,
        MainImage { id: "bg".into(), name: "photo.jpg".into(), url: "mem:corrupt".into() },
    );
    canvas.add_element(ElementDraft::shape(ShapeKind::Rectangle, Point::new(100.0, 100.0)), &config);
    canvas.add_watermark(WatermarkDraft::image("mem:red", None, None).at(Point::new(500.0, 400.0)), &config);

    let out = export_canvas(&canvas, 800, 600, &assets, &FontBook::new(), &config).await.unwrap();
    assert_eq!(out.report.skipped.len(), 1);
    assert!(matches!(&out.report.skipped[0], ResourceError::Decode { url, .. } if url == "mem:corrupt"));

    let img = decode(&out.png);
    assert_eq!(px(&img, 150, 150), BLUE);
    assert_eq!(px(&img, 505, 405), RED);
    assert_eq!(px(&img, 700, 50), WHITE);
}

#[tokio::test]
async fn background_color_is_honoured_and_background_image_stretches() {
    let config = EngineConfig::default();
    let mut canvas = Canvas::new(1);
    canvas.set_canvas_background("#000000");
    let blank = export_canvas(&canvas, 80, 60, &MemoryAssets::new(), &FontBook::new(), &config).await.unwrap();
    assert_eq!(px(&decode(&blank.png), 40, 30), [0, 0, 0, 255]);

    let mut assets = MemoryAssets::new();
    assets.insert("mem:bg", solid_png(2, 2, RED));
    canvas.set_background_image(Some(MainImage { id: "bg".into(), name: "bg.png".into(), url: "mem:bg".into() }));
    let out = export_canvas(&canvas, 80, 60, &assets, &FontBook::new(), &config).await.unwrap();
    let img = decode(&out.png);
    assert_eq!(px(&img, 0, 0), RED);
    assert_eq!(px(&img, 79, 59), RED);
}

#[tokio::test]
async fn hung_image_load_is_skipped_after_timeout() {
    let config = EngineConfig { decode_timeout_ms: 25, ..EngineConfig::default() };
    let mut canvas = rectangle_canvas(&config);
    canvas.add_watermark(WatermarkDraft::image("https://slow.example/logo.png", None, None), &config);

    let fetcher = TimeoutFetcher::from_config(Hangs, &config);
    let out = tokio::time::timeout(
        Duration::from_secs(5),
        export_canvas(&canvas, 800, 600, &fetcher, &FontBook::new(), &config),
    )
    .await
    .expect("export must not hang")
    .unwrap();
    assert!(matches!(out.report.skipped.as_slice(), [ResourceError::TimedOut { millis: 25, .. }]));
    assert_eq!(px(&decode(&out.png), 150, 150), BLUE);
}

struct ListPackager;

impl Packager for ListPackager {
    fn package(&self, entries: &[BatchEntry]) -> studio_engine::Result<Vec<u8>> {
        if entries.iter().any(|e| e.png.is_empty()) {
            return Err(StudioError::Packaging("empty file".into()));
        }
        Ok(entries.iter().map(|e| e.filename.as_str()).collect::<Vec<_>>().join("\n").into_bytes())
    }
}

#[tokio::test]
async fn batch_export_names_each_canvas_in_order() {
    let config = EngineConfig::default();
    let canvases = vec![rectangle_canvas(&config), Canvas::new(2), Canvas::new(3)];
    let assets = MemoryAssets::new();
    let fonts = FontBook::new();

    let entries = export_batch(&canvases, 400, 300, &assets, &fonts, &config).await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
    assert_eq!(names, ["canvas-design-1.png", "canvas-design-2.png", "canvas-design-3.png"]);
    assert_eq!(decode(&entries[0].png).dimensions(), (400, 300));

    let archive = export_archive(&canvases, 400, 300, &assets, &fonts, &config, &ListPackager).await.unwrap();
    assert_eq!(String::from_utf8(archive).unwrap(), names.join("\n"));
}

#[test]
fn text_rotation_update_normalizes() {
    let config = EngineConfig::default();
    let mut canvas = Canvas::new(1);
    let id = canvas.add_element(ElementDraft::text(TextDraft::new("Sample"), Point::new(50.0, 50.0)), &config).id();
    let text = canvas.element(id).unwrap().text().unwrap();
    assert_eq!(text.font_size, 24.0);
    assert_eq!(text.color, "#000000");

    canvas.update_element_properties(id, &PropertyPatch::rotation(370.0));
    assert_eq!(canvas.element(id).unwrap().placement.rotation, 10.0);
}

#[test]
fn duplicate_text_drop_yields_one_element() {
    let config = EngineConfig::default();
    let mut canvas = Canvas::new(1);
    let drop = ElementDraft::text(TextDraft::new("Sale!"), Point::new(412.5, 233.25));
    canvas.add_element(drop.clone(), &config);
    canvas.add_element(drop, &config);
    assert_eq!(canvas.elements.len(), 1);
}

#[test]
fn same_asset_placed_twice_keeps_one_watermark() {
    let config = EngineConfig::default();
    let mut session = Session::new();
    let canvas = session.add_canvas();
    let upload = UploadInfo { name: "a.png".into(), mime_type: "image/png".into(), size_bytes: 10 };
    session
        .add_asset(UploadedAsset { id: "a".into(), url: "blob:a".into(), name: "a.png".into() }, &upload, &config)
        .unwrap();

    let first = session.place_asset(canvas, "a", &config).unwrap();
    let second = session.place_asset(canvas, "a", &config).unwrap();
    assert!(first.was_added());
    assert!(!second.was_added());
    let c = session.canvas(canvas).unwrap();
    assert_eq!(c.watermarks.len(), 1);
    assert_eq!(c.watermarks[0].placement.position, Point::new(350.0, 250.0));
}

#[test]
fn removing_an_asset_removes_both_watermarks_only() {
    let config = EngineConfig::default();
    let mut session = Session::new();
    let canvas = session.add_canvas();
    let upload = UploadInfo { name: "a.png".into(), mime_type: "image/png".into(), size_bytes: 10 };
    session
        .add_asset(UploadedAsset { id: "a".into(), url: "blob:a".into(), name: "a.png".into() }, &upload, &config)
        .unwrap();
    let wm = session.place_asset(canvas, "a", &config).unwrap().id();
    let c = session.canvas_mut(canvas).unwrap();
    c.duplicate_watermark(wm, &config).unwrap();
    let text = c.add_watermark(WatermarkDraft::text(TextDraft::new("(c)")), &config).id();
    let shape = c.add_element(ElementDraft::shape(ShapeKind::Diamond, Point::new(5.0, 5.0)), &config).id();

    let removal = session.remove_asset("a").unwrap();
    assert_eq!(removal.removed_watermarks.len(), 2);
    let c = session.canvas(canvas).unwrap();
    assert_eq!(c.watermarks.len(), 1);
    assert_eq!(c.watermarks[0].id, text);
    assert!(c.element(shape).is_some());
}

#[test]
fn oversize_upload_is_rejected_without_state_change() {
    let config = EngineConfig::default();
    let mut session = Session::new();
    let upload = UploadInfo { name: "huge.png".into(), mime_type: "image/png".into(), size_bytes: 11 * 1024 * 1024 };
    let err = session
        .add_asset(UploadedAsset { id: "h".into(), url: "blob:h".into(), name: "huge.png".into() }, &upload, &config)
        .unwrap_err();
    assert!(matches!(err, StudioError::Validation(ref m) if m.contains("huge.png")));
    assert!(session.assets.is_empty());
}
