//! Region annotation

use ab_glyph::{FontRef, PxScale};
use camera_capture::VideoFrame;
use hazard_detect::{HazardKind, Region};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_polygon_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tracing::debug;

use crate::EvidenceError;

/// DejaVu Sans Mono Bold, see `assets/DejaVu-LICENSE.txt`
static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono-Bold.ttf");

const OUTLINE_PX: i32 = 2;
const LABEL_HEIGHT: u32 = 14;
const LABEL_FONT_PX: f32 = 12.0;
const LABEL_PAD: u32 = 2;

/// Marker colour per hazard kind
pub fn hazard_color(kind: HazardKind) -> Rgb<u8> {
    match kind {
        HazardKind::NoHelmet => Rgb([255, 0, 0]),
        HazardKind::Intrusion => Rgb([255, 128, 0]),
        HazardKind::HoleDanger => Rgb([255, 220, 0]),
        HazardKind::SignageMissing => Rgb([0, 96, 255]),
        HazardKind::OffPost => Rgb([200, 0, 200]),
    }
}

/// Caption written on the label tab
pub fn label_text(kind: HazardKind) -> &'static str {
    match kind {
        HazardKind::NoHelmet => "No Helmet",
        HazardKind::Intrusion => "Intrusion",
        HazardKind::HoleDanger => "Hole Danger",
        HazardKind::SignageMissing => "Missing Sign Area",
        HazardKind::OffPost => "Off Post",
    }
}

/// Black on light tabs, white on dark ones
fn caption_color(tab: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = tab.0;
    let luma = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000;
    if luma > 150 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

/// Copy the frame and outline `region` on it with a captioned label tab.
///
/// Without a region, or for an empty frame, the copy is returned untouched.
/// Regions partly outside the frame are clipped.
pub fn annotate(
    frame: &VideoFrame,
    region: Option<&Region>,
    kind: HazardKind,
) -> Result<RgbImage, EvidenceError> {
    let mut image = frame
        .to_rgb_image()
        .map_err(|e| EvidenceError::Frame(e.to_string()))?;

    let Some(region) = region else {
        return Ok(image);
    };
    if image.width() == 0 || image.height() == 0 {
        debug!("Empty {}x{} frame for {}, nothing to mark", image.width(), image.height(), kind);
        return Ok(image);
    }
    let Some((x1, y1, x2, y2)) = region.bounds() else {
        debug!("Empty region for {}, storing frame unannotated", kind);
        return Ok(image);
    };

    let color = hazard_color(kind);
    match region {
        Region::Rect { .. } => outline_rect(&mut image, (x1, y1, x2, y2), color),
        Region::Polygon { points } => outline_polygon(&mut image, points, color),
    }
    label_tab(&mut image, x1, y1, kind, color)?;

    Ok(image)
}

fn outline_rect(image: &mut RgbImage, (x1, y1, x2, y2): (f32, f32, f32, f32), color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    let left = (x1.round() as i32).clamp(0, w as i32 - 1);
    let top = (y1.round() as i32).clamp(0, h as i32 - 1);
    let right = (x2.round() as i32).clamp(0, w as i32 - 1);
    let bottom = (y2.round() as i32).clamp(0, h as i32 - 1);

    for inset in 0..OUTLINE_PX {
        let width = right - left - 2 * inset + 1;
        let height = bottom - top - 2 * inset + 1;
        if width < 1 || height < 1 {
            break;
        }
        let rect = Rect::at(left + inset, top + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

fn outline_polygon(image: &mut RgbImage, points: &[[f32; 2]], color: Rgb<u8>) {
    let mut poly: Vec<Point<f32>> = points.iter().map(|p| Point::new(p[0], p[1])).collect();
    poly.dedup();
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() < 3 {
        debug!("Degenerate polygon with {} points, skipping outline", poly.len());
        return;
    }

    draw_hollow_polygon_mut(image, &poly, color);
    let shifted: Vec<Point<f32>> = poly.iter().map(|p| Point::new(p.x + 1.0, p.y)).collect();
    draw_hollow_polygon_mut(image, &shifted, color);
}

/// Filled tab above the region's top-left corner carrying the hazard caption
fn label_tab(
    image: &mut RgbImage,
    x1: f32,
    y1: f32,
    kind: HazardKind,
    color: Rgb<u8>,
) -> Result<(), EvidenceError> {
    let font = FontRef::try_from_slice(LABEL_FONT).map_err(|e| EvidenceError::Font(e.to_string()))?;
    let scale = PxScale::from(LABEL_FONT_PX);
    let caption = label_text(kind);
    let (text_width, _) = text_size(scale, &font, caption);

    let (w, h) = image.dimensions();
    let left = (x1.round() as i32).clamp(0, w as i32 - 1);
    let top = (y1.round() as i32 - LABEL_HEIGHT as i32).clamp(0, h as i32 - 1);
    let width = (text_width + 2 * LABEL_PAD).min(w - left as u32);
    let height = LABEL_HEIGHT.min(h - top as u32);

    draw_filled_rect_mut(image, Rect::at(left, top).of_size(width, height), color);
    draw_text_mut(
        image,
        caption_color(color),
        left + LABEL_PAD as i32,
        top + 1,
        scale,
        &font,
        caption,
    );
    Ok(())
}

/// Encode an evidence image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EvidenceError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame() -> VideoFrame {
        VideoFrame::filled(100, 80, [50, 50, 50], 1)
    }

    #[test]
    fn test_no_region_is_plain_copy() {
        let frame = gray_frame();
        let image = annotate(&frame, None, HazardKind::NoHelmet).unwrap();
        assert_eq!(image.as_raw(), &frame.data);
    }

    #[test]
    fn test_rect_outline_drawn_on_copy() {
        let frame = gray_frame();
        let before = frame.clone();
        let region = Region::Rect { x1: 20.0, y1: 30.0, x2: 60.0, y2: 70.0 };

        let image = annotate(&frame, Some(&region), HazardKind::NoHelmet).unwrap();

        assert_eq!(frame, before);
        assert_eq!(*image.get_pixel(20, 50), hazard_color(HazardKind::NoHelmet));
        assert_eq!(*image.get_pixel(21, 50), hazard_color(HazardKind::NoHelmet));
        assert_eq!(*image.get_pixel(40, 50), Rgb([50, 50, 50]));
        // label tab sits above the box, its left padding is plain tab colour
        assert_eq!(*image.get_pixel(20, 20), hazard_color(HazardKind::NoHelmet));
    }

    #[test]
    fn test_label_tab_carries_caption() {
        let frame = gray_frame();
        let region = Region::Rect { x1: 10.0, y1: 40.0, x2: 90.0, y2: 75.0 };
        let image = annotate(&frame, Some(&region), HazardKind::SignageMissing).unwrap();

        let tab = hazard_color(HazardKind::SignageMissing);
        let caption = caption_color(tab);
        let mut tab_pixels = 0;
        let mut caption_pixels = 0;
        for y in 26..40 {
            for x in 10..90 {
                let px = *image.get_pixel(x, y);
                if px == tab {
                    tab_pixels += 1;
                } else if px != Rgb([50, 50, 50]) {
                    caption_pixels += 1;
                }
            }
        }
        assert!(tab_pixels > 0);
        assert!(caption_pixels > 0, "no caption drawn on the tab");
        assert_eq!(caption, Rgb([255, 255, 255]));
    }

    #[test]
    fn test_caption_contrast() {
        assert_eq!(caption_color(hazard_color(HazardKind::HoleDanger)), Rgb([0, 0, 0]));
        assert_eq!(caption_color(hazard_color(HazardKind::NoHelmet)), Rgb([255, 255, 255]));
        assert_eq!(label_text(HazardKind::SignageMissing), "Missing Sign Area");
    }

    #[test]
    fn test_empty_frame_returned_unmarked() {
        let frame = VideoFrame::new(Vec::new(), 0, 0, 0, 1);
        let region = Region::Rect { x1: 1.0, y1: 1.0, x2: 5.0, y2: 5.0 };

        let image = annotate(&frame, Some(&region), HazardKind::NoHelmet).unwrap();
        assert_eq!(image.dimensions(), (0, 0));

        let tall = VideoFrame::new(Vec::new(), 0, 7, 0, 1);
        let image = annotate(&tall, Some(&region), HazardKind::Intrusion).unwrap();
        assert_eq!(image.dimensions(), (0, 7));
    }

    #[test]
    fn test_region_outside_frame_is_clipped() {
        let frame = gray_frame();
        let region = Region::Rect { x1: -50.0, y1: -10.0, x2: 500.0, y2: 500.0 };
        let image = annotate(&frame, Some(&region), HazardKind::Intrusion).unwrap();
        assert_eq!(*image.get_pixel(0, 40), hazard_color(HazardKind::Intrusion));
        assert_eq!(*image.get_pixel(99, 40), hazard_color(HazardKind::Intrusion));
    }

    #[test]
    fn test_polygon_outline() {
        let frame = gray_frame();
        let region = Region::Polygon {
            points: vec![[10.0, 40.0], [90.0, 40.0], [90.0, 75.0], [10.0, 75.0], [10.0, 40.0]],
        };
        let image = annotate(&frame, Some(&region), HazardKind::SignageMissing).unwrap();
        assert_eq!(*image.get_pixel(50, 75), hazard_color(HazardKind::SignageMissing));
        assert_eq!(*image.get_pixel(50, 60), Rgb([50, 50, 50]));
    }

    #[test]
    fn test_degenerate_polygon_only_labels() {
        let frame = gray_frame();
        let region = Region::Polygon { points: vec![[10.0, 40.0], [20.0, 50.0]] };
        let image = annotate(&frame, Some(&region), HazardKind::HoleDanger).unwrap();
        assert_eq!(*image.get_pixel(15, 45), Rgb([50, 50, 50]));
    }

    #[test]
    fn test_bad_frame_rejected() {
        let frame = VideoFrame::new(vec![0; 5], 10, 10, 0, 1);
        assert!(matches!(
            annotate(&frame, None, HazardKind::OffPost),
            Err(EvidenceError::Frame(_))
        ));
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let image = annotate(&gray_frame(), None, HazardKind::OffPost).unwrap();
        let bytes = encode_jpeg(&image, 85).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
