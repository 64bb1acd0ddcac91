//! Bounding-box and count overlay for sampled frames.

use std::path::Path;

use ab_glyph::FontArc;
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 2;
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_SCALE: f32 = 32.0;
const TEXT_X: i32 = 10;
const TEXT_Y: i32 = 10;

/// Output file name for a sampled frame.
pub fn frame_file_name(sample_index: u64, timestamp_ms: i64) -> String {
    format!("frame_{}_at_{}.jpg", sample_index, timestamp_ms)
}

/// Count overlay text.
pub fn count_label(count: usize) -> String {
    format!("Birds: {}", count)
}

pub struct Annotator {
    font: FontArc,
}

impl Annotator {
    pub fn new(font: FontArc) -> Self {
        Self { font }
    }

    /// Draw one rectangle per detection plus the count text.
    pub fn annotate(&self, frame: Frame, detections: &[Detection]) -> Result<RgbImage> {
        let mut image = frame.into_rgb_image()?;
        for detection in detections {
            draw_box(&mut image, &detection.bbox);
        }
        draw_text_mut(
            &mut image,
            TEXT_COLOR,
            TEXT_X,
            TEXT_Y,
            TEXT_SCALE,
            &self.font,
            &count_label(detections.len()),
        );
        Ok(image)
    }

    /// Annotate and write the frame; the format follows the path extension.
    pub fn annotate_and_save(
        &self,
        frame: Frame,
        detections: &[Detection],
        path: &Path,
    ) -> Result<()> {
        let image = self.annotate(frame, detections)?;
        image
            .save(path)
            .with_context(|| format!("writing annotated frame to {}", path.display()))
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox) {
    let (width, height) = image.dimensions();
    // One pixel of slack keeps edges past the border from being drawn.
    let clamp = |v: f32, limit: u32| v.clamp(-1.0, limit as f32) as i32;
    let x1 = clamp(bbox.x1, width);
    let y1 = clamp(bbox.y1, height);
    let x2 = clamp(bbox.x2, width);
    let y2 = clamp(bbox.y2, height);
    for inset in 0..BOX_THICKNESS as i32 {
        let width = x2 - x1 + 1 - 2 * inset;
        let height = y2 - y1 + 1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::bundled_font;

    fn bird(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            label: "bird".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(x1, y1, x2, y2),
        }
    }

    fn annotator() -> Annotator {
        Annotator::new(bundled_font().expect("bundled font"))
    }

    fn overlay_pixels(image: &RgbImage) -> Vec<Rgb<u8>> {
        let mut pixels = Vec::new();
        for y in TEXT_Y as u32..TEXT_Y as u32 + 36 {
            for x in TEXT_X as u32..TEXT_X as u32 + 150 {
                pixels.push(*image.get_pixel(x, y));
            }
        }
        pixels
    }

    #[test]
    fn file_name_carries_sample_index_and_timestamp() {
        assert_eq!(frame_file_name(3, 1500), "frame_3_at_1500.jpg");
        assert_eq!(count_label(2), "Birds: 2");
    }

    #[test]
    fn draws_two_pixel_box_edges() -> Result<()> {
        let frame = Frame::filled(200, 120, [0, 0, 0])?;
        let image = annotator().annotate(frame, &[bird(100.0, 60.0, 140.0, 100.0)])?;

        assert_eq!(*image.get_pixel(100, 80), BOX_COLOR);
        assert_eq!(*image.get_pixel(101, 80), BOX_COLOR);
        assert_eq!(*image.get_pixel(102, 80), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(140, 80), BOX_COLOR);
        assert_eq!(*image.get_pixel(120, 99), BOX_COLOR);
        assert_eq!(*image.get_pixel(120, 80), Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn count_text_is_drawn_even_without_detections() -> Result<()> {
        let frame = Frame::filled(200, 120, [0, 0, 0])?;
        let image = annotator().annotate(frame, &[])?;

        let lit = overlay_pixels(&image)
            .iter()
            .filter(|p| p[1] > 128 && p[0] == 0 && p[2] == 0)
            .count();
        assert!(lit > 30, "only {} text pixels", lit);
        // Nothing is drawn away from the overlay.
        assert_eq!(*image.get_pixel(150, 100), Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn count_text_follows_detection_count() -> Result<()> {
        let far_box = bird(150.0, 70.0, 190.0, 110.0);
        let none = annotator().annotate(Frame::filled(200, 120, [0, 0, 0])?, &[])?;
        let one = annotator().annotate(Frame::filled(200, 120, [0, 0, 0])?, &[far_box.clone()])?;
        let one_again = annotator().annotate(Frame::filled(200, 120, [0, 0, 0])?, &[far_box])?;

        assert_ne!(overlay_pixels(&none), overlay_pixels(&one));
        assert_eq!(overlay_pixels(&one), overlay_pixels(&one_again));
        Ok(())
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() -> Result<()> {
        let frame = Frame::filled(16, 16, [0, 0, 0])?;
        let image = annotator().annotate(frame, &[bird(-5.0, -5.0, 40.0, 40.0)])?;
        assert_eq!(image.dimensions(), (16, 16));
        Ok(())
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() -> Result<()> {
        let frame = Frame::filled(200, 120, [0, 0, 0])?;
        let image = annotator().annotate(
            frame,
            &[
                bird(-1e10, 100.0, 1e10, 110.0),
                bird(f32::MIN, f32::MIN, f32::MAX, f32::MAX),
            ],
        )?;
        // Top and bottom edges of the first box span the whole width.
        assert_eq!(*image.get_pixel(0, 100), BOX_COLOR);
        assert_eq!(*image.get_pixel(199, 110), BOX_COLOR);
        // The frame-sized box leaves its interior untouched.
        assert_eq!(*image.get_pixel(180, 60), Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn saves_jpeg_to_requested_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(frame_file_name(0, 0));
        annotator().annotate_and_save(Frame::filled(16, 16, [9, 9, 9])?, &[], &path)?;
        let reloaded = image::open(&path)?.to_rgb8();
        assert_eq!(reloaded.dimensions(), (16, 16));
        Ok(())
    }
}
