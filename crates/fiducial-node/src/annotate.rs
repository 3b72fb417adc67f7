//! Debug overlay: marker outlines and id labels.

use crate::engine::DetectedMarker;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Colours and sizes of the overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorStyle {
    pub outline: [u8; 3],
    /// Box marking `corners[0]`.
    pub first_corner: [u8; 3],
    pub label: [u8; 3],
    /// Pixel size of one glyph dot.
    pub label_scale: u32,
}

impl Default for AnnotatorStyle {
    fn default() -> Self {
        Self {
            outline: [0, 255, 0],
            first_corner: [255, 0, 0],
            label: [0, 0, 255],
            label_scale: 2,
        }
    }
}

/// 3x5 digit glyphs, one row per nibble, MSB on the left.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b011, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

#[derive(Clone, Debug, Default)]
pub struct Annotator {
    style: AnnotatorStyle,
}

impl Annotator {
    pub fn new(style: AnnotatorStyle) -> Self {
        Self { style }
    }

    /// Copy of `image` with every detection outlined and labelled.
    ///
    /// With no detections the copy is pixel-identical to the input.
    pub fn annotate(&self, image: &RgbImage, detections: &[DetectedMarker]) -> RgbImage {
        let mut out = image.clone();
        for det in detections {
            self.draw_marker(&mut out, det);
        }
        out
    }

    fn draw_marker(&self, img: &mut RgbImage, det: &DetectedMarker) {
        let outline = Rgb(self.style.outline);
        for i in 0..4 {
            let a = det.corners[i];
            let b = det.corners[(i + 1) % 4];
            draw_line_segment_mut(img, (a.x, a.y), (b.x, b.y), outline);
        }

        let c0 = det.corners[0];
        let rect = Rect::at(c0.x.round() as i32 - 3, c0.y.round() as i32 - 3).of_size(7, 7);
        draw_hollow_rect_mut(img, rect, Rgb(self.style.first_corner));

        let center = det
            .corners
            .iter()
            .fold(Point2::origin(), |acc: Point2<f32>, c| acc + c.coords * 0.25);
        self.draw_number(img, det.id, center);
    }

    fn draw_number(&self, img: &mut RgbImage, value: u32, center: Point2<f32>) {
        let digits: Vec<usize> = value
            .to_string()
            .bytes()
            .map(|b| (b - b'0') as usize)
            .collect();
        let s = self.style.label_scale.max(1);
        let advance = 4 * s as i32;
        let width = advance * digits.len() as i32 - s as i32;
        let height = 5 * s as i32;
        let x0 = center.x.round() as i32 - width / 2;
        let y0 = center.y.round() as i32 - height / 2;
        let colour = Rgb(self.style.label);

        for (k, &d) in digits.iter().enumerate() {
            let gx = x0 + k as i32 * advance;
            for (row, bits) in DIGITS[d].iter().enumerate() {
                for col in 0..3 {
                    if bits & (0b100 >> col) == 0 {
                        continue;
                    }
                    let rect = Rect::at(gx + col * s as i32, y0 + row as i32 * s as i32).of_size(s, s);
                    draw_filled_rect_mut(img, rect, colour);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 128]))
    }

    fn square(id: u32) -> DetectedMarker {
        DetectedMarker {
            id,
            corners: [
                Point2::new(10.0, 8.0),
                Point2::new(50.0, 8.0),
                Point2::new(50.0, 40.0),
                Point2::new(10.0, 40.0),
            ],
        }
    }

    #[test]
    fn empty_detections_leave_pixels_untouched() {
        let img = frame();
        let out = Annotator::default().annotate(&img, &[]);
        assert_eq!(out, img);
    }

    #[test]
    fn draws_outline_corner_box_and_label() {
        let img = frame();
        let before = img.clone();
        let style = AnnotatorStyle::default();
        let out = Annotator::new(style.clone()).annotate(&img, &[square(17)]);

        assert_eq!(img, before);
        // top edge midpoint
        assert_eq!(out.get_pixel(30, 8), &Rgb(style.outline));
        // first-corner box edge
        assert_eq!(out.get_pixel(7, 5), &Rgb(style.first_corner));
        // label pixels near the centre
        assert!(out.pixels().any(|p| *p == Rgb(style.label)));
        // far from every drawing
        assert_eq!(out.get_pixel(30, 30), img.get_pixel(30, 30));
    }
}
