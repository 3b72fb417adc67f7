//! Marker rendering for printing and synthetic frames.

use crate::Dictionary;
use fiducial_core::GrayImage;

/// Render marker `id` as a black-bordered tile, `cell_px` pixels per cell.
///
/// The tile covers `marker_size + 2 * border_bits` cells per side and has no
/// quiet zone; paste it onto a white canvas with [`paste_gray`].
pub fn render_marker(
    dict: &Dictionary,
    id: u32,
    cell_px: usize,
    border_bits: usize,
) -> Option<GrayImage> {
    let code = dict.code(id)?;
    if cell_px == 0 {
        return None;
    }
    let bits = dict.marker_size;
    let cells = bits + 2 * border_bits;
    let side = cells * cell_px;
    let mut img = GrayImage::filled(side, side, 255);

    for cy in 0..cells {
        for cx in 0..cells {
            let is_border = cx < border_bits
                || cy < border_bits
                || cx >= cells - border_bits
                || cy >= cells - border_bits;
            let is_black = is_border || {
                let idx = (cy - border_bits) * bits + (cx - border_bits);
                (code >> idx) & 1 == 1
            };
            if !is_black {
                continue;
            }
            for y in cy * cell_px..(cy + 1) * cell_px {
                let row = y * side;
                img.data[row + cx * cell_px..row + (cx + 1) * cell_px].fill(0);
            }
        }
    }

    Some(img)
}

/// Copy `tile` into `canvas` with its top-left at `(x, y)`, clipping at the
/// canvas edges.
pub fn paste_gray(canvas: &mut GrayImage, tile: &GrayImage, x: usize, y: usize) {
    if x >= canvas.width || y >= canvas.height {
        return;
    }
    let w = tile.width.min(canvas.width - x);
    let h = tile.height.min(canvas.height - y);
    for ty in 0..h {
        let src = ty * tile.width;
        let dst = (y + ty) * canvas.width + x;
        canvas.data[dst..dst + w].copy_from_slice(&tile.data[src..src + w]);
    }
}
