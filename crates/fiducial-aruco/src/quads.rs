//! Quadrilateral candidates from connected components of a binarized frame.

use fiducial_core::GrayImageView;
use nalgebra::Point2;

/// One 4-connected component of same-polarity pixels.
pub(crate) struct Component {
    /// Linear index of the first pixel met in raster order.
    pub seed: usize,
    /// Linear pixel indices (`y * width + x`).
    pub pixels: Vec<usize>,
}

/// Collect 4-connected components of pixels classified as foreground.
///
/// Foreground is `v <= threshold` when `dark` is set, `v > threshold`
/// otherwise. Components touching the frame border or smaller than
/// `min_area` are skipped. The result is in raster order of `seed`.
pub(crate) fn components(
    img: &GrayImageView<'_>,
    threshold: u8,
    dark: bool,
    min_area: usize,
) -> Vec<Component> {
    let (w, h) = (img.width, img.height);
    let is_fg = |idx: usize| (img.data[idx] <= threshold) == dark;

    let mut visited = vec![false; w * h];
    let mut stack = Vec::new();
    let mut out = Vec::new();

    for seed in 0..w * h {
        if visited[seed] || !is_fg(seed) {
            continue;
        }

        visited[seed] = true;
        stack.push(seed);
        let mut pixels = Vec::new();
        let mut touches_border = false;

        while let Some(idx) = stack.pop() {
            pixels.push(idx);
            let (x, y) = (idx % w, idx / w);
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                touches_border = true;
            }

            let mut visit = |n: usize| {
                if !visited[n] && is_fg(n) {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < w {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < h {
                visit(idx + w);
            }
        }

        if !touches_border && pixels.len() >= min_area {
            out.push(Component { seed, pixels });
        }
    }

    out
}

/// Fit a convex quadrilateral to a component.
///
/// Corners come back in clockwise screen order (y down) starting from the
/// corner with the smallest polar angle around the quad centre, placed on
/// the outer pixel edges. Returns `None` for non-convex or undersized fits.
pub(crate) fn fit_quad(
    component: &Component,
    width: usize,
    min_side_px: f32,
) -> Option<[Point2<f32>; 4]> {
    let pts: Vec<Point2<f64>> = component
        .pixels
        .iter()
        .map(|&idx| Point2::new((idx % width) as f64 + 0.5, (idx / width) as f64 + 0.5))
        .collect();
    if pts.len() < 4 {
        return None;
    }

    let n = pts.len() as f64;
    let centroid = pts
        .iter()
        .fold(Point2::origin(), |acc: Point2<f64>, p| acc + p.coords / n);

    let farthest_from = |from: Point2<f64>| {
        pts.iter()
            .copied()
            .max_by(|a, b| {
                let da = (a - from).norm_squared();
                let db = (b - from).norm_squared();
                da.total_cmp(&db)
            })
            .unwrap_or(from)
    };

    let c0 = farthest_from(centroid);
    let c1 = farthest_from(c0);
    let d = c1 - c0;
    if d.norm() < f64::from(min_side_px) {
        return None;
    }

    let side_of = |p: &Point2<f64>| d.x * (p.y - c0.y) - d.y * (p.x - c0.x);
    let mut c2 = c0;
    let mut c3 = c0;
    let (mut best_pos, mut best_neg) = (0.0f64, 0.0f64);
    for p in &pts {
        let s = side_of(p);
        if s > best_pos {
            best_pos = s;
            c2 = *p;
        } else if s < best_neg {
            best_neg = s;
            c3 = *p;
        }
    }
    if best_pos <= 0.0 || best_neg >= 0.0 {
        return None;
    }

    let mut corners = [c0, c2, c1, c3];
    let center = corners
        .iter()
        .fold(Point2::origin(), |acc: Point2<f64>, p| acc + p.coords * 0.25);
    corners.sort_by(|a, b| {
        let ta = (a.y - center.y).atan2(a.x - center.x);
        let tb = (b.y - center.y).atan2(b.x - center.x);
        ta.total_cmp(&tb)
    });

    if !is_convex(&corners) {
        return None;
    }

    // Push each corner from the pixel centre to the pixel's outer corner.
    let grow = 0.5 * std::f64::consts::SQRT_2;
    let corners = corners.map(|c| {
        let dir = c - center;
        let len = dir.norm();
        if len > 1e-9 {
            c + dir * (grow / len)
        } else {
            c
        }
    });

    for i in 0..4 {
        let side = (corners[(i + 1) % 4] - corners[i]).norm();
        if side < f64::from(min_side_px) {
            return None;
        }
    }

    Some(corners.map(|c| Point2::new(c.x as f32, c.y as f32)))
}

fn is_convex(c: &[Point2<f64>; 4]) -> bool {
    let mut sign = 0.0f64;
    for i in 0..4 {
        let a = c[i];
        let b = c[(i + 1) % 4];
        let e = c[(i + 2) % 4];
        let cross = (b.x - a.x) * (e.y - b.y) - (b.y - a.y) * (e.x - b.x);
        if cross.abs() < 1e-9 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}
