//! Chart-rectangle localisation support: external contour tracing (a
//! simplified Moore-neighbour analogue of Suzuki's border-following
//! algorithm, restricted to outer borders the way `cv.RETR_EXTERNAL` is),
//! Douglas-Peucker polygon approximation, and bounding-rectangle extraction.
//!
//! None of these are provided by `imageproc`, so they're implemented here
//! directly — this is the "hard engineering" half of the preprocessor.

use crate::geometry::{Point, Rectangle};
use image::GrayImage;

/// Trace the external (outer) boundary of every connected foreground
/// (non-zero) component in a binary edge map, 8-connected.
///
/// Returns one ordered point list per component, walked clockwise starting
/// from its topmost-then-leftmost foreground pixel. Background-only images
/// return an empty list (mirrors `cv.findContours` yielding zero contours).
pub fn find_external_contours(edges: &GrayImage) -> Vec<Vec<Point>> {
    let (w, h) = edges.dimensions();
    let w = w as i64;
    let h = h as i64;
    let is_fg = |x: i64, y: i64| -> bool {
        x >= 0 && y >= 0 && x < w && y < h && edges.get_pixel(x as u32, y as u32)[0] != 0
    };

    let mut visited = vec![false; (w * h) as usize];
    let mut contours = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if visited[idx] || !is_fg(x, y) {
                continue;
            }
            // Only start tracing from a pixel with no foreground neighbour to
            // its west — i.e. a left edge of a component, same start
            // condition classic Moore-neighbour tracing uses.
            if is_fg(x - 1, y) {
                continue;
            }
            let contour = trace_boundary(x, y, &is_fg);
            for &p in &contour {
                let i = (p.y * w + p.x) as usize;
                if i < visited.len() {
                    visited[i] = true;
                }
            }
            if contour.len() >= 2 {
                contours.push(contour);
            }
        }
    }
    contours
}

/// Moore-neighbour boundary trace starting at `(sx, sy)`, a foreground pixel
/// known to be a left-edge of its component.
fn trace_boundary(sx: i64, sy: i64, is_fg: &impl Fn(i64, i64) -> bool) -> Vec<Point> {
    // 8-neighbour offsets in clockwise order starting "north".
    const DIRS: [(i64, i64); 8] =
        [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1)];

    let start = Point::new(sx, sy);
    let mut contour = vec![start];

    // Degenerate single-pixel component: no foreground neighbour at all.
    let has_any_neighbor = DIRS.iter().any(|&(dx, dy)| is_fg(sx + dx, sy + dy));
    if !has_any_neighbor {
        return contour;
    }

    let mut current = start;
    // Entry direction: we arrived having scanned from the west, so the
    // "backtrack" direction is west (index 6).
    let mut backtrack_dir = 6usize;
    let max_steps = 8 * 4096; // generous bound; real contours are far shorter
    let mut steps = 0;

    loop {
        steps += 1;
        if steps > max_steps {
            break;
        }
        let mut found = None;
        for k in 0..8 {
            let d = (backtrack_dir + 1 + k) % 8;
            let (dx, dy) = DIRS[d];
            let nx = current.x + dx;
            let ny = current.y + dy;
            if is_fg(nx, ny) {
                found = Some((Point::new(nx, ny), d));
                break;
            }
        }
        match found {
            None => break, // isolated pixel
            Some((next, came_from_dir)) => {
                if next == start && contour.len() > 1 {
                    break;
                }
                contour.push(next);
                // Next search starts just behind where we came from.
                backtrack_dir = (came_from_dir + 4) % 8;
                current = next;
            }
        }
    }
    contour
}

/// Perimeter of a (closed) point sequence.
fn arc_length(points: &[Point], closed: bool) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for w in points.windows(2) {
        total += dist(w[0], w[1]);
    }
    if closed {
        total += dist(points[points.len() - 1], points[0]);
    }
    total
}

fn dist(a: Point, b: Point) -> f64 {
    (((a.x - b.x).pow(2) + (a.y - b.y).pow(2)) as f64).sqrt()
}

/// Ramer-Douglas-Peucker polygon simplification with a fixed tolerance.
pub fn approx_poly_dp(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;
    rdp_recurse(points, 0, points.len() - 1, epsilon, &mut keep);
    points.iter().zip(keep.iter()).filter(|(_, &k)| k).map(|(&p, _)| p).collect()
}

fn rdp_recurse(points: &[Point], start: usize, end: usize, epsilon: f64, keep: &mut [bool]) {
    if end <= start + 1 {
        return;
    }
    let (mut max_dist, mut max_idx) = (0.0, start);
    for i in start + 1..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }
    if max_dist > epsilon {
        keep[max_idx] = true;
        rdp_recurse(points, start, max_idx, epsilon, keep);
        rdp_recurse(points, max_idx, end, epsilon, keep);
    }
}

fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (bx, by) = (b.x as f64, b.y as f64);
    let (px, py) = (p.x as f64, p.y as f64);
    let dx = bx - ax;
    let dy = by - ay;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt();
    }
    ((dy * px - dx * py + bx * ay - by * ax).abs()) / len
}

/// Axis-aligned bounding rectangle of a point set.
pub fn bounding_rect(points: &[Point]) -> Rectangle {
    let min_x = points.iter().map(|p| p.x).min().unwrap_or(0);
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0);
    let max_x = points.iter().map(|p| p.x).max().unwrap_or(0);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0);
    Rectangle::new(Point::new(min_x, min_y), Point::new(max_x + 1, max_y + 1))
}

/// Locate the chart rectangle: the bounding box of the largest-area external
/// contour found in a Canny edge map, after 1%-arc-length polygon
/// simplification. Returns `None` when no contours are found.
pub fn largest_bounding_rect(edges: &GrayImage) -> Option<Rectangle> {
    let contours = find_external_contours(edges);
    contours
        .iter()
        .map(|c| {
            let epsilon = 0.01 * arc_length(c, true);
            let approx = approx_poly_dp(c, epsilon);
            bounding_rect(&approx)
        })
        .max_by_key(|r| r.area())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_square_edge_image(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        for x in x0..x0 + size {
            img.put_pixel(x, y0, image::Luma([255]));
            img.put_pixel(x, y0 + size - 1, image::Luma([255]));
        }
        for y in y0..y0 + size {
            img.put_pixel(x0, y, image::Luma([255]));
            img.put_pixel(x0 + size - 1, y, image::Luma([255]));
        }
        img
    }

    #[test]
    fn traces_a_square_outline() {
        let img = make_square_edge_image(40, 40, 5, 5, 20);
        let contours = find_external_contours(&img);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].len() >= 4 * 20 - 4);
    }

    #[test]
    fn bounding_rect_of_square_matches_square() {
        let img = make_square_edge_image(40, 40, 5, 5, 20);
        let rect = largest_bounding_rect(&img).expect("one contour");
        assert_eq!(rect.top_left, Point::new(5, 5));
        assert_eq!(rect.bottom_right, Point::new(25, 25));
    }

    #[test]
    fn picks_the_larger_of_two_squares() {
        let mut img = make_square_edge_image(100, 100, 5, 5, 10);
        let big = make_square_edge_image(100, 100, 40, 40, 30);
        for y in 0..100 {
            for x in 0..100 {
                if big.get_pixel(x, y)[0] != 0 {
                    img.put_pixel(x, y, image::Luma([255]));
                }
            }
        }
        let rect = largest_bounding_rect(&img).expect("contours present");
        assert_eq!(rect.width(), 30);
        assert_eq!(rect.height(), 30);
    }

    #[test]
    fn empty_image_has_no_contours() {
        let img = GrayImage::new(20, 20);
        assert!(find_external_contours(&img).is_empty());
    }

    #[test]
    fn rdp_collapses_colinear_points() {
        let pts = vec![Point::new(0, 0), Point::new(5, 0), Point::new(10, 0)];
        let approx = approx_poly_dp(&pts, 0.5);
        assert_eq!(approx, vec![Point::new(0, 0), Point::new(10, 0)]);
    }
}
